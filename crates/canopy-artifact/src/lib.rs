//! Canopy Artifact
//!
//! The collaborators that turn source trees into something deployable:
//!
//! - [`ArtifactBuilder`] builds and pushes the container image. The topology
//!   backend routes `image` nodes here instead of to the provisioner.
//! - [`Packager`] produces the function bundle on local disk before any
//!   function node is declared.
//! - [`hash_file`] and [`hash_directory`] compute content digests. They are
//!   plain utilities and take no part in the resource graph.

mod builder;
mod error;
mod hash;
mod package;

pub use builder::{ArtifactBuilder, BuildRequest, ImageRef, SimulatedBuilder};
pub use error::{ArtifactError, PackageError};
pub use hash::{hash_directory, hash_file};
pub use package::{ArtifactBundle, CommandPackager, Packager, StaticPackager};
