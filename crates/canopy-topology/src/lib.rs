//! Canopy Topology
//!
//! The fixed application topology: one network, one shared HTTP front door,
//! one function, and one container service, each declared as an assembly of
//! resource nodes.
//!
//! An assembly's public surface is the set of [`ResourceHandle`]s it
//! returns. Compute assemblies attach to the front door through the wiring
//! methods on [`FrontDoor`], which record what was attached as a
//! [`WiringRecord`].
//!
//! [`Topology`] declares everything in dependency order and hands the graph
//! to a [`Runtime`](canopy_runtime::Runtime).
//!
//! [`ResourceHandle`]: canopy_graph::ResourceHandle

mod backend;
mod container;
mod error;
mod export;
mod front_door;
mod function;
mod image;
mod network;
mod policy;
mod topology;
mod wiring;

pub use backend::TopologyBackend;
pub use container::ContainerService;
pub use error::TopologyError;
pub use export::{ExportError, ExportSink, Exports};
pub use front_door::FrontDoor;
pub use function::Function;
pub use image::ContainerImage;
pub use network::Network;
pub use topology::{Declared, Deployment, Plan, RegisteredRoute, Topology};
pub use wiring::{
  ComputeVariant, EgressRule, IngressRule, PermissionGrant, WiringError, WiringRecord,
  scoped_ingress, scoped_source_pattern, validate_source_pattern,
};
