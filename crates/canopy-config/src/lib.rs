//! Canopy Config
//!
//! This crate contains the serializable configuration for a canopy
//! deployment: network layout, the front door, and the two compute
//! variants. Every field has a default, so an empty JSON object is a valid
//! configuration.
//!
//! Configuration can be loaded from:
//! - JSON files (via CLI with `--config=topology.json`)
//! - In-memory JSON strings (tests, embedding)

mod error;
mod route;
mod topology;

pub use error::ConfigError;
pub use route::RouteKey;
pub use topology::{
  BackendConfig, ContainerConfig, FrontDoorConfig, FunctionConfig, ImageConfig, NetworkConfig,
  PackageConfig, Platform, TopologyConfig,
};
