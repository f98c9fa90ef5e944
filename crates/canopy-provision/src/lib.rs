//! Canopy Provision
//!
//! This crate defines the backend layer that actually creates infrastructure.
//! The scheduler hands each dispatched node to a [`Provisioner`] as a
//! [`ProvisionRequest`] with every input already resolved, and publishes the
//! returned attributes as the node's outputs.
//!
//! [`SimulatedProvisioner`] is an in-memory backend with deterministic
//! identifiers. It is what the CLI and the tests run against.

mod error;
mod simulated;

pub use error::ProvisionError;
pub use simulated::{ProvisionRecord, SimulatedProvisioner};

use async_trait::async_trait;
use canopy_graph::{Attributes, ResourceKind};
use serde::Serialize;

/// A creation request with every input resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvisionRequest {
  pub kind: ResourceKind,
  pub name: String,
  pub inputs: Attributes,
}

impl ProvisionRequest {
  pub fn new(kind: ResourceKind, name: impl Into<String>, inputs: Attributes) -> Self {
    Self {
      kind,
      name: name.into(),
      inputs,
    }
  }

  /// A string input, or an `InvalidInput` error naming the field.
  pub fn str_input(&self, field: &str) -> Result<&str, ProvisionError> {
    self
      .inputs
      .get(field)
      .and_then(|v| v.as_str())
      .ok_or_else(|| ProvisionError::InvalidInput {
        name: self.name.clone(),
        field: field.to_string(),
        message: "expected a string".to_string(),
      })
  }
}

/// Provisioning backend.
///
/// One call creates one resource. Implementations own retries and rate
/// limits; the scheduler calls `create` once per node and never retries.
#[async_trait]
pub trait Provisioner: Send + Sync {
  /// Create the resource and return the attributes it was assigned.
  async fn create(&self, request: ProvisionRequest) -> Result<Attributes, ProvisionError>;
}
