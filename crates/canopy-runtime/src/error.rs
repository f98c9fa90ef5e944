//! Runtime error types.

use canopy_graph::{GraphError, Unresolved};
use canopy_provision::ProvisionError;

use crate::report::RunReport;

/// Errors that end a run.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
  /// The graph was rejected before anything was dispatched.
  #[error("invalid resource graph: {0}")]
  Invalid(#[from] GraphError),

  /// At least one node failed. The report names every node that did not
  /// complete.
  #[error("{0}")]
  Failed(Box<RunReport>),
}

impl RuntimeError {
  /// The run report, when the run got as far as dispatching.
  pub fn report(&self) -> Option<&RunReport> {
    match self {
      Self::Failed(report) => Some(report),
      Self::Invalid(_) => None,
    }
  }
}

/// Why a single dispatched node failed.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
  /// An input could not be resolved from its peer's outputs.
  #[error("wiring error: {0}")]
  Wiring(#[from] Unresolved),

  #[error(transparent)]
  Provision(#[from] ProvisionError),

  #[error("provisioning task panicked")]
  Panicked,
}
