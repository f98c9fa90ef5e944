use canopy_artifact::PackageError;
use canopy_graph::{GraphError, Unresolved};
use canopy_runtime::RuntimeError;

use crate::export::ExportError;
use crate::wiring::WiringError;

/// Errors declaring or deploying the topology.
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
  /// A node could not be added to the graph.
  #[error("declaration failed: {0}")]
  Declaration(#[from] GraphError),

  #[error(transparent)]
  Wiring(#[from] WiringError),

  /// The function bundle could not be produced. Nothing was declared for
  /// the function and nothing was dispatched.
  #[error("packaging the function failed: {0}")]
  Package(#[from] PackageError),

  #[error(transparent)]
  Runtime(#[from] RuntimeError),

  #[error(transparent)]
  Export(#[from] ExportError),

  /// A registered route's target did not resolve after the run.
  #[error("route '{route}' did not resolve: {reason}")]
  Route { route: String, reason: Unresolved },
}

impl TopologyError {
  /// The run report, if the run got as far as dispatching.
  pub fn report(&self) -> Option<&canopy_runtime::RunReport> {
    match self {
      Self::Runtime(e) => e.report(),
      _ => None,
    }
  }
}
