//! Resource graph runtime.
//!
//! The [`Runtime`] struct is the entry point for provisioning a declared
//! graph. It owns the backend and a notifier, and provides `run(graph)` to
//! drive every node to a terminal state.

use std::sync::Arc;

use canopy_graph::ResourceGraph;
use canopy_provision::Provisioner;
use tracing::{error, info, instrument};

use crate::error::RuntimeError;
use crate::events::{ExecutionNotifier, NoopNotifier, ProvisionEvent};
use crate::report::RunReport;
use crate::scheduler::Scheduler;

/// The resource graph runtime.
///
/// Generic over `N: ExecutionNotifier` to allow different notification
/// strategies. Use `Runtime::new()` for a runtime with no-op notifications,
/// or `Runtime::with_notifier()` to observe events.
pub struct Runtime<N: ExecutionNotifier = NoopNotifier> {
  provisioner: Arc<dyn Provisioner>,
  notifier: N,
}

impl Runtime<NoopNotifier> {
  pub fn new(provisioner: Arc<dyn Provisioner>) -> Self {
    Self::with_notifier(provisioner, NoopNotifier)
  }
}

impl<N: ExecutionNotifier> Runtime<N> {
  pub fn with_notifier(provisioner: Arc<dyn Provisioner>, notifier: N) -> Self {
    Self {
      provisioner,
      notifier,
    }
  }

  /// Provision every node in the graph.
  ///
  /// Configuration errors (missing inputs, undeclared references, cycles)
  /// are returned before anything is dispatched. Otherwise every node runs
  /// to a terminal state, and the run fails if any node did not succeed.
  /// Nodes already in flight are never cancelled.
  #[instrument(name = "runtime_run", skip(self, graph), fields(nodes = graph.len()))]
  pub async fn run(&self, graph: ResourceGraph) -> Result<RunReport, RuntimeError> {
    let run_id = uuid::Uuid::new_v4().to_string();

    let declared = match graph.into_declared() {
      Ok(declared) => declared,
      Err(e) => {
        error!(run_id = %run_id, error = %e, "run_rejected");
        self.notifier.notify(ProvisionEvent::RunFailed {
          run_id,
          error: e.to_string(),
        });
        return Err(e.into());
      }
    };

    info!(run_id = %run_id, nodes = declared.len(), "run_started");
    self.notifier.notify(ProvisionEvent::RunStarted {
      run_id: run_id.clone(),
      nodes: declared.len(),
    });

    let scheduler = Scheduler::new(
      run_id.clone(),
      self.provisioner.clone(),
      &self.notifier,
      declared,
    )?;
    let report = scheduler.run().await;

    if report.is_success() {
      info!(run_id = %run_id, nodes = report.outcomes.len(), "run_completed");
      self.notifier.notify(ProvisionEvent::RunCompleted { run_id });
      Ok(report)
    } else {
      error!(
        run_id = %run_id,
        failed = ?report.failed(),
        skipped = report.skipped().len(),
        "run_failed"
      );
      self.notifier.notify(ProvisionEvent::RunFailed {
        run_id,
        error: report.to_string(),
      });
      Err(RuntimeError::Failed(Box::new(report)))
    }
  }
}
