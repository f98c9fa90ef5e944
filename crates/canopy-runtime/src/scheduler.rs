//! The dispatch loop behind [`Runtime::run`](crate::Runtime::run).

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use canopy_graph::{Attributes, DeclaredNode, Graph, ResourceNode, Resolver, Unresolved};
use canopy_provision::{ProvisionRequest, Provisioner};
use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::error::{NodeError, RuntimeError};
use crate::events::{ExecutionNotifier, ProvisionEvent};
use crate::report::{NodeOutcome, NodeStatus, RunReport};
use crate::state::{Failure, NodeState};

type Completion = (String, Result<Attributes, NodeError>);

struct Entry {
  node: ResourceNode,
  resolver: Option<Resolver<Attributes>>,
  upstream: Vec<String>,
  state: NodeState,
  outputs: Option<Attributes>,
}

pub(crate) struct Scheduler<'a, N> {
  run_id: String,
  provisioner: Arc<dyn Provisioner>,
  notifier: &'a N,
  /// Topological order. Visiting in this order lets one pass settle skips.
  order: Vec<String>,
  entries: HashMap<String, Entry>,
  running: JoinSet<Completion>,
  failures: Vec<String>,
}

impl<'a, N: ExecutionNotifier> Scheduler<'a, N> {
  pub(crate) fn new(
    run_id: String,
    provisioner: Arc<dyn Provisioner>,
    notifier: &'a N,
    declared: Vec<DeclaredNode>,
  ) -> Result<Self, RuntimeError> {
    let graph = Graph::new(declared.iter().map(|d| &d.node));
    let order = graph.topological_order()?;

    let entries = declared
      .into_iter()
      .map(|DeclaredNode { node, resolver }| {
        let entry = Entry {
          upstream: graph.upstream(node.name()).to_vec(),
          node,
          resolver: Some(resolver),
          state: NodeState::Declared,
          outputs: None,
        };
        (entry.node.name().to_string(), entry)
      })
      .collect();

    Ok(Self {
      run_id,
      provisioner,
      notifier,
      order,
      entries,
      running: JoinSet::new(),
      failures: Vec::new(),
    })
  }

  /// Drive every node to a terminal state.
  pub(crate) async fn run(mut self) -> RunReport {
    loop {
      self.skip_invalidated();
      self.dispatch_ready();

      let Some(joined) = self.running.join_next().await else {
        break;
      };

      match joined {
        Ok((name, result)) => self.complete(&name, result),
        Err(e) => {
          // Tasks catch their own panics and are never aborted
          error!(run_id = %self.run_id, error = %e, "task_join_failed");
        }
      }
    }

    self.into_report()
  }

  /// Fail every waiting node that has a failed upstream, without dispatch.
  fn skip_invalidated(&mut self) {
    for name in &self.order {
      let cause = match self.entries.get(name) {
        Some(entry) if entry.state.is_waiting() => entry.upstream.iter().find_map(|up| {
          self
            .entries
            .get(up)
            .and_then(|upstream| upstream.state.failure_origin(up))
        }),
        _ => None,
      };
      let Some(cause) = cause else {
        continue;
      };
      let Some(entry) = self.entries.get_mut(name) else {
        continue;
      };

      entry.state = NodeState::Failed(Failure::Skipped {
        cause: cause.clone(),
      });
      if let Some(resolver) = entry.resolver.take() {
        resolver.fail(Unresolved::Upstream {
          node: cause.clone(),
        });
      }

      warn!(
        run_id = %self.run_id,
        node = %name,
        kind = %entry.node.kind(),
        cause = %cause,
        "node_skipped"
      );
      self.notifier.notify(ProvisionEvent::NodeSkipped {
        run_id: self.run_id.clone(),
        node: name.clone(),
        cause,
      });
    }
  }

  /// Dispatch every waiting node whose upstream nodes have all succeeded.
  fn dispatch_ready(&mut self) {
    for name in &self.order {
      let waiting = match self.entries.get(name) {
        Some(entry) if entry.state.is_waiting() => entry
          .upstream
          .iter()
          .filter(|up| {
            self
              .entries
              .get(*up)
              .is_none_or(|upstream| upstream.state != NodeState::Succeeded)
          })
          .count(),
        _ => continue,
      };
      let Some(entry) = self.entries.get_mut(name) else {
        continue;
      };

      if waiting > 0 {
        entry.state = NodeState::Pending { waiting };
        continue;
      }

      entry.state = NodeState::Dispatched;
      info!(
        run_id = %self.run_id,
        node = %name,
        kind = %entry.node.kind(),
        "node_dispatched"
      );
      self.notifier.notify(ProvisionEvent::NodeDispatched {
        run_id: self.run_id.clone(),
        node: name.clone(),
        kind: entry.node.kind(),
      });

      self
        .running
        .spawn(provision(entry.node.clone(), self.provisioner.clone()));
    }
  }

  fn complete(&mut self, name: &str, result: Result<Attributes, NodeError>) {
    let Some(entry) = self.entries.get_mut(name) else {
      return;
    };

    match result {
      Ok(outputs) => {
        info!(
          run_id = %self.run_id,
          node = %name,
          kind = %entry.node.kind(),
          "node_succeeded"
        );
        self.notifier.notify(ProvisionEvent::NodeSucceeded {
          run_id: self.run_id.clone(),
          node: name.to_string(),
          outputs: outputs.clone(),
        });
        entry.state = NodeState::Succeeded;
        if let Some(resolver) = entry.resolver.take() {
          resolver.resolve(outputs.clone());
        }
        entry.outputs = Some(outputs);
      }
      Err(e) => {
        error!(
          run_id = %self.run_id,
          node = %name,
          kind = %entry.node.kind(),
          error = %e,
          "node_failed"
        );
        self.notifier.notify(ProvisionEvent::NodeFailed {
          run_id: self.run_id.clone(),
          node: name.to_string(),
          error: e.to_string(),
        });
        entry.state = NodeState::Failed(Failure::Direct {
          error: e.to_string(),
        });
        if let Some(resolver) = entry.resolver.take() {
          resolver.fail(Unresolved::Upstream {
            node: name.to_string(),
          });
        }
        self.failures.push(name.to_string());
      }
    }
  }

  fn into_report(self) -> RunReport {
    let outcomes = self
      .entries
      .into_iter()
      .map(|(name, entry)| {
        let status = match entry.state {
          NodeState::Succeeded => NodeStatus::Succeeded {
            outputs: entry.outputs.unwrap_or_default(),
          },
          NodeState::Failed(Failure::Direct { error }) => NodeStatus::Failed { error },
          NodeState::Failed(Failure::Skipped { cause }) => NodeStatus::Skipped { cause },
          other => NodeStatus::Failed {
            error: format!("node did not reach a terminal state ({other:?})"),
          },
        };
        let outcome = NodeOutcome {
          kind: entry.node.kind(),
          status,
        };
        (name, outcome)
      })
      .collect();

    RunReport {
      run_id: self.run_id,
      outcomes,
      failures: self.failures,
    }
  }
}

/// Resolve a node's inputs and hand it to the backend.
///
/// An input that cannot be resolved is a wiring error of this node.
async fn provision(node: ResourceNode, provisioner: Arc<dyn Provisioner>) -> Completion {
  let name = node.name().to_string();
  let work = async move {
    let inputs = node.resolve_inputs().await?;
    let request = ProvisionRequest::new(node.kind(), node.name(), inputs);
    Ok::<_, NodeError>(provisioner.create(request).await?)
  };

  let result = AssertUnwindSafe(work)
    .catch_unwind()
    .await
    .unwrap_or(Err(NodeError::Panicked));
  (name, result)
}
