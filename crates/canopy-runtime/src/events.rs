//! Provisioning events and notifiers for observability.
//!
//! Events are emitted during a run to allow consumers to observe progress,
//! render it, or persist it.

use canopy_graph::{Attributes, ResourceKind};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProvisionEvent {
  /// The graph was accepted and dispatch is starting.
  RunStarted { run_id: String, nodes: usize },

  /// A node's provisioning call has started.
  NodeDispatched {
    run_id: String,
    node: String,
    kind: ResourceKind,
  },

  NodeSucceeded {
    run_id: String,
    node: String,
    outputs: Attributes,
  },

  /// A node's own provisioning call failed.
  NodeFailed {
    run_id: String,
    node: String,
    error: String,
  },

  /// A node will not be dispatched because `cause` failed.
  NodeSkipped {
    run_id: String,
    node: String,
    cause: String,
  },

  /// Every node succeeded.
  RunCompleted { run_id: String },

  /// The graph was rejected or at least one node failed.
  RunFailed { run_id: String, error: String },
}

/// Trait for receiving provisioning events.
///
/// The runtime calls `notify` from its dispatch loop, never from inside a
/// provisioning call, so implementations should return quickly.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ProvisionEvent);
}

/// A no-op notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ProvisionEvent) {}
}

/// A notifier that sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls dispatch. Volume is a handful
  // of events per node.
  sender: mpsc::UnboundedSender<ProvisionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ProvisionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ProvisionEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
