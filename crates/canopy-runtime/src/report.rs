//! Run result types.

use std::collections::BTreeMap;
use std::fmt;

use canopy_graph::{Attributes, ResourceKind};
use serde::Serialize;

/// Terminal status of one node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NodeStatus {
  Succeeded { outputs: Attributes },
  /// The node was dispatched and failed.
  Failed { error: String },
  /// The node was never dispatched because `cause` failed.
  Skipped { cause: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeOutcome {
  pub kind: ResourceKind,
  #[serde(flatten)]
  pub status: NodeStatus,
}

/// Result of a complete run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
  pub run_id: String,
  /// Every node, keyed by name.
  pub outcomes: BTreeMap<String, NodeOutcome>,
  /// Nodes that failed directly, in the order their failures arrived.
  pub failures: Vec<String>,
}

impl RunReport {
  pub fn is_success(&self) -> bool {
    self
      .outcomes
      .values()
      .all(|o| matches!(o.status, NodeStatus::Succeeded { .. }))
  }

  pub fn status(&self, node: &str) -> Option<&NodeStatus> {
    self.outcomes.get(node).map(|o| &o.status)
  }

  /// Outputs of a node that succeeded.
  pub fn outputs(&self, node: &str) -> Option<&Attributes> {
    match self.status(node)? {
      NodeStatus::Succeeded { outputs } => Some(outputs),
      _ => None,
    }
  }

  pub fn succeeded(&self) -> Vec<&str> {
    self.filter(|s| matches!(s, NodeStatus::Succeeded { .. }))
  }

  /// Nodes that failed directly.
  pub fn failed(&self) -> Vec<&str> {
    self.filter(|s| matches!(s, NodeStatus::Failed { .. }))
  }

  /// Nodes skipped because something upstream failed.
  pub fn skipped(&self) -> Vec<&str> {
    self.filter(|s| matches!(s, NodeStatus::Skipped { .. }))
  }

  /// Nodes skipped because `node` failed.
  pub fn invalidated_by(&self, node: &str) -> Vec<&str> {
    self.filter(|s| matches!(s, NodeStatus::Skipped { cause } if cause == node))
  }

  fn filter(&self, predicate: impl Fn(&NodeStatus) -> bool) -> Vec<&str> {
    self
      .outcomes
      .iter()
      .filter(|(_, o)| predicate(&o.status))
      .map(|(name, _)| name.as_str())
      .collect()
  }
}

impl fmt::Display for RunReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_success() {
      return write!(f, "run {} succeeded ({} nodes)", self.run_id, self.outcomes.len());
    }

    write!(f, "run {} failed", self.run_id)?;
    for name in &self.failures {
      if let Some(NodeStatus::Failed { error }) = self.status(name) {
        write!(f, "; node '{name}' failed: {error}")?;
      }
      let invalidated = self.invalidated_by(name);
      if !invalidated.is_empty() {
        write!(f, " (skipped: {})", invalidated.join(", "))?;
      }
    }
    Ok(())
  }
}
