//! Resource node state machine.
//!
//! ```text
//! Declared -> Pending { waiting } -> Dispatched -> Succeeded
//!                                              \-> Failed(Direct)
//! Declared | Pending -> Failed(Skipped)
//! ```
//!
//! A node only fails without dispatch when something it depends on failed.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NodeState {
  Declared,
  /// Waiting on this many upstream nodes.
  Pending {
    waiting: usize,
  },
  /// Provisioning call in flight.
  Dispatched,
  Succeeded,
  Failed(Failure),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "failure", rename_all = "snake_case")]
pub enum Failure {
  /// The node's own provisioning or wiring failed.
  Direct { error: String },
  /// The node was never dispatched because `cause` failed upstream.
  Skipped { cause: String },
}

impl NodeState {
  pub fn is_terminal(&self) -> bool {
    matches!(self, Self::Succeeded | Self::Failed(_))
  }

  /// Not yet dispatched and not yet failed.
  pub fn is_waiting(&self) -> bool {
    matches!(self, Self::Declared | Self::Pending { .. })
  }

  /// The node that failed directly, if this node (named `name`) is failed.
  pub fn failure_origin(&self, name: &str) -> Option<String> {
    match self {
      Self::Failed(Failure::Direct { .. }) => Some(name.to_string()),
      Self::Failed(Failure::Skipped { cause }) => Some(cause.clone()),
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_terminal_states() {
    assert!(!NodeState::Declared.is_terminal());
    assert!(!NodeState::Pending { waiting: 2 }.is_terminal());
    assert!(!NodeState::Dispatched.is_terminal());
    assert!(NodeState::Succeeded.is_terminal());
    assert!(
      NodeState::Failed(Failure::Skipped {
        cause: "vpc".to_string()
      })
      .is_terminal()
    );
  }

  #[test]
  fn test_failure_origin_follows_skip_cause() {
    let direct = NodeState::Failed(Failure::Direct {
      error: "quota".to_string(),
    });
    let skipped = NodeState::Failed(Failure::Skipped {
      cause: "vpc".to_string(),
    });

    assert_eq!(direct.failure_origin("vpc"), Some("vpc".to_string()));
    assert_eq!(skipped.failure_origin("vpc-nat"), Some("vpc".to_string()));
    assert_eq!(NodeState::Succeeded.failure_origin("api"), None);
    assert_eq!(NodeState::Dispatched.failure_origin("api"), None);
  }
}
