use thiserror::Error;

use crate::node::ResourceKind;

/// Configuration errors in a declared resource graph.
///
/// All of these are detected before any node is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  #[error("duplicate resource name: {name}")]
  DuplicateNode { name: String },

  #[error("node '{node}' references undeclared node '{missing}'")]
  MissingDependency { node: String, missing: String },

  #[error("node '{node}' is missing required input '{field}'")]
  MissingInput { node: String, field: String },

  #[error("node '{node}' input '{field}' waits on a value no node produces")]
  UnboundInput { node: String, field: String },

  #[error("node '{name}' was referenced as {expected} but submitted as {found}")]
  KindMismatch {
    name: String,
    expected: ResourceKind,
    found: ResourceKind,
  },

  #[error("dependency cycle: {}", path.join(" -> "))]
  CycleDetected { path: Vec<String> },

  #[error("node not found: {name}")]
  NodeNotFound { name: String },
}
