use canopy_graph::ResourceKind;

/// Errors reported by a provisioning backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProvisionError {
  /// The backend refused to create the resource.
  #[error("backend rejected '{name}': {message}")]
  Rejected { name: String, message: String },

  /// A resolved input had the wrong shape.
  #[error("invalid input '{field}' for '{name}': {message}")]
  InvalidInput {
    name: String,
    field: String,
    message: String,
  },

  /// This backend does not create resources of this kind.
  #[error("resource kind '{kind}' is not handled by this backend")]
  Unsupported { kind: ResourceKind },

  /// The backend shut down while the request was queued.
  #[error("backend unavailable: {0}")]
  Unavailable(String),
}
