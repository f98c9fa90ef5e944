use std::path::PathBuf;

/// Errors loading or validating a topology configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("failed to read config file {}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config: {0}")]
  Parse(#[from] serde_json::Error),

  #[error("invalid route key '{route}': {message}")]
  InvalidRoute { route: String, message: String },

  #[error("invalid value for '{field}': {message}")]
  Invalid { field: String, message: String },
}

impl ConfigError {
  pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
    Self::Invalid {
      field: field.to_string(),
      message: message.into(),
    }
  }
}
