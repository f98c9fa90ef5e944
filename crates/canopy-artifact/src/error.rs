use std::path::PathBuf;

/// Errors building or pushing an image.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArtifactError {
  /// The build itself failed.
  #[error("image build '{name}' failed: {message}")]
  Build { name: String, message: String },

  /// The built image could not be pushed to its repository.
  #[error("pushing '{image_name}' failed: {message}")]
  Push { image_name: String, message: String },
}

/// Errors producing a function bundle.
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
  #[error("package command is empty")]
  EmptyCommand,

  #[error("failed to start '{program}'")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  /// The command ran but exited unsuccessfully.
  #[error("package command exited with {}: {stderr}", status.map_or("a signal".to_string(), |c| format!("status {c}")))]
  CommandFailed { status: Option<i32>, stderr: String },

  /// The command succeeded but did not produce the expected bundle.
  #[error("package command did not produce {}", path.display())]
  MissingAsset { path: PathBuf },
}
