use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::ArtifactError;

/// What to build and where to push it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
  /// Name of the graph node the build belongs to.
  pub name: String,
  /// Fully qualified target, e.g. `<repository_url>:latest`.
  pub image_name: String,
  pub context: PathBuf,
  pub dockerfile: PathBuf,
  pub platform: String,
}

/// A pushed image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
  pub image_name: String,
  /// Content-addressable reference, `<repository>@sha256:<hex>`.
  pub repo_digest: String,
}

/// Artifact preparation service.
///
/// Failures are reported once and never retried by the caller.
#[async_trait]
pub trait ArtifactBuilder: Send + Sync {
  async fn build(&self, request: BuildRequest) -> Result<ImageRef, ArtifactError>;
}

/// Builder that computes a digest from the request instead of building.
#[derive(Debug, Default)]
pub struct SimulatedBuilder {
  failure: Mutex<Option<String>>,
  push_failure: Mutex<Option<String>>,
  builds: Mutex<Vec<BuildRequest>>,
}

impl SimulatedBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Make every subsequent build fail with `message`.
  pub fn fail(&self, message: impl Into<String>) {
    *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.into());
  }

  /// Let builds succeed but make every subsequent push fail with `message`.
  pub fn fail_push(&self, message: impl Into<String>) {
    *self
      .push_failure
      .lock()
      .unwrap_or_else(PoisonError::into_inner) = Some(message.into());
  }

  /// Requests received so far.
  pub fn builds(&self) -> Vec<BuildRequest> {
    self
      .builds
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }
}

#[async_trait]
impl ArtifactBuilder for SimulatedBuilder {
  async fn build(&self, request: BuildRequest) -> Result<ImageRef, ArtifactError> {
    self
      .builds
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push(request.clone());

    if let Some(message) = self
      .failure
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
    {
      return Err(ArtifactError::Build {
        name: request.name,
        message,
      });
    }

    let mut hasher = Sha256::new();
    hasher.update(request.image_name.as_bytes());
    hasher.update(request.context.to_string_lossy().as_bytes());
    hasher.update(request.dockerfile.to_string_lossy().as_bytes());
    hasher.update(request.platform.as_bytes());
    let digest = hex::encode(hasher.finalize());

    let repo_digest = format!("{}@sha256:{digest}", repository(&request.image_name));
    info!(image = %request.image_name, digest = %repo_digest, "image_built");

    if let Some(message) = self
      .push_failure
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
    {
      warn!(image = %request.image_name, error = %message, "image_push_failed");
      return Err(ArtifactError::Push {
        image_name: request.image_name,
        message,
      });
    }

    Ok(ImageRef {
      image_name: request.image_name,
      repo_digest,
    })
  }
}

/// The image name without its tag. A `:` before the last `/` is a registry
/// port, not a tag.
fn repository(image_name: &str) -> &str {
  let last_segment = image_name.rfind('/').map_or(0, |i| i + 1);
  match image_name[last_segment..].rfind(':') {
    Some(i) => &image_name[..last_segment + i],
    None => image_name,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn request() -> BuildRequest {
    BuildRequest {
      name: "app-image".to_string(),
      image_name: "123456789012.dkr.ecr.us-east-1.amazonaws.com/registry:latest".to_string(),
      context: PathBuf::from("."),
      dockerfile: PathBuf::from("app/Dockerfile"),
      platform: "linux/arm64".to_string(),
    }
  }

  #[test]
  fn test_repository_strips_tag_only() {
    assert_eq!(repository("host/repo:latest"), "host/repo");
    assert_eq!(repository("host:5000/repo"), "host:5000/repo");
    assert_eq!(repository("repo"), "repo");
  }

  #[tokio::test]
  async fn test_digest_is_content_addressed() {
    let builder = SimulatedBuilder::new();
    let first = builder.build(request()).await.unwrap();
    let second = builder.build(request()).await.unwrap();

    assert_eq!(first, second);
    assert!(
      first
        .repo_digest
        .starts_with("123456789012.dkr.ecr.us-east-1.amazonaws.com/registry@sha256:")
    );

    let mut other = request();
    other.platform = "linux/amd64".to_string();
    assert_ne!(builder.build(other).await.unwrap().repo_digest, first.repo_digest);
    assert_eq!(builder.builds().len(), 3);
  }

  #[tokio::test]
  async fn test_failure_is_reported() {
    let builder = SimulatedBuilder::new();
    builder.fail("no space left on device");

    let err = builder.build(request()).await.unwrap_err();
    assert_eq!(
      err,
      ArtifactError::Build {
        name: "app-image".to_string(),
        message: "no space left on device".to_string(),
      }
    );
  }

  #[tokio::test]
  async fn test_push_failure_follows_a_successful_build() {
    let builder = SimulatedBuilder::new();
    builder.fail_push("denied: not authorized to perform ecr:PutImage");

    let err = builder.build(request()).await.unwrap_err();
    assert_eq!(
      err,
      ArtifactError::Push {
        image_name: request().image_name,
        message: "denied: not authorized to perform ecr:PutImage".to_string(),
      }
    );
    assert_eq!(builder.builds(), vec![request()]);
  }
}
