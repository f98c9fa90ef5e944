//! Routes each request to the collaborator that handles its kind.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use canopy_artifact::{ArtifactBuilder, BuildRequest};
use canopy_graph::{Attributes, ResourceKind};
use canopy_provision::{ProvisionError, ProvisionRequest, Provisioner};
use serde_json::json;

/// Sends `image` nodes to the artifact builder and everything else to the
/// provisioning backend.
pub struct TopologyBackend {
  provisioner: Arc<dyn Provisioner>,
  builder: Arc<dyn ArtifactBuilder>,
}

impl TopologyBackend {
  pub fn new(provisioner: Arc<dyn Provisioner>, builder: Arc<dyn ArtifactBuilder>) -> Self {
    Self {
      provisioner,
      builder,
    }
  }

  async fn build(&self, request: ProvisionRequest) -> Result<Attributes, ProvisionError> {
    let build = BuildRequest {
      name: request.name.clone(),
      image_name: request.str_input("image_name")?.to_string(),
      context: PathBuf::from(request.str_input("context")?),
      dockerfile: PathBuf::from(request.str_input("dockerfile")?),
      platform: request.str_input("platform")?.to_string(),
    };

    let image = self
      .builder
      .build(build)
      .await
      .map_err(|e| ProvisionError::Rejected {
        name: request.name.clone(),
        message: e.to_string(),
      })?;

    Ok(Attributes::from([
      ("id".to_string(), json!(image.repo_digest)),
      ("image_name".to_string(), json!(image.image_name)),
      ("repo_digest".to_string(), json!(image.repo_digest)),
    ]))
  }
}

#[async_trait]
impl Provisioner for TopologyBackend {
  async fn create(&self, request: ProvisionRequest) -> Result<Attributes, ProvisionError> {
    match request.kind {
      ResourceKind::Image => self.build(request).await,
      _ => self.provisioner.create(request).await,
    }
  }
}
