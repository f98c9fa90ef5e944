use canopy_config::ImageConfig;
use canopy_graph::{Deferred, GraphError, ResourceGraph, ResourceHandle, ResourceKind, ResourceNode};
use serde_json::json;

/// The image repository and the image built into it.
#[derive(Debug)]
pub struct ContainerImage {
  repository: ResourceHandle,
  image: ResourceHandle,
}

impl ContainerImage {
  pub fn declare(graph: &mut ResourceGraph, config: &ImageConfig) -> Result<Self, GraphError> {
    let repository = graph.submit(
      ResourceNode::new(ResourceKind::Repository, "registry").input("force_delete", json!(true)),
    )?;

    let tag = config.tag.clone();
    let image = graph.submit(
      ResourceNode::new(ResourceKind::Image, "app-image")
        .input(
          "image_name",
          repository
            .output_as::<String>("repository_url")
            .resolve(move |url| format!("{url}:{tag}")),
        )
        .input("registry_id", repository.output("registry_id"))
        .input("context", json!(config.context))
        .input("dockerfile", json!(config.dockerfile))
        .input("platform", json!(config.platform)),
    )?;

    Ok(Self { repository, image })
  }

  pub fn repository(&self) -> &ResourceHandle {
    &self.repository
  }

  /// Content-addressable reference of the pushed image.
  pub fn repo_digest(&self) -> Deferred<String> {
    self.image.output_as("repo_digest")
  }
}
