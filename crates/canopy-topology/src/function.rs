//! The function compute variant.

use canopy_artifact::Packager;
use canopy_config::FunctionConfig;
use canopy_graph::{ResourceGraph, ResourceHandle, ResourceKind, ResourceNode};
use serde_json::json;
use tracing::info;

use crate::error::TopologyError;
use crate::front_door::FrontDoor;
use crate::policy::{FUNCTION_EXECUTION_POLICY, FUNCTION_PRINCIPAL, assume_role_policy};

/// Execution role and function, routed directly from the front door.
#[derive(Debug)]
pub struct Function {
  role: ResourceHandle,
  function: ResourceHandle,
}

impl Function {
  /// Package the function, declare it, and attach it to the front door.
  ///
  /// Packaging runs first. If it fails, nothing is added to the graph.
  pub async fn declare(
    graph: &mut ResourceGraph,
    config: &FunctionConfig,
    packager: &dyn Packager,
    front_door: &mut FrontDoor,
  ) -> Result<Self, TopologyError> {
    let bundle = packager
      .package(&config.source_dir, &config.platform)
      .await?;
    info!(bundle = %bundle.path.display(), "function_packaged");

    let role = graph.submit(
      ResourceNode::new(ResourceKind::Role, "lambda-execution-role")
        .input("assume_role_policy", assume_role_policy(FUNCTION_PRINCIPAL))
        .input("managed_policy_arns", json!([FUNCTION_EXECUTION_POLICY])),
    )?;

    let function = graph.submit(
      ResourceNode::new(ResourceKind::Function, "handler")
        .input("role", role.arn())
        .input("handler", json!(config.handler))
        .input("runtime", json!(config.runtime))
        .input("architectures", json!([config.platform.arch]))
        .input(
          "code",
          json!({
            "archive": {
              "path": bundle.path.display().to_string(),
              "entrypoint": bundle.entrypoint,
            },
          }),
        ),
    )?;

    front_door.register_function(graph, &function, &config.route)?;

    Ok(Self { role, function })
  }

  pub fn role(&self) -> &ResourceHandle {
    &self.role
  }

  pub fn function(&self) -> &ResourceHandle {
    &self.function
  }
}
