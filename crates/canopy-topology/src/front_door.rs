//! The shared HTTP front door.

use canopy_config::FrontDoorConfig;
use canopy_graph::{Deferred, ResourceGraph, ResourceHandle, ResourceKind, ResourceNode};
use serde_json::json;

use crate::error::TopologyError;
use crate::export::ExportSink;
use crate::network::Network;
use crate::wiring::{EgressRule, WiringRecord};

/// HTTP API, its auto-deploying stage, and the private link into the
/// network together with the link's security group.
///
/// Compute assemblies attach through
/// [`register_service_discovery`](FrontDoor::register_service_discovery) and
/// [`register_function`](FrontDoor::register_function).
#[derive(Debug)]
pub struct FrontDoor {
  pub(crate) api: ResourceHandle,
  pub(crate) stage: ResourceHandle,
  pub(crate) link_security_group: ResourceHandle,
  pub(crate) link: ResourceHandle,
  pub(crate) wiring: Vec<WiringRecord>,
}

impl FrontDoor {
  /// Declare the front door and export its public address.
  pub fn declare(
    graph: &mut ResourceGraph,
    config: &FrontDoorConfig,
    network: &Network,
    exports: &mut ExportSink,
  ) -> Result<Self, TopologyError> {
    let api = graph.submit(
      ResourceNode::new(ResourceKind::FrontDoor, "api").input("protocol_type", json!(config.protocol)),
    )?;

    let stage = graph.submit(
      ResourceNode::new(ResourceKind::FrontDoorStage, "default-stage")
        .input("api_id", api.id())
        .input("name", json!(config.stage_name))
        .input("auto_deploy", json!(true)),
    )?;

    let link_security_group = graph.submit(
      ResourceNode::new(ResourceKind::SecurityGroup, "vpc-link-sg")
        .input("vpc_id", network.vpc_id())
        .input("egress", json!([EgressRule::all()]))
        .input("revoke_rules_on_delete", json!(true)),
    )?;

    let link = graph.submit(
      ResourceNode::new(ResourceKind::FrontDoorLink, "vpc-link")
        .input(
          "security_group_ids",
          link_security_group.id().resolve(|id| vec![id]),
        )
        .input("subnet_ids", network.private_subnet_ids()),
    )?;

    exports.export(
      config.export_key.clone(),
      &stage.output_as::<String>("invoke_url"),
    )?;

    Ok(Self {
      api,
      stage,
      link_security_group,
      link,
      wiring: Vec::new(),
    })
  }

  pub fn api(&self) -> &ResourceHandle {
    &self.api
  }

  pub fn stage(&self) -> &ResourceHandle {
    &self.stage
  }

  /// The isolation boundary traffic from the front door originates in.
  pub fn link_security_group(&self) -> &ResourceHandle {
    &self.link_security_group
  }

  pub fn link(&self) -> &ResourceHandle {
    &self.link
  }

  /// Public address of the default stage.
  pub fn invoke_url(&self) -> Deferred<String> {
    self.stage.output_as("invoke_url")
  }

  /// Every attachment made so far, in registration order.
  pub fn wiring(&self) -> &[WiringRecord] {
    &self.wiring
  }

  pub(crate) fn into_wiring(self) -> Vec<WiringRecord> {
    self.wiring
  }
}
