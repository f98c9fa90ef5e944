//! Attaching compute assemblies to the front door and the network.
//!
//! Two attachments exist. The container service registers a service
//! discovery entry and gets a proxy route through the private link. The
//! function gets a direct-invoke route plus a permission letting the front
//! door, and only the front door, invoke it.
//!
//! Every rule that admits traffic is checked when its deferred inputs
//! resolve. A rule that fails the check fails its own node as a wiring
//! error.

use canopy_config::RouteKey;
use canopy_graph::{Deferred, ResourceGraph, ResourceHandle, ResourceKind, ResourceNode, Unresolved};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::TopologyError;
use crate::front_door::FrontDoor;

pub(crate) const INVOKE_ACTION: &str = "lambda:InvokeFunction";
pub(crate) const FRONT_DOOR_PRINCIPAL: &str = "apigateway.amazonaws.com";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WiringError {
  #[error("permission source pattern '{pattern}' contains a wildcard")]
  OverbroadGrant { pattern: String },

  #[error("permission source pattern '{pattern}' is not scoped to '{execution_arn}'")]
  ForeignCaller {
    pattern: String,
    execution_arn: String,
  },

  #[error("ingress on port {port} is not scoped to a single peer: {reason}")]
  OpenIngress { port: u16, reason: String },

  #[error("route '{route}' is already registered")]
  DuplicateRoute { route: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeVariant {
  Container,
  Function,
}

/// One inbound security group rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
  pub protocol: String,
  pub from_port: u16,
  pub to_port: u16,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub security_groups: Vec<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub cidr_blocks: Vec<String>,
}

impl IngressRule {
  /// TCP on exactly `port`, from exactly one peer security group.
  pub fn from_peer(port: u16, security_group_id: impl Into<String>) -> Self {
    Self {
      protocol: "tcp".to_string(),
      from_port: port,
      to_port: port,
      security_groups: vec![security_group_id.into()],
      cidr_blocks: Vec::new(),
    }
  }

  pub fn check_scoped(&self) -> Result<(), WiringError> {
    let open = |reason: &str| WiringError::OpenIngress {
      port: self.from_port,
      reason: reason.to_string(),
    };

    if self.from_port != self.to_port {
      return Err(open("port range"));
    }
    if !self.cidr_blocks.is_empty() {
      return Err(open("address range"));
    }
    match self.security_groups.as_slice() {
      [peer] if !peer.trim().is_empty() => Ok(()),
      _ => Err(open("expected exactly one peer security group")),
    }
  }
}

/// One outbound security group rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EgressRule {
  pub protocol: String,
  pub from_port: u16,
  pub to_port: u16,
  pub cidr_blocks: Vec<String>,
  pub description: String,
}

impl EgressRule {
  /// Any protocol, any port, anywhere.
  pub fn all() -> Self {
    Self {
      protocol: "-1".to_string(),
      from_port: 0,
      to_port: 0,
      cidr_blocks: vec!["0.0.0.0/0".to_string()],
      description: "Egress all".to_string(),
    }
  }
}

/// The invocation permission created for a function attachment.
#[derive(Debug, Clone)]
pub struct PermissionGrant {
  /// Name of the permission node.
  pub node: String,
  pub action: String,
  pub principal: String,
  /// Calls allowed, `<execution_arn>/<stage>/<METHOD><path>`.
  pub source_arn: Deferred<String>,
}

/// What a compute assembly attached to the front door.
#[derive(Debug, Clone)]
pub struct WiringRecord {
  pub variant: ComputeVariant,
  pub route_key: RouteKey,
  pub route_node: String,
  pub integration_node: String,
  /// Where the integration forwards to.
  pub integration_uri: Deferred<String>,
  /// The route target, `integrations/<id>`.
  pub target: Deferred<String>,
  pub grant: Option<PermissionGrant>,
}

/// The permission source pattern for one route of one front door.
pub fn scoped_source_pattern(
  execution_arn: &str,
  stage: &str,
  route: &RouteKey,
) -> Result<String, WiringError> {
  let pattern = format!("{execution_arn}/{stage}/{}{}", route.method(), route.path());
  validate_source_pattern(&pattern, execution_arn)?;
  Ok(pattern)
}

/// The ingress rules admitting only `peer` on `port`.
///
/// A blank peer would leave the rule without a source, so it is rejected
/// rather than provisioned.
pub fn scoped_ingress(port: u16, peer: &str) -> Result<Vec<IngressRule>, WiringError> {
  let rule = IngressRule::from_peer(port, peer);
  rule.check_scoped()?;
  Ok(vec![rule])
}

/// Reject a permission source pattern that would admit callers other than
/// the given front door.
pub fn validate_source_pattern(pattern: &str, execution_arn: &str) -> Result<(), WiringError> {
  if pattern.contains('*') {
    return Err(WiringError::OverbroadGrant {
      pattern: pattern.to_string(),
    });
  }
  if execution_arn.is_empty() || !pattern.starts_with(&format!("{execution_arn}/")) {
    return Err(WiringError::ForeignCaller {
      pattern: pattern.to_string(),
      execution_arn: execution_arn.to_string(),
    });
  }
  Ok(())
}

pub(crate) fn rejected(e: WiringError) -> Unresolved {
  Unresolved::rejected(e.to_string())
}

impl FrontDoor {
  /// Proxy `route` through the private link to a service discovery entry.
  pub fn register_service_discovery(
    &mut self,
    graph: &mut ResourceGraph,
    entry: &ResourceHandle,
    route: &RouteKey,
  ) -> Result<(), TopologyError> {
    self.check_route(route)?;

    let integration_uri = entry.arn();
    let integration = graph.submit(
      ResourceNode::new(ResourceKind::Integration, "integration")
        .input("api_id", self.api.id())
        .input("connection_id", self.link.id())
        .input("connection_type", json!("VPC_LINK"))
        .input("integration_method", json!("ANY"))
        .input("integration_type", json!("HTTP_PROXY"))
        .input("integration_uri", &integration_uri),
    )?;

    let record = self.register_route(
      graph,
      ComputeVariant::Container,
      "route",
      &integration,
      integration_uri,
      route,
    )?;
    self.wiring.push(record);
    Ok(())
  }

  /// Route `route` directly to a function, and grant the front door
  /// permission to invoke it.
  pub fn register_function(
    &mut self,
    graph: &mut ResourceGraph,
    function: &ResourceHandle,
    route: &RouteKey,
  ) -> Result<(), TopologyError> {
    self.check_route(route)?;

    let integration_uri = function.arn();
    let integration = graph.submit(
      ResourceNode::new(ResourceKind::Integration, "lambda-integration")
        .input("api_id", self.api.id())
        .input("integration_method", json!(route.method()))
        .input("integration_type", json!("AWS_PROXY"))
        .input("integration_uri", &integration_uri),
    )?;

    let mut record = self.register_route(
      graph,
      ComputeVariant::Function,
      "lambda-route",
      &integration,
      integration_uri,
      route,
    )?;

    let scope = route.clone();
    let source_arn = Deferred::combine(
      &self.api.output_as::<String>("execution_arn"),
      &self.stage.output_as::<String>("name"),
      |execution_arn, stage| (execution_arn, stage),
    )
    .try_resolve(move |(execution_arn, stage)| {
      scoped_source_pattern(&execution_arn, &stage, &scope).map_err(rejected)
    });

    let permission = graph.submit(
      ResourceNode::new(ResourceKind::Permission, "apigw-lambda-permission")
        .input("action", json!(INVOKE_ACTION))
        .input("function", function.output_as::<String>("name"))
        .input("principal", json!(FRONT_DOOR_PRINCIPAL))
        .input("source_arn", &source_arn),
    )?;

    record.grant = Some(PermissionGrant {
      node: permission.name().to_string(),
      action: INVOKE_ACTION.to_string(),
      principal: FRONT_DOOR_PRINCIPAL.to_string(),
      source_arn,
    });
    self.wiring.push(record);
    Ok(())
  }

  fn check_route(&self, route: &RouteKey) -> Result<(), WiringError> {
    if self.wiring.iter().any(|w| &w.route_key == route) {
      return Err(WiringError::DuplicateRoute {
        route: route.to_string(),
      });
    }
    Ok(())
  }

  fn register_route(
    &self,
    graph: &mut ResourceGraph,
    variant: ComputeVariant,
    name: &str,
    integration: &ResourceHandle,
    integration_uri: Deferred<String>,
    route: &RouteKey,
  ) -> Result<WiringRecord, TopologyError> {
    let target = integration.id().resolve(|id| format!("integrations/{id}"));
    let route_node = graph.submit(
      ResourceNode::new(ResourceKind::Route, name)
        .input("api_id", self.api.id())
        .input("route_key", json!(route.to_string()))
        .input("target", &target),
    )?;

    debug!(route = %route, node = %route_node.name(), variant = ?variant, "route_declared");

    Ok(WiringRecord {
      variant,
      route_key: route.clone(),
      route_node: route_node.name().to_string(),
      integration_node: integration.name().to_string(),
      integration_uri,
      target,
      grant: None,
    })
  }
}

#[cfg(test)]
mod tests {
  use canopy_config::{FrontDoorConfig, NetworkConfig};

  use super::*;
  use crate::export::ExportSink;
  use crate::network::Network;

  const EXECUTION_ARN: &str = "arn:aws:execute-api:us-east-1:123456789012:a1b2c3d4e5";

  fn route(s: &str) -> RouteKey {
    s.parse().unwrap()
  }

  fn front_door(graph: &mut ResourceGraph) -> FrontDoor {
    let network = Network::declare(graph, &NetworkConfig::default()).unwrap();
    FrontDoor::declare(
      graph,
      &FrontDoorConfig::default(),
      &network,
      &mut ExportSink::open(),
    )
    .unwrap()
  }

  #[test]
  fn test_source_pattern_is_scoped_to_route() {
    assert_eq!(
      scoped_source_pattern(EXECUTION_ARN, "$default", &route("GET /")).unwrap(),
      format!("{EXECUTION_ARN}/$default/GET/")
    );
    assert_eq!(
      scoped_source_pattern(EXECUTION_ARN, "prod", &route("POST /pets")).unwrap(),
      format!("{EXECUTION_ARN}/prod/POST/pets")
    );
  }

  #[test]
  fn test_wildcard_grant_is_rejected() {
    let widened = format!("{EXECUTION_ARN}/*/*/");
    assert_eq!(
      validate_source_pattern(&widened, EXECUTION_ARN),
      Err(WiringError::OverbroadGrant { pattern: widened })
    );
    assert!(scoped_source_pattern(EXECUTION_ARN, "*", &route("GET /")).is_err());
  }

  #[test]
  fn test_foreign_caller_is_rejected() {
    let other = "arn:aws:execute-api:us-east-1:123456789012:zzzzzzzzzz/$default/GET/";
    assert!(matches!(
      validate_source_pattern(other, EXECUTION_ARN),
      Err(WiringError::ForeignCaller { .. })
    ));
    // A shared prefix is not enough
    let sibling = format!("{EXECUTION_ARN}ff/$default/GET/");
    assert!(validate_source_pattern(&sibling, EXECUTION_ARN).is_err());
  }

  #[test]
  fn test_ingress_scoping() {
    assert!(IngressRule::from_peer(3000, "sg-0abc").check_scoped().is_ok());

    let mut range = IngressRule::from_peer(3000, "sg-0abc");
    range.to_port = 3100;
    assert!(range.check_scoped().is_err());

    let mut open = IngressRule::from_peer(3000, "sg-0abc");
    open.cidr_blocks = vec!["0.0.0.0/0".to_string()];
    assert!(open.check_scoped().is_err());

    let mut two = IngressRule::from_peer(3000, "sg-0abc");
    two.security_groups.push("sg-0def".to_string());
    assert!(two.check_scoped().is_err());
  }

  #[test]
  fn test_scoped_ingress_requires_a_peer() {
    let rules = scoped_ingress(3000, "sg-0abc").unwrap();
    assert_eq!(rules, vec![IngressRule::from_peer(3000, "sg-0abc")]);

    for peer in ["", "  "] {
      assert_eq!(
        scoped_ingress(3000, peer),
        Err(WiringError::OpenIngress {
          port: 3000,
          reason: "expected exactly one peer security group".to_string(),
        })
      );
    }
  }

  #[test]
  fn test_function_registration_declares_route_and_grant() {
    let mut graph = ResourceGraph::new();
    let mut front_door = front_door(&mut graph);
    let function = graph
      .submit(
        ResourceNode::new(ResourceKind::Function, "handler")
          .input("role", json!("arn:aws:iam::123456789012:role/r"))
          .input("handler", json!("bootstrap"))
          .input("runtime", json!("provided.al2023"))
          .input("code", json!({})),
      )
      .unwrap();

    front_door
      .register_function(&mut graph, &function, &route("GET /"))
      .unwrap();

    let view = graph.graph();
    assert_eq!(view.upstream("lambda-integration"), &["api", "handler"]);
    assert_eq!(view.upstream("lambda-route"), &["api", "lambda-integration"]);
    assert_eq!(
      view.upstream("apigw-lambda-permission"),
      &["api", "default-stage", "handler"]
    );

    let record = &front_door.wiring()[0];
    assert_eq!(record.variant, ComputeVariant::Function);
    assert_eq!(record.route_node, "lambda-route");
    assert_eq!(
      record.grant.as_ref().unwrap().node,
      "apigw-lambda-permission"
    );
  }

  #[test]
  fn test_duplicate_route_is_rejected() {
    let mut graph = ResourceGraph::new();
    let mut front_door = front_door(&mut graph);
    let entry = graph
      .submit(ResourceNode::new(ResourceKind::ServiceRegistryEntry, "cloudmap-service").input("namespace_id", json!("ns-1")))
      .unwrap();

    front_door
      .register_service_discovery(&mut graph, &entry, &route("GET /pets"))
      .unwrap();
    let err = front_door
      .register_function(&mut graph, &entry, &route("GET /pets"))
      .unwrap_err();

    assert!(matches!(
      err,
      TopologyError::Wiring(WiringError::DuplicateRoute { .. })
    ));
  }
}
