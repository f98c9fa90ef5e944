//! The foundational network assembly.

use canopy_config::NetworkConfig;
use canopy_graph::{Deferred, GraphError, ResourceGraph, ResourceHandle, ResourceKind, ResourceNode};
use serde_json::json;

/// Virtual network, private subnets behind a single NAT gateway, the private
/// DNS namespace, and the cluster.
#[derive(Debug)]
pub struct Network {
  vpc: ResourceHandle,
  nat: ResourceHandle,
  private_subnets: Vec<ResourceHandle>,
  namespace: ResourceHandle,
  cluster: ResourceHandle,
}

impl Network {
  pub fn declare(graph: &mut ResourceGraph, config: &NetworkConfig) -> Result<Self, GraphError> {
    let vpc = graph.submit(
      ResourceNode::new(ResourceKind::Network, "vpc")
        .input("cidr_block", json!(config.cidr_block))
        .input("subnet_strategy", json!("auto"))
        .input("enable_dns_hostnames", json!(true)),
    )?;

    let nat = graph.submit(
      ResourceNode::new(ResourceKind::NatGateway, "vpc-nat")
        .input("vpc_id", vpc.id())
        .input("strategy", json!("single")),
    )?;

    let private_subnets = config
      .private_subnets
      .iter()
      .enumerate()
      .map(|(i, cidr)| {
        graph.submit(
          ResourceNode::new(ResourceKind::Subnet, format!("vpc-private-{i}"))
            .input("vpc_id", vpc.id())
            .input("cidr_block", json!(cidr))
            .input("egress_nat_gateway_id", nat.id())
            .input("map_public_ip_on_launch", json!(false)),
        )
      })
      .collect::<Result<Vec<_>, _>>()?;

    let namespace = graph.submit(
      ResourceNode::new(ResourceKind::Namespace, config.namespace.clone())
        .input("name", json!(config.namespace))
        .input("vpc", vpc.id()),
    )?;

    let insights = if config.container_insights {
      "enabled"
    } else {
      "disabled"
    };
    let cluster = graph.submit(
      ResourceNode::new(ResourceKind::Cluster, "cluster")
        .input(
          "settings",
          json!([{ "name": "containerInsights", "value": insights }]),
        )
        .input(
          "service_connect_defaults",
          namespace
            .arn()
            .resolve(|arn| json!({ "namespace": arn })),
        ),
    )?;

    Ok(Self {
      vpc,
      nat,
      private_subnets,
      namespace,
      cluster,
    })
  }

  pub fn vpc(&self) -> &ResourceHandle {
    &self.vpc
  }

  pub fn vpc_id(&self) -> Deferred<String> {
    self.vpc.id()
  }

  pub fn nat_gateway(&self) -> &ResourceHandle {
    &self.nat
  }

  /// Identifiers of every private subnet, in declaration order.
  pub fn private_subnet_ids(&self) -> Deferred<Vec<String>> {
    Deferred::all(self.private_subnets.iter().map(ResourceHandle::id))
  }

  pub fn namespace(&self) -> &ResourceHandle {
    &self.namespace
  }

  pub fn cluster(&self) -> &ResourceHandle {
    &self.cluster
  }
}
