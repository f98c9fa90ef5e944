//! The container compute variant.

use canopy_config::{ContainerConfig, Platform};
use canopy_graph::{Deferred, ResourceGraph, ResourceHandle, ResourceKind, ResourceNode};
use serde_json::{Value, json};

use crate::error::TopologyError;
use crate::front_door::FrontDoor;
use crate::image::ContainerImage;
use crate::network::Network;
use crate::policy::{TASK_EXECUTION_POLICY, TASKS_PRINCIPAL, assume_role_policy};
use crate::wiring::{EgressRule, rejected, scoped_ingress};

const CONTAINER_NAME: &str = "app";

/// A long-running service on the cluster, reached from the front door
/// through the private link and service discovery.
#[derive(Debug)]
pub struct ContainerService {
  log_group: ResourceHandle,
  task_definition: ResourceHandle,
  security_group: ResourceHandle,
  registry_entry: ResourceHandle,
  service: ResourceHandle,
}

impl ContainerService {
  pub fn declare(
    graph: &mut ResourceGraph,
    config: &ContainerConfig,
    region: &str,
    network: &Network,
    image: &ContainerImage,
    front_door: &mut FrontDoor,
  ) -> Result<Self, TopologyError> {
    let log_group = graph.submit(
      ResourceNode::new(ResourceKind::LogGroup, "app-log-group")
        .input("retention_in_days", json!(config.log_retention_days)),
    )?;

    let execution_role = graph.submit(
      ResourceNode::new(ResourceKind::Role, "execution-role")
        .input("assume_role_policy", assume_role_policy(TASKS_PRINCIPAL))
        .input("managed_policy_arns", json!([TASK_EXECUTION_POLICY])),
    )?;

    let task_role = graph.submit(
      ResourceNode::new(ResourceKind::Role, "task-role")
        .input("assume_role_policy", assume_role_policy(TASKS_PRINCIPAL)),
    )?;

    let port = config.port;
    let region = region.to_string();
    let container_definitions = Deferred::combine(
      &image.repo_digest(),
      &log_group.output_as::<String>("name"),
      move |digest, group| container_definitions(&digest, &group, &region, port),
    );

    let task_definition = graph.submit(
      ResourceNode::new(ResourceKind::TaskDefinition, "taskdef")
        .input("family", json!(CONTAINER_NAME))
        .input("cpu", json!(config.cpu))
        .input("memory", json!(config.memory))
        .input("requires_compatibilities", json!(["FARGATE"]))
        .input("network_mode", json!("awsvpc"))
        .input("runtime_platform", runtime_platform(&config.image.platform))
        .input("execution_role_arn", execution_role.arn())
        .input("task_role_arn", task_role.arn())
        .input("container_definitions", container_definitions),
    )?;

    // Only the link's security group may reach the container port
    let ingress = front_door
      .link_security_group()
      .id()
      .try_resolve(move |peer| scoped_ingress(port, &peer).map_err(rejected));

    let security_group = graph.submit(
      ResourceNode::new(ResourceKind::SecurityGroup, "service-sg")
        .input("vpc_id", network.vpc_id())
        .input("egress", json!([EgressRule::all()]))
        .input("ingress", ingress)
        .input("revoke_rules_on_delete", json!(true)),
    )?;

    let namespace_id = network.namespace().id();
    let registry_entry = graph.submit(
      ResourceNode::new(ResourceKind::ServiceRegistryEntry, "cloudmap-service")
        .input("namespace_id", &namespace_id)
        .input(
          "dns_config",
          namespace_id.resolve(|id| {
            json!({
              "namespace_id": id,
              "routing_policy": "MULTIVALUE",
              "dns_records": [{ "ttl": 300, "type": "SRV" }],
            })
          }),
        ),
    )?;

    front_door.register_service_discovery(graph, &registry_entry, &config.route)?;

    let network_configuration = Deferred::combine(
      &network.private_subnet_ids(),
      &security_group.id(),
      |subnets, group| {
        json!({
          "assign_public_ip": false,
          "security_groups": [group],
          "subnets": subnets,
        })
      },
    );

    let service = graph.submit(
      ResourceNode::new(ResourceKind::Service, "service")
        .input("cluster", network.cluster().arn())
        .input("desired_count", json!(config.desired_count))
        .input("deployment_maximum_percent", json!(200))
        .input("deployment_minimum_healthy_percent", json!(100))
        .input(
          "deployment_circuit_breaker",
          json!({ "enable": true, "rollback": true }),
        )
        .input("launch_type", json!("FARGATE"))
        .input("wait_for_steady_state", json!(true))
        .input("network_configuration", network_configuration)
        .input(
          "service_registries",
          registry_entry.arn().resolve(move |arn| {
            json!({
              "container_name": CONTAINER_NAME,
              "container_port": port,
              "registry_arn": arn,
            })
          }),
        )
        .input("task_definition", task_definition.arn()),
    )?;

    Ok(Self {
      log_group,
      task_definition,
      security_group,
      registry_entry,
      service,
    })
  }

  pub fn log_group(&self) -> &ResourceHandle {
    &self.log_group
  }

  pub fn task_definition(&self) -> &ResourceHandle {
    &self.task_definition
  }

  /// Isolation boundary of the running tasks.
  pub fn security_group(&self) -> &ResourceHandle {
    &self.security_group
  }

  /// The discovery entry the front door routes to.
  pub fn registry_entry(&self) -> &ResourceHandle {
    &self.registry_entry
  }

  pub fn service(&self) -> &ResourceHandle {
    &self.service
  }
}

fn container_definitions(image: &str, log_group: &str, region: &str, port: u16) -> Value {
  json!([{
    "name": CONTAINER_NAME,
    "image": image,
    "portMappings": [{ "containerPort": port }],
    "logConfiguration": {
      "logDriver": "awslogs",
      "options": {
        "awslogs-group": log_group,
        "awslogs-region": region,
        "awslogs-stream-prefix": CONTAINER_NAME,
      },
    },
  }])
}

fn runtime_platform(platform: &Platform) -> Value {
  let architecture = match platform.arch.as_str() {
    "amd64" | "x86_64" => "X86_64".to_string(),
    other => other.to_uppercase(),
  };
  json!({
    "cpu_architecture": architecture,
    "operating_system_family": platform.os.to_uppercase(),
  })
}
