//! Integration tests for Runtime::run against the simulated backend.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use canopy_graph::{Attributes, Deferred, GraphError, ResourceGraph, ResourceKind, ResourceNode, Unresolved};
use canopy_provision::{ProvisionError, ProvisionRequest, Provisioner, SimulatedProvisioner};
use canopy_runtime::{ChannelNotifier, NodeStatus, ProvisionEvent, Runtime, RuntimeError};
use serde_json::json;
use tokio::sync::mpsc;

fn network(name: &str) -> ResourceNode {
  ResourceNode::new(ResourceKind::Network, name).input("cidr_block", json!("10.0.0.0/16"))
}

/// vpc -> {sg, subnet} -> link, plus an unrelated repository.
fn diamond_with_sibling() -> ResourceGraph {
  let mut graph = ResourceGraph::new();
  let vpc = graph.submit(network("vpc")).unwrap();
  let sg = graph
    .submit(ResourceNode::new(ResourceKind::SecurityGroup, "sg").input("vpc_id", vpc.id()))
    .unwrap();
  let subnet = graph
    .submit(
      ResourceNode::new(ResourceKind::Subnet, "subnet")
        .input("vpc_id", vpc.id())
        .input("cidr_block", json!("10.0.0.0/19")),
    )
    .unwrap();
  graph
    .submit(
      ResourceNode::new(ResourceKind::FrontDoorLink, "link")
        .input("security_group_ids", sg.id().resolve(|id| vec![id]))
        .input("subnet_ids", subnet.id().resolve(|id| vec![id])),
    )
    .unwrap();
  graph
    .submit(ResourceNode::new(ResourceKind::Repository, "registry"))
    .unwrap();
  graph
}

fn runtime(backend: &Arc<SimulatedProvisioner>) -> Runtime {
  Runtime::new(backend.clone())
}

#[tokio::test]
async fn test_successful_run_respects_dependency_order() {
  let backend = Arc::new(SimulatedProvisioner::new("us-east-1"));
  let report = runtime(&backend).run(diamond_with_sibling()).await.unwrap();

  assert!(report.is_success());
  assert_eq!(report.outcomes.len(), 5);

  let started = |name: &str| backend.record(name).unwrap().started;
  let finished = |name: &str| backend.record(name).unwrap().finished;
  assert!(finished("vpc") < started("sg"));
  assert!(finished("vpc") < started("subnet"));
  assert!(finished("sg") < started("link"));
  assert!(finished("subnet") < started("link"));
}

#[tokio::test]
async fn test_resolved_outputs_flow_into_downstream_requests() {
  let backend = Arc::new(SimulatedProvisioner::new("us-east-1"));
  let report = runtime(&backend).run(diamond_with_sibling()).await.unwrap();

  let vpc_id = report.outputs("vpc").unwrap()["id"].clone();
  let sg_id = report.outputs("sg").unwrap()["id"].clone();

  assert_eq!(backend.record("sg").unwrap().inputs["vpc_id"], vpc_id);
  assert_eq!(
    backend.record("link").unwrap().inputs["security_group_ids"],
    json!([sg_id])
  );
}

#[tokio::test]
async fn test_handles_resolve_after_run() {
  let backend = Arc::new(SimulatedProvisioner::new("us-east-1"));
  let mut graph = ResourceGraph::new();
  let vpc = graph.submit(network("vpc")).unwrap();

  let report = runtime(&backend).run(graph).await.unwrap();

  assert_eq!(
    vpc.id().value().await.unwrap(),
    report.outputs("vpc").unwrap()["id"].as_str().unwrap()
  );
}

#[tokio::test]
async fn test_cycle_rejected_before_dispatch() {
  let backend = Arc::new(SimulatedProvisioner::new("us-east-1"));
  let mut graph = ResourceGraph::new();
  let b = graph.reference("b", ResourceKind::SecurityGroup);
  let a = graph
    .submit(ResourceNode::new(ResourceKind::SecurityGroup, "a").input("vpc_id", b.id()))
    .unwrap();
  graph
    .submit(ResourceNode::new(ResourceKind::SecurityGroup, "b").input("vpc_id", a.id()))
    .unwrap();
  graph.submit(network("vpc")).unwrap();

  let err = runtime(&backend).run(graph).await.unwrap_err();

  assert!(matches!(
    err,
    RuntimeError::Invalid(GraphError::CycleDetected { .. })
  ));
  assert!(backend.records().is_empty());
}

#[tokio::test]
async fn test_missing_input_rejected_before_dispatch() {
  let backend = Arc::new(SimulatedProvisioner::new("us-east-1"));
  let mut graph = ResourceGraph::new();
  graph.submit(network("vpc")).unwrap();
  graph
    .submit(ResourceNode::new(ResourceKind::Cluster, "cluster"))
    .unwrap();
  graph
    .submit(ResourceNode::new(ResourceKind::SecurityGroup, "sg"))
    .unwrap();

  let err = runtime(&backend).run(graph).await.unwrap_err();

  assert!(matches!(
    err,
    RuntimeError::Invalid(GraphError::MissingInput { ref node, .. }) if node == "sg"
  ));
  assert!(backend.records().is_empty());
}

#[tokio::test]
async fn test_input_awaiting_external_value_rejected_before_dispatch() {
  let backend = Arc::new(SimulatedProvisioner::new("us-east-1"));
  let (tx, mut rx) = mpsc::unbounded_channel();
  let runtime = Runtime::with_notifier(backend.clone(), ChannelNotifier::new(tx));

  // Held but never resolved: nothing in the graph will ever produce it
  let (_resolver, cidr) = Deferred::<String>::pending();
  let mut graph = ResourceGraph::new();
  graph
    .submit(ResourceNode::new(ResourceKind::Network, "vpc").input("cidr_block", &cidr))
    .unwrap();
  graph
    .submit(ResourceNode::new(ResourceKind::Repository, "registry"))
    .unwrap();

  let err = tokio::time::timeout(Duration::from_secs(5), runtime.run(graph))
    .await
    .expect("run should be rejected, not left waiting")
    .unwrap_err();
  drop(runtime);

  assert!(matches!(
    err,
    RuntimeError::Invalid(GraphError::UnboundInput { ref node, ref field })
      if node == "vpc" && field == "cidr_block"
  ));
  assert!(backend.records().is_empty());

  let mut events = Vec::new();
  while let Some(event) = rx.recv().await {
    events.push(event);
  }
  assert!(
    !events
      .iter()
      .any(|e| matches!(e, ProvisionEvent::NodeDispatched { .. }))
  );
}

#[tokio::test]
async fn test_external_value_resolved_before_run_is_accepted() {
  let backend = Arc::new(SimulatedProvisioner::new("us-east-1"));
  let (resolver, cidr) = Deferred::<String>::pending();
  resolver.resolve("10.1.0.0/16".to_string());

  let mut graph = ResourceGraph::new();
  graph
    .submit(ResourceNode::new(ResourceKind::Network, "vpc").input("cidr_block", &cidr))
    .unwrap();

  let report = runtime(&backend).run(graph).await.unwrap();

  assert!(report.is_success());
  assert_eq!(
    backend.record("vpc").unwrap().inputs["cidr_block"],
    json!("10.1.0.0/16")
  );
}

#[tokio::test]
async fn test_failure_skips_dependents_and_spares_siblings() {
  let backend = Arc::new(SimulatedProvisioner::new("us-east-1"));
  backend.fail_on("vpc", "VpcLimitExceeded");

  let err = runtime(&backend).run(diamond_with_sibling()).await.unwrap_err();
  let report = err.report().unwrap();

  assert_eq!(report.failed(), vec!["vpc"]);
  assert_eq!(report.invalidated_by("vpc"), vec!["link", "sg", "subnet"]);
  assert_eq!(report.succeeded(), vec!["registry"]);

  // Skipped nodes never reach the backend
  for name in ["sg", "subnet", "link"] {
    assert!(backend.record(name).is_none(), "{name} was dispatched");
  }
  assert!(backend.record("registry").unwrap().succeeded);
  assert!(err.to_string().contains("node 'vpc' failed"));
}

#[tokio::test]
async fn test_skip_cause_is_the_direct_failure() {
  let backend = Arc::new(SimulatedProvisioner::new("us-east-1"));
  backend.fail_on("sg", "InvalidGroup.Duplicate");

  let err = runtime(&backend).run(diamond_with_sibling()).await.unwrap_err();
  let report = err.report().unwrap();

  assert_eq!(report.failed(), vec!["sg"]);
  assert_eq!(
    report.status("link"),
    Some(&NodeStatus::Skipped {
      cause: "sg".to_string()
    })
  );
  // The other branch of the diamond still completed
  assert!(matches!(
    report.status("subnet"),
    Some(NodeStatus::Succeeded { .. })
  ));
}

#[tokio::test]
async fn test_unresolvable_input_is_a_wiring_failure() {
  let backend = Arc::new(SimulatedProvisioner::new("us-east-1"));
  let mut graph = ResourceGraph::new();
  let vpc = graph.submit(network("vpc")).unwrap();
  let sg = graph
    .submit(
      ResourceNode::new(ResourceKind::SecurityGroup, "sg")
        .input("vpc_id", vpc.output("not_published")),
    )
    .unwrap();
  graph
    .submit(
      ResourceNode::new(ResourceKind::FrontDoorLink, "link")
        .input("security_group_ids", sg.id())
        .input("subnet_ids", json!([])),
    )
    .unwrap();

  let err = runtime(&backend).run(graph).await.unwrap_err();
  let report = err.report().unwrap();

  match report.status("sg") {
    Some(NodeStatus::Failed { error }) => assert!(error.starts_with("wiring error")),
    other => panic!("unexpected status: {other:?}"),
  }
  assert_eq!(report.invalidated_by("sg"), vec!["link"]);
  assert!(backend.record("sg").is_none());
}

#[tokio::test]
async fn test_independent_nodes_run_concurrently() {
  let backend = Arc::new(SimulatedProvisioner::new("us-east-1").with_latency(Duration::from_millis(30)));
  let mut graph = ResourceGraph::new();
  for i in 0..4 {
    graph.submit(network(&format!("vpc-{i}"))).unwrap();
  }

  runtime(&backend).run(graph).await.unwrap();
  assert!(backend.peak_in_flight() > 1);
}

#[tokio::test]
async fn test_backend_limit_bounds_dispatch() {
  let backend = Arc::new(
    SimulatedProvisioner::new("us-east-1")
      .with_concurrency(1)
      .with_latency(Duration::from_millis(5)),
  );
  let mut graph = ResourceGraph::new();
  for i in 0..4 {
    graph.submit(network(&format!("vpc-{i}"))).unwrap();
  }

  runtime(&backend).run(graph).await.unwrap();
  assert_eq!(backend.peak_in_flight(), 1);
  assert_eq!(backend.records().len(), 4);
}

#[tokio::test]
async fn test_events_describe_the_run() {
  let backend = Arc::new(SimulatedProvisioner::new("us-east-1"));
  backend.fail_on("vpc", "VpcLimitExceeded");
  let (tx, mut rx) = mpsc::unbounded_channel();
  let runtime = Runtime::with_notifier(backend.clone(), ChannelNotifier::new(tx));

  let _ = runtime.run(diamond_with_sibling()).await;
  drop(runtime);

  let mut events = Vec::new();
  while let Some(event) = rx.recv().await {
    events.push(event);
  }

  assert!(matches!(
    events.first(),
    Some(ProvisionEvent::RunStarted { nodes: 5, .. })
  ));
  assert!(matches!(events.last(), Some(ProvisionEvent::RunFailed { .. })));

  let skipped: Vec<_> = events
    .iter()
    .filter_map(|e| match e {
      ProvisionEvent::NodeSkipped { node, cause, .. } => Some((node.as_str(), cause.as_str())),
      _ => None,
    })
    .collect();
  assert_eq!(skipped.len(), 3);
  assert!(skipped.iter().all(|(_, cause)| *cause == "vpc"));

  let dispatched = events
    .iter()
    .filter(|e| matches!(e, ProvisionEvent::NodeDispatched { .. }))
    .count();
  assert_eq!(dispatched, 2);
}

struct PanickingProvisioner;

#[async_trait]
impl Provisioner for PanickingProvisioner {
  async fn create(&self, request: ProvisionRequest) -> Result<Attributes, ProvisionError> {
    if request.name == "vpc" {
      panic!("backend bug");
    }
    Ok(Attributes::from([("id".to_string(), json!(request.name))]))
  }
}

#[tokio::test]
async fn test_panicking_call_fails_only_its_node() {
  let mut graph = ResourceGraph::new();
  let vpc = graph.submit(network("vpc")).unwrap();
  graph
    .submit(ResourceNode::new(ResourceKind::SecurityGroup, "sg").input("vpc_id", vpc.id()))
    .unwrap();
  graph
    .submit(ResourceNode::new(ResourceKind::Repository, "registry"))
    .unwrap();

  let err = Runtime::new(Arc::new(PanickingProvisioner))
    .run(graph)
    .await
    .unwrap_err();
  let report = err.report().unwrap();

  assert_eq!(report.failed(), vec!["vpc"]);
  assert_eq!(report.invalidated_by("vpc"), vec!["sg"]);
  assert_eq!(report.succeeded(), vec!["registry"]);
  assert_eq!(
    vpc.id().value().await,
    Err(Unresolved::Upstream {
      node: "vpc".to_string()
    })
  );
}
