//! In-memory provisioning backend.
//!
//! Identifiers are derived from the resource kind and name, so two runs of
//! the same topology assign the same identifiers. Every call is recorded with
//! logical start and finish ticks, which lets callers check ordering without
//! relying on wall-clock time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use canopy_graph::{Attributes, ResourceKind};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::ProvisionError;
use crate::{ProvisionRequest, Provisioner};

const DEFAULT_ACCOUNT: &str = "123456789012";

/// One call the simulated backend received.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionRecord {
  pub kind: ResourceKind,
  pub name: String,
  pub inputs: Attributes,
  /// Logical time the call was admitted.
  pub started: u64,
  /// Logical time the call returned.
  pub finished: u64,
  pub succeeded: bool,
}

/// A backend that creates nothing but answers like one that does.
pub struct SimulatedProvisioner {
  account: String,
  region: String,
  limit: Semaphore,
  latency: Duration,
  failures: Mutex<HashMap<String, String>>,
  records: Mutex<Vec<ProvisionRecord>>,
  clock: AtomicU64,
  in_flight: AtomicUsize,
  peak: AtomicUsize,
}

impl SimulatedProvisioner {
  pub fn new(region: impl Into<String>) -> Self {
    Self {
      account: DEFAULT_ACCOUNT.to_string(),
      region: region.into(),
      limit: Semaphore::new(Semaphore::MAX_PERMITS),
      latency: Duration::ZERO,
      failures: Mutex::new(HashMap::new()),
      records: Mutex::new(Vec::new()),
      clock: AtomicU64::new(0),
      in_flight: AtomicUsize::new(0),
      peak: AtomicUsize::new(0),
    }
  }

  pub fn with_account(mut self, account: impl Into<String>) -> Self {
    self.account = account.into();
    self
  }

  /// Cap the number of calls in flight at once.
  pub fn with_concurrency(mut self, limit: usize) -> Self {
    self.limit = Semaphore::new(limit.max(1));
    self
  }

  /// Hold every call for `latency` before answering.
  pub fn with_latency(mut self, latency: Duration) -> Self {
    self.latency = latency;
    self
  }

  /// Reject the named resource with `message` when it is created.
  pub fn fail_on(&self, name: impl Into<String>, message: impl Into<String>) {
    self
      .failures
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(name.into(), message.into());
  }

  pub fn region(&self) -> &str {
    &self.region
  }

  pub fn account(&self) -> &str {
    &self.account
  }

  /// Every call received so far, in completion order.
  pub fn records(&self) -> Vec<ProvisionRecord> {
    self
      .records
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  /// The call for the named resource, if it was made.
  pub fn record(&self, name: &str) -> Option<ProvisionRecord> {
    self.records().into_iter().find(|r| r.name == name)
  }

  /// Largest number of calls that were in flight at the same time.
  pub fn peak_in_flight(&self) -> usize {
    self.peak.load(Ordering::SeqCst)
  }

  fn tick(&self) -> u64 {
    self.clock.fetch_add(1, Ordering::SeqCst)
  }

  fn arn(&self, service: &str, resource: &str) -> String {
    format!("arn:aws:{service}:{}:{}:{resource}", self.region, self.account)
  }

  fn respond(&self, request: &ProvisionRequest) -> Result<Attributes, ProvisionError> {
    if let Some(message) = self
      .failures
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .get(&request.name)
    {
      return Err(ProvisionError::Rejected {
        name: request.name.clone(),
        message: message.clone(),
      });
    }

    for field in request.kind.required_inputs() {
      if request.inputs.get(*field).is_none_or(Value::is_null) {
        return Err(ProvisionError::InvalidInput {
          name: request.name.clone(),
          field: field.to_string(),
          message: "required input is missing".to_string(),
        });
      }
    }

    let name = request.name.as_str();
    let region = self.region.as_str();
    let mut outputs = Attributes::new();

    let (id, arn) = match request.kind {
      ResourceKind::Network => {
        let id = identifier("vpc", request);
        let arn = self.arn("ec2", &format!("vpc/{id}"));
        outputs.insert("cidr_block".into(), request.inputs["cidr_block"].clone());
        (id, arn)
      }
      ResourceKind::Subnet => {
        let id = identifier("subnet", request);
        let arn = self.arn("ec2", &format!("subnet/{id}"));
        outputs.insert("vpc_id".into(), request.inputs["vpc_id"].clone());
        (id, arn)
      }
      ResourceKind::NatGateway => {
        let id = identifier("nat", request);
        let arn = self.arn("ec2", &format!("natgateway/{id}"));
        (id, arn)
      }
      ResourceKind::SecurityGroup => {
        let id = identifier("sg", request);
        let arn = self.arn("ec2", &format!("security-group/{id}"));
        (id, arn)
      }
      ResourceKind::Cluster => {
        let arn = self.arn("ecs", &format!("cluster/{name}"));
        outputs.insert("name".into(), json!(name));
        (name.to_string(), arn)
      }
      ResourceKind::Namespace => {
        let id = identifier("ns", request);
        let arn = self.arn("servicediscovery", &format!("namespace/{id}"));
        outputs.insert("name".into(), request.inputs["name"].clone());
        (id, arn)
      }
      ResourceKind::FrontDoor => {
        let id = short_identifier(request);
        let arn = format!("arn:aws:apigateway:{region}::/apis/{id}");
        outputs.insert(
          "api_endpoint".into(),
          json!(format!("https://{id}.execute-api.{region}.amazonaws.com")),
        );
        outputs.insert(
          "execution_arn".into(),
          json!(self.arn("execute-api", &id)),
        );
        (id, arn)
      }
      ResourceKind::FrontDoorStage => {
        let api_id = request.str_input("api_id")?;
        let stage = request.str_input("name")?;
        let id = stage.to_string();
        let arn = format!("arn:aws:apigateway:{region}::/apis/{api_id}/stages/{stage}");
        let mut invoke_url = format!("https://{api_id}.execute-api.{region}.amazonaws.com/");
        if stage != "$default" {
          invoke_url.push_str(stage);
        }
        outputs.insert("name".into(), json!(stage));
        outputs.insert("invoke_url".into(), json!(invoke_url));
        (id, arn)
      }
      ResourceKind::FrontDoorLink => {
        let id = short_identifier(request);
        let arn = format!("arn:aws:apigateway:{region}::/vpclinks/{id}");
        (id, arn)
      }
      ResourceKind::Integration => {
        let api_id = request.str_input("api_id")?;
        let id = short_identifier(request);
        let arn = format!("arn:aws:apigateway:{region}::/apis/{api_id}/integrations/{id}");
        (id, arn)
      }
      ResourceKind::Route => {
        let api_id = request.str_input("api_id")?;
        let id = short_identifier(request);
        let arn = format!("arn:aws:apigateway:{region}::/apis/{api_id}/routes/{id}");
        outputs.insert("route_key".into(), request.inputs["route_key"].clone());
        (id, arn)
      }
      ResourceKind::Function => {
        let arn = self.arn("lambda", &format!("function:{name}"));
        outputs.insert("name".into(), json!(name));
        outputs.insert(
          "invoke_arn".into(),
          json!(format!(
            "arn:aws:apigateway:{region}:lambda:path/2015-03-31/functions/{arn}/invocations"
          )),
        );
        (name.to_string(), arn)
      }
      ResourceKind::Permission => {
        let function = request.str_input("function")?;
        let id = identifier("perm", request);
        let arn = self.arn("lambda", &format!("function:{function}/policy/{id}"));
        (id, arn)
      }
      ResourceKind::Role => {
        let id = identifier("role", request);
        let arn = format!("arn:aws:iam::{}:role/{name}", self.account);
        outputs.insert("name".into(), json!(name));
        (id, arn)
      }
      ResourceKind::TaskDefinition => {
        let family = request.str_input("family")?;
        let arn = self.arn("ecs", &format!("task-definition/{family}:1"));
        outputs.insert("revision".into(), json!(1));
        (format!("{family}:1"), arn)
      }
      ResourceKind::Service => {
        let arn = self.arn("ecs", &format!("service/{name}"));
        outputs.insert("name".into(), json!(name));
        (name.to_string(), arn)
      }
      ResourceKind::ServiceRegistryEntry => {
        let id = identifier("srv", request);
        let arn = self.arn("servicediscovery", &format!("service/{id}"));
        (id, arn)
      }
      ResourceKind::Repository => {
        let arn = self.arn("ecr", &format!("repository/{name}"));
        outputs.insert(
          "repository_url".into(),
          json!(format!("{}.dkr.ecr.{region}.amazonaws.com/{name}", self.account)),
        );
        outputs.insert("registry_id".into(), json!(self.account));
        (name.to_string(), arn)
      }
      ResourceKind::LogGroup => {
        let arn = self.arn("logs", &format!("log-group:{name}"));
        outputs.insert("name".into(), json!(name));
        (name.to_string(), arn)
      }
      ResourceKind::Image => {
        return Err(ProvisionError::Unsupported { kind: request.kind });
      }
    };

    outputs.insert("id".into(), json!(id));
    outputs.insert("arn".into(), json!(arn));
    Ok(outputs)
  }
}

#[async_trait]
impl Provisioner for SimulatedProvisioner {
  async fn create(&self, request: ProvisionRequest) -> Result<Attributes, ProvisionError> {
    let _permit = self
      .limit
      .acquire()
      .await
      .map_err(|e| ProvisionError::Unavailable(e.to_string()))?;

    let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    self.peak.fetch_max(in_flight, Ordering::SeqCst);
    let started = self.tick();

    debug!(node = %request.name, kind = %request.kind, in_flight, "provision_call");

    if self.latency.is_zero() {
      tokio::task::yield_now().await;
    } else {
      tokio::time::sleep(self.latency).await;
    }

    let result = self.respond(&request);
    if let Err(e) = &result {
      warn!(node = %request.name, error = %e, "provision_rejected");
    }

    self.in_flight.fetch_sub(1, Ordering::SeqCst);
    let finished = self.tick();

    self
      .records
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push(ProvisionRecord {
        kind: request.kind,
        name: request.name,
        inputs: request.inputs,
        started,
        finished,
        succeeded: result.is_ok(),
      });

    result
  }
}

fn digest(request: &ProvisionRequest) -> String {
  let mut hasher = Sha256::new();
  hasher.update(request.kind.to_string().as_bytes());
  hasher.update(b":");
  hasher.update(request.name.as_bytes());
  hex::encode(hasher.finalize())
}

/// `<prefix>-<17 hex chars>`, shaped like an EC2-style identifier.
fn identifier(prefix: &str, request: &ProvisionRequest) -> String {
  format!("{prefix}-{}", &digest(request)[..17])
}

/// Ten lowercase characters, shaped like an API gateway identifier.
fn short_identifier(request: &ProvisionRequest) -> String {
  digest(request)[..10].to_string()
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;

  fn request(kind: ResourceKind, name: &str, inputs: Value) -> ProvisionRequest {
    let inputs = serde_json::from_value(inputs).unwrap();
    ProvisionRequest::new(kind, name, inputs)
  }

  #[tokio::test]
  async fn test_identifiers_are_deterministic() {
    let backend = SimulatedProvisioner::new("us-east-1");
    let vpc = || request(ResourceKind::Network, "vpc", json!({ "cidr_block": "10.0.0.0/16" }));

    let first = backend.create(vpc()).await.unwrap();
    let second = backend.create(vpc()).await.unwrap();

    assert_eq!(first, second);
    assert!(first["id"].as_str().unwrap().starts_with("vpc-"));
    assert_eq!(first["cidr_block"], json!("10.0.0.0/16"));
  }

  #[tokio::test]
  async fn test_front_door_and_stage_attributes() {
    let backend = SimulatedProvisioner::new("eu-west-1").with_account("111122223333");

    let api = backend
      .create(request(ResourceKind::FrontDoor, "api", json!({ "protocol_type": "HTTP" })))
      .await
      .unwrap();
    let api_id = api["id"].as_str().unwrap();
    assert_eq!(
      api["execution_arn"],
      json!(format!("arn:aws:execute-api:eu-west-1:111122223333:{api_id}"))
    );

    let stage = backend
      .create(request(
        ResourceKind::FrontDoorStage,
        "default-stage",
        json!({ "api_id": api_id, "name": "$default" }),
      ))
      .await
      .unwrap();
    assert_eq!(stage["name"], json!("$default"));
    assert_eq!(
      stage["invoke_url"],
      json!(format!("https://{api_id}.execute-api.eu-west-1.amazonaws.com/"))
    );
  }

  #[tokio::test]
  async fn test_injected_failure_is_recorded() {
    let backend = SimulatedProvisioner::new("us-east-1");
    backend.fail_on("vpc", "quota exceeded");

    let err = backend
      .create(request(ResourceKind::Network, "vpc", json!({ "cidr_block": "10.0.0.0/16" })))
      .await
      .unwrap_err();

    assert_eq!(
      err,
      ProvisionError::Rejected {
        name: "vpc".to_string(),
        message: "quota exceeded".to_string(),
      }
    );
    assert!(!backend.record("vpc").unwrap().succeeded);
  }

  #[tokio::test]
  async fn test_null_required_input_is_rejected() {
    let backend = SimulatedProvisioner::new("us-east-1");
    let err = backend
      .create(request(ResourceKind::SecurityGroup, "sg", json!({ "vpc_id": null })))
      .await
      .unwrap_err();
    assert!(matches!(err, ProvisionError::InvalidInput { field, .. } if field == "vpc_id"));
  }

  #[tokio::test]
  async fn test_images_are_not_provisioned_here() {
    let backend = SimulatedProvisioner::new("us-east-1");
    let err = backend
      .create(request(
        ResourceKind::Image,
        "app-image",
        json!({ "image_name": "x", "context": ".", "dockerfile": "Dockerfile", "platform": "linux/arm64" }),
      ))
      .await
      .unwrap_err();
    assert_eq!(
      err,
      ProvisionError::Unsupported {
        kind: ResourceKind::Image
      }
    );
  }

  #[tokio::test]
  async fn test_concurrency_limit_is_respected() {
    let backend = Arc::new(
      SimulatedProvisioner::new("us-east-1")
        .with_concurrency(2)
        .with_latency(Duration::from_millis(20)),
    );

    let calls = (0..6).map(|i| {
      let backend = backend.clone();
      async move {
        backend
          .create(request(ResourceKind::Cluster, &format!("cluster-{i}"), json!({})))
          .await
      }
    });
    let results = futures::future::join_all(calls).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(backend.records().len(), 6);
    assert!(backend.peak_in_flight() <= 2);
  }
}
