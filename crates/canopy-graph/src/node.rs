use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::deferred::{Deferred, OutputRef, Unresolved};

/// Attributes published by (or sent to) a provisioning call.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// The kind of infrastructure a node asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
  Network,
  Subnet,
  NatGateway,
  SecurityGroup,
  Cluster,
  Namespace,
  FrontDoor,
  FrontDoorStage,
  FrontDoorLink,
  Integration,
  Route,
  Function,
  Permission,
  Role,
  TaskDefinition,
  Service,
  ServiceRegistryEntry,
  Repository,
  Image,
  LogGroup,
}

impl ResourceKind {
  /// Inputs a node of this kind must declare before the graph can run.
  pub fn required_inputs(&self) -> &'static [&'static str] {
    match self {
      Self::Network => &["cidr_block"],
      Self::Subnet => &["vpc_id", "cidr_block"],
      Self::NatGateway => &["vpc_id"],
      Self::SecurityGroup => &["vpc_id"],
      Self::Cluster => &[],
      Self::Namespace => &["name", "vpc"],
      Self::FrontDoor => &["protocol_type"],
      Self::FrontDoorStage => &["api_id", "name"],
      Self::FrontDoorLink => &["security_group_ids", "subnet_ids"],
      Self::Integration => &["api_id", "integration_type", "integration_uri"],
      Self::Route => &["api_id", "route_key", "target"],
      Self::Function => &["role", "handler", "runtime", "code"],
      Self::Permission => &["action", "function", "principal", "source_arn"],
      Self::Role => &["assume_role_policy"],
      Self::TaskDefinition => &["family", "container_definitions", "execution_role_arn"],
      Self::Service => &["cluster", "task_definition"],
      Self::ServiceRegistryEntry => &["namespace_id"],
      Self::Repository => &[],
      Self::Image => &["image_name", "context", "dockerfile", "platform"],
      Self::LogGroup => &["retention_in_days"],
    }
  }
}

impl fmt::Display for ResourceKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::Network => "network",
      Self::Subnet => "subnet",
      Self::NatGateway => "nat_gateway",
      Self::SecurityGroup => "security_group",
      Self::Cluster => "cluster",
      Self::Namespace => "namespace",
      Self::FrontDoor => "front_door",
      Self::FrontDoorStage => "front_door_stage",
      Self::FrontDoorLink => "front_door_link",
      Self::Integration => "integration",
      Self::Route => "route",
      Self::Function => "function",
      Self::Permission => "permission",
      Self::Role => "role",
      Self::TaskDefinition => "task_definition",
      Self::Service => "service",
      Self::ServiceRegistryEntry => "service_registry_entry",
      Self::Repository => "repository",
      Self::Image => "image",
      Self::LogGroup => "log_group",
    };
    f.write_str(name)
  }
}

/// A node input: either known at declaration time or deferred.
#[derive(Debug, Clone)]
pub enum Input {
  Literal(serde_json::Value),
  Deferred(Deferred<serde_json::Value>),
}

impl Input {
  /// Node outputs this input reads.
  pub fn refs(&self) -> BTreeSet<OutputRef> {
    match self {
      Self::Literal(_) => BTreeSet::new(),
      Self::Deferred(d) => d.refs().clone(),
    }
  }

  /// Whether this input waits on a value no node in the graph produces.
  pub fn awaits_external(&self) -> bool {
    match self {
      Self::Literal(_) => false,
      Self::Deferred(d) => d.awaits_external(),
    }
  }

  pub async fn resolve(&self) -> Result<serde_json::Value, Unresolved> {
    match self {
      Self::Literal(v) => Ok(v.clone()),
      Self::Deferred(d) => d.value().await,
    }
  }
}

impl From<serde_json::Value> for Input {
  fn from(value: serde_json::Value) -> Self {
    Self::Literal(value)
  }
}

impl<T> From<Deferred<T>> for Input
where
  T: Serialize + Clone + Send + Sync + 'static,
{
  fn from(value: Deferred<T>) -> Self {
    Self::Deferred(value.erase())
  }
}

impl<T> From<&Deferred<T>> for Input
where
  T: Serialize + Clone + Send + Sync + 'static,
{
  fn from(value: &Deferred<T>) -> Self {
    Self::Deferred(value.erase())
  }
}

/// A request to create one piece of infrastructure.
#[derive(Debug, Clone)]
pub struct ResourceNode {
  kind: ResourceKind,
  name: String,
  inputs: BTreeMap<String, Input>,
}

impl ResourceNode {
  pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
    Self {
      kind,
      name: name.into(),
      inputs: BTreeMap::new(),
    }
  }

  /// Set an input field, replacing any previous value.
  pub fn input(mut self, field: impl Into<String>, value: impl Into<Input>) -> Self {
    self.inputs.insert(field.into(), value.into());
    self
  }

  pub fn kind(&self) -> ResourceKind {
    self.kind
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn inputs(&self) -> &BTreeMap<String, Input> {
    &self.inputs
  }

  /// Names of the nodes this node reads outputs from.
  pub fn dependencies(&self) -> BTreeSet<String> {
    self
      .inputs
      .values()
      .flat_map(|input| input.refs())
      .map(|r| r.node)
      .collect()
  }

  /// Required inputs this node does not declare.
  pub fn missing_inputs(&self) -> Vec<&'static str> {
    self
      .kind
      .required_inputs()
      .iter()
      .filter(|field| !self.inputs.contains_key(**field))
      .copied()
      .collect()
  }

  /// Inputs still waiting on an unresolved external value.
  ///
  /// The scheduler cannot order a node behind such a value, so a graph with
  /// any is rejected before dispatch.
  pub fn unbound_inputs(&self) -> Vec<&str> {
    self
      .inputs
      .iter()
      .filter(|(_, input)| input.awaits_external())
      .map(|(field, _)| field.as_str())
      .collect()
  }

  /// Wait for every input and collect the concrete request body.
  ///
  /// Fails with the first unresolved input.
  pub async fn resolve_inputs(&self) -> Result<Attributes, Unresolved> {
    let mut resolved = Attributes::new();
    for (field, input) in &self.inputs {
      resolved.insert(field.clone(), input.resolve().await?);
    }
    Ok(resolved)
  }

  /// A snapshot of what this node asks for, without resolving anything.
  pub fn declaration(&self) -> Declaration {
    Declaration {
      kind: self.kind,
      name: self.name.clone(),
      inputs: self
        .inputs
        .iter()
        .map(|(field, input)| {
          let declared = match input {
            Input::Literal(value) => DeclaredInput::Literal {
              value: value.clone(),
            },
            Input::Deferred(d) => DeclaredInput::Reference {
              refs: d.refs().clone(),
            },
          };
          (field.clone(), declared)
        })
        .collect(),
    }
  }
}

/// Serializable snapshot of a [`ResourceNode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Declaration {
  pub kind: ResourceKind,
  pub name: String,
  pub inputs: BTreeMap<String, DeclaredInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeclaredInput {
  Literal { value: serde_json::Value },
  Reference { refs: BTreeSet<OutputRef> },
}

/// Handle to a submitted node's deferred outputs.
///
/// Owned by the assembly that submitted the node; other assemblies borrow it
/// to read outputs.
#[derive(Debug)]
pub struct ResourceHandle {
  kind: ResourceKind,
  name: String,
  outputs: Deferred<Attributes>,
}

impl ResourceHandle {
  pub(crate) fn new(kind: ResourceKind, name: String, outputs: Deferred<Attributes>) -> Self {
    Self {
      kind,
      name,
      outputs,
    }
  }

  pub fn kind(&self) -> ResourceKind {
    self.kind
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// One published attribute, as raw JSON.
  pub fn output(&self, attribute: &str) -> Deferred<serde_json::Value> {
    let node = self.name.clone();
    let attr = attribute.to_string();
    self
      .outputs
      .try_resolve(move |outputs| {
        outputs
          .get(&attr)
          .cloned()
          .ok_or(Unresolved::MissingOutput {
            node,
            attribute: attr,
          })
      })
      .with_refs(BTreeSet::from([OutputRef::new(&self.name, attribute)]))
  }

  /// One published attribute, decoded.
  pub fn output_as<T>(&self, attribute: &str) -> Deferred<T>
  where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
  {
    self.output(attribute).decode()
  }

  /// The provider-assigned identifier.
  pub fn id(&self) -> Deferred<String> {
    self.output_as("id")
  }

  pub fn arn(&self) -> Deferred<String> {
    self.output_as("arn")
  }
}
