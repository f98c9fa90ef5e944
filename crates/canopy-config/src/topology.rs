use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::route::RouteKey;

/// Full configuration of a deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
  /// Project name, used to tag the run.
  pub project: String,
  /// Region the resources are created in.
  pub region: String,
  pub network: NetworkConfig,
  pub front_door: FrontDoorConfig,
  pub container: ContainerConfig,
  pub function: FunctionConfig,
  pub backend: BackendConfig,
}

impl Default for TopologyConfig {
  fn default() -> Self {
    Self {
      project: "canopy".to_string(),
      region: "us-east-1".to_string(),
      network: NetworkConfig::default(),
      front_door: FrontDoorConfig::default(),
      container: ContainerConfig::default(),
      function: FunctionConfig::default(),
      backend: BackendConfig::default(),
    }
  }
}

impl TopologyConfig {
  /// Load and validate a configuration file.
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_json(&content)
  }

  /// Parse and validate a configuration from JSON.
  pub fn from_json(content: &str) -> Result<Self, ConfigError> {
    let config: Self = serde_json::from_str(content)?;
    config.validate()?;
    Ok(config)
  }

  /// Check constraints serde cannot express.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.region.is_empty() {
      return Err(ConfigError::invalid("region", "must not be empty"));
    }
    if self.network.private_subnets.is_empty() {
      return Err(ConfigError::invalid(
        "network.private_subnets",
        "at least one private subnet is required",
      ));
    }
    if self.container.port == 0 {
      return Err(ConfigError::invalid("container.port", "must be non-zero"));
    }
    if self.container.desired_count == 0 {
      return Err(ConfigError::invalid("container.desired_count", "must be non-zero"));
    }
    if self.container.route == self.function.route {
      return Err(ConfigError::invalid(
        "function.route",
        format!("collides with container route '{}'", self.container.route),
      ));
    }
    if self.front_door.export_key.is_empty() {
      return Err(ConfigError::invalid("front_door.export_key", "must not be empty"));
    }
    if self.function.package.command.is_empty() {
      return Err(ConfigError::invalid("function.package.command", "must not be empty"));
    }
    if self.backend.max_concurrency == 0 {
      return Err(ConfigError::invalid("backend.max_concurrency", "must be non-zero"));
    }
    Ok(())
  }
}

/// Virtual network, subnets, and the service-discovery namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
  pub cidr_block: String,
  /// One private subnet is created per entry.
  pub private_subnets: Vec<String>,
  /// Private DNS namespace for service discovery.
  pub namespace: String,
  pub container_insights: bool,
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self {
      cidr_block: "10.0.0.0/16".to_string(),
      private_subnets: vec!["10.0.0.0/19".to_string(), "10.0.32.0/19".to_string()],
      namespace: "chall.dev".to_string(),
      container_insights: true,
    }
  }
}

/// The shared HTTP entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontDoorConfig {
  pub protocol: String,
  pub stage_name: String,
  /// Name under which the public address is exported.
  pub export_key: String,
}

impl Default for FrontDoorConfig {
  fn default() -> Self {
    Self {
      protocol: "HTTP".to_string(),
      stage_name: "$default".to_string(),
      export_key: "url".to_string(),
    }
  }
}

/// The long-running container service variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
  /// Port the service listens on.
  pub port: u16,
  pub cpu: String,
  pub memory: String,
  pub desired_count: u32,
  pub route: RouteKey,
  pub log_retention_days: u32,
  pub image: ImageConfig,
}

impl Default for ContainerConfig {
  fn default() -> Self {
    Self {
      port: 3000,
      cpu: "256".to_string(),
      memory: "512".to_string(),
      desired_count: 1,
      route: RouteKey::builtin("GET", "/pets"),
      log_retention_days: 1,
      image: ImageConfig::default(),
    }
  }
}

/// How the container image is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
  pub context: PathBuf,
  pub dockerfile: PathBuf,
  pub platform: Platform,
  pub tag: String,
}

impl Default for ImageConfig {
  fn default() -> Self {
    Self {
      context: PathBuf::from("."),
      dockerfile: PathBuf::from("app/Dockerfile"),
      platform: Platform::linux_arm64(),
      tag: "latest".to_string(),
    }
  }
}

/// The directly-invoked function variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionConfig {
  pub route: RouteKey,
  pub source_dir: PathBuf,
  pub platform: Platform,
  pub runtime: String,
  pub handler: String,
  pub package: PackageConfig,
}

impl Default for FunctionConfig {
  fn default() -> Self {
    Self {
      route: RouteKey::builtin("GET", "/"),
      source_dir: PathBuf::from("./cmd/app"),
      platform: Platform::linux_arm64(),
      runtime: "provided.al2023".to_string(),
      handler: "bootstrap".to_string(),
      package: PackageConfig::default(),
    }
  }
}

/// The local command that produces the function bundle.
///
/// `{source}`, `{os}`, and `{arch}` in the command are substituted before it
/// runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageConfig {
  pub workdir: PathBuf,
  pub command: Vec<String>,
  /// Path of the produced bundle, relative to `workdir`.
  pub asset: PathBuf,
}

impl Default for PackageConfig {
  fn default() -> Self {
    Self {
      workdir: PathBuf::from("."),
      command: vec![
        "sh".to_string(),
        "-c".to_string(),
        "rm -rf asset && mkdir asset && GOOS={os} GOARCH={arch} go build -mod=readonly -o ./asset/bootstrap {source} && chmod +x ./asset/bootstrap".to_string(),
      ],
      asset: PathBuf::from("asset/bootstrap"),
    }
  }
}

/// Limits of the provisioning backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
  /// Provisioning calls allowed in flight at once.
  pub max_concurrency: usize,
  /// Simulated latency per call, in milliseconds.
  pub latency_ms: u64,
}

impl Default for BackendConfig {
  fn default() -> Self {
    Self {
      max_concurrency: 8,
      latency_ms: 0,
    }
  }
}

/// A target platform such as `linux/arm64`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Platform {
  pub os: String,
  pub arch: String,
}

impl Platform {
  pub fn linux_arm64() -> Self {
    Self {
      os: "linux".to_string(),
      arch: "arm64".to_string(),
    }
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.os, self.arch)
  }
}

impl FromStr for Platform {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.split_once('/') {
      Some((os, arch)) if !os.is_empty() && !arch.is_empty() && !arch.contains('/') => Ok(Self {
        os: os.to_string(),
        arch: arch.to_string(),
      }),
      _ => Err(ConfigError::invalid("platform", format!("expected '<os>/<arch>', got '{s}'"))),
    }
  }
}

impl TryFrom<String> for Platform {
  type Error = ConfigError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<Platform> for String {
  fn from(value: Platform) -> Self {
    value.to_string()
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use super::*;

  #[test]
  fn test_empty_object_uses_defaults() {
    let config = TopologyConfig::from_json("{}").unwrap();
    assert_eq!(config, TopologyConfig::default());
    assert_eq!(config.network.namespace, "chall.dev");
    assert_eq!(config.container.port, 3000);
    assert_eq!(config.container.route.to_string(), "GET /pets");
    assert_eq!(config.function.route.to_string(), "GET /");
    assert_eq!(config.function.platform.to_string(), "linux/arm64");
  }

  #[test]
  fn test_partial_sections_merge_with_defaults() {
    let config = TopologyConfig::from_json(
      r#"{ "region": "eu-west-1", "container": { "port": 8080 } }"#,
    )
    .unwrap();

    assert_eq!(config.region, "eu-west-1");
    assert_eq!(config.container.port, 8080);
    assert_eq!(config.container.cpu, "256");
  }

  #[test]
  fn test_rejects_colliding_routes() {
    let result = TopologyConfig::from_json(
      r#"{ "container": { "route": "GET /" }, "function": { "route": "GET /" } }"#,
    );
    assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "function.route"));
  }

  #[test]
  fn test_rejects_zero_port_and_empty_subnets() {
    assert!(TopologyConfig::from_json(r#"{ "container": { "port": 0 } }"#).is_err());
    assert!(TopologyConfig::from_json(r#"{ "network": { "private_subnets": [] } }"#).is_err());
  }

  #[test]
  fn test_rejects_malformed_platform() {
    let result = TopologyConfig::from_json(r#"{ "function": { "platform": "arm64" } }"#);
    assert!(matches!(result, Err(ConfigError::Parse(_))));
  }

  #[test]
  fn test_from_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{ "project": "pets" }}"#).unwrap();

    let config = TopologyConfig::from_path(file.path()).unwrap();
    assert_eq!(config.project, "pets");

    let missing = TopologyConfig::from_path("/nonexistent/topology.json");
    assert!(matches!(missing, Err(ConfigError::Io { .. })));
  }
}
