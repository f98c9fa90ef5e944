use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A front door route key such as `GET /pets`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RouteKey {
  method: String,
  path: String,
}

impl RouteKey {
  pub fn new(method: &str, path: &str) -> Result<Self, ConfigError> {
    let route = format!("{method} {path}");
    let invalid = |message: &str| ConfigError::InvalidRoute {
      route: route.clone(),
      message: message.to_string(),
    };

    if method.is_empty() || !method.chars().all(|c| c.is_ascii_uppercase()) {
      return Err(invalid("method must be an uppercase HTTP method or ANY"));
    }
    if !path.starts_with('/') {
      return Err(invalid("path must start with '/'"));
    }
    if path.contains(char::is_whitespace) || path.contains('*') {
      return Err(invalid("path must not contain whitespace or wildcards"));
    }

    Ok(Self {
      method: method.to_string(),
      path: path.to_string(),
    })
  }

  /// A route key known to be well formed, for built-in defaults.
  pub(crate) fn builtin(method: &str, path: &str) -> Self {
    Self {
      method: method.to_string(),
      path: path.to_string(),
    }
  }

  pub fn method(&self) -> &str {
    &self.method
  }

  pub fn path(&self) -> &str {
    &self.path
  }
}

impl fmt::Display for RouteKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.method, self.path)
  }
}

impl FromStr for RouteKey {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.split_once(' ') {
      Some((method, path)) => Self::new(method, path),
      None => Err(ConfigError::InvalidRoute {
        route: s.to_string(),
        message: "expected '<METHOD> <path>'".to_string(),
      }),
    }
  }
}

impl TryFrom<String> for RouteKey {
  type Error = ConfigError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<RouteKey> for String {
  fn from(value: RouteKey) -> Self {
    value.to_string()
  }
}
