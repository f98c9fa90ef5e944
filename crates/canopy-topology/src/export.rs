//! The terminal registry of user-visible outputs.
//!
//! A sink is opened when declaration starts, takes at most one value per
//! key, and is sealed once the run is over. Nothing reads values back out of
//! an open sink.

use std::collections::BTreeMap;

use canopy_graph::{Deferred, Unresolved};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExportError {
  #[error("output '{key}' was exported twice")]
  Duplicate { key: String },

  #[error("output '{key}' did not resolve: {reason}")]
  Unresolved { key: String, reason: Unresolved },
}

/// Final outputs of a run, by key.
pub type Exports = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Default)]
pub struct ExportSink {
  entries: BTreeMap<String, Deferred<serde_json::Value>>,
}

impl ExportSink {
  pub fn open() -> Self {
    Self::default()
  }

  /// Register a named output. Each key can be written once.
  pub fn export<T>(&mut self, key: impl Into<String>, value: &Deferred<T>) -> Result<(), ExportError>
  where
    T: Serialize + Clone + Send + Sync + 'static,
  {
    let key = key.into();
    if self.entries.contains_key(&key) {
      return Err(ExportError::Duplicate { key });
    }
    self.entries.insert(key, value.erase());
    Ok(())
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Close the sink and collect every value.
  ///
  /// Call after the run has finished; a value whose source never resolved
  /// is an error.
  pub async fn seal(self) -> Result<Exports, ExportError> {
    let mut exports = Exports::new();
    for (key, value) in self.entries {
      match value.value().await {
        Ok(value) => {
          info!(key = %key, value = %value, "output_exported");
          exports.insert(key, value);
        }
        Err(reason) => return Err(ExportError::Unresolved { key, reason }),
      }
    }
    Ok(exports)
  }
}
