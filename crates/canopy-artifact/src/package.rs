use std::path::{Path, PathBuf};

use async_trait::async_trait;
use canopy_config::{PackageConfig, Platform};
use tokio::process::Command;
use tracing::{info, warn};

use crate::error::PackageError;

/// A deployable bundle on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactBundle {
  pub path: PathBuf,
  /// File name the runtime executes inside the bundle.
  pub entrypoint: String,
}

/// Local packaging command.
///
/// Runs to completion before the function assembly declares anything, so a
/// failure here means no function nodes exist.
#[async_trait]
pub trait Packager: Send + Sync {
  async fn package(
    &self,
    source_dir: &Path,
    platform: &Platform,
  ) -> Result<ArtifactBundle, PackageError>;
}

/// Runs a configured command and checks that it produced the bundle.
#[derive(Debug, Clone)]
pub struct CommandPackager {
  workdir: PathBuf,
  command: Vec<String>,
  asset: PathBuf,
}

impl CommandPackager {
  pub fn new(workdir: impl Into<PathBuf>, command: Vec<String>, asset: impl Into<PathBuf>) -> Self {
    Self {
      workdir: workdir.into(),
      command,
      asset: asset.into(),
    }
  }

  pub fn from_config(config: &PackageConfig) -> Self {
    Self::new(&config.workdir, config.command.clone(), &config.asset)
  }
}

fn substitute(arg: &str, source_dir: &Path, platform: &Platform) -> String {
  arg
    .replace("{source}", &source_dir.to_string_lossy())
    .replace("{os}", &platform.os)
    .replace("{arch}", &platform.arch)
}

#[async_trait]
impl Packager for CommandPackager {
  async fn package(
    &self,
    source_dir: &Path,
    platform: &Platform,
  ) -> Result<ArtifactBundle, PackageError> {
    let (program, args) = self.command.split_first().ok_or(PackageError::EmptyCommand)?;
    let args: Vec<String> = args
      .iter()
      .map(|arg| substitute(arg, source_dir, platform))
      .collect();

    info!(
      program = %program,
      source = %source_dir.display(),
      platform = %platform,
      "package_started"
    );

    let output = Command::new(program)
      .args(&args)
      .current_dir(&self.workdir)
      .output()
      .await
      .map_err(|source| PackageError::Spawn {
        program: program.clone(),
        source,
      })?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
      warn!(status = ?output.status.code(), stderr = %stderr, "package_failed");
      return Err(PackageError::CommandFailed {
        status: output.status.code(),
        stderr,
      });
    }

    let path = self.workdir.join(&self.asset);
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
      return Err(PackageError::MissingAsset { path });
    }

    let entrypoint = self
      .asset
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_default();

    info!(bundle = %path.display(), "package_completed");
    Ok(ArtifactBundle { path, entrypoint })
  }
}

/// A bundle that already exists, for prebuilt artifacts.
#[derive(Debug, Clone)]
pub struct StaticPackager {
  bundle: ArtifactBundle,
}

impl StaticPackager {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    let path = path.into();
    let entrypoint = path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_default();
    Self {
      bundle: ArtifactBundle { path, entrypoint },
    }
  }
}

#[async_trait]
impl Packager for StaticPackager {
  async fn package(
    &self,
    _source_dir: &Path,
    _platform: &Platform,
  ) -> Result<ArtifactBundle, PackageError> {
    if !tokio::fs::try_exists(&self.bundle.path).await.unwrap_or(false) {
      return Err(PackageError::MissingAsset {
        path: self.bundle.path.clone(),
      });
    }
    Ok(self.bundle.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
  }

  #[test]
  fn test_substitutes_placeholders() {
    let arg = substitute(
      "GOOS={os} GOARCH={arch} go build {source}",
      Path::new("./cmd/app"),
      &Platform::linux_arm64(),
    );
    assert_eq!(arg, "GOOS=linux GOARCH=arm64 go build ./cmd/app");
  }

  #[tokio::test]
  async fn test_command_produces_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let packager = CommandPackager::new(
      dir.path(),
      sh("mkdir -p asset && echo {os}-{arch} > asset/bootstrap"),
      "asset/bootstrap",
    );

    let bundle = packager
      .package(Path::new("./cmd/app"), &Platform::linux_arm64())
      .await
      .unwrap();

    assert_eq!(bundle.entrypoint, "bootstrap");
    assert_eq!(bundle.path, dir.path().join("asset/bootstrap"));
    let content = std::fs::read_to_string(&bundle.path).unwrap();
    assert_eq!(content.trim(), "linux-arm64");
  }

  #[tokio::test]
  async fn test_failing_command_reports_status() {
    let dir = tempfile::tempdir().unwrap();
    let packager = CommandPackager::new(dir.path(), sh("echo broken >&2; exit 3"), "asset/bootstrap");

    let err = packager
      .package(Path::new("."), &Platform::linux_arm64())
      .await
      .unwrap_err();

    match err {
      PackageError::CommandFailed { status, stderr } => {
        assert_eq!(status, Some(3));
        assert_eq!(stderr, "broken");
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[tokio::test]
  async fn test_missing_asset_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let packager = CommandPackager::new(dir.path(), sh("true"), "asset/bootstrap");

    let err = packager
      .package(Path::new("."), &Platform::linux_arm64())
      .await
      .unwrap_err();
    assert!(matches!(err, PackageError::MissingAsset { .. }));
  }

  #[tokio::test]
  async fn test_empty_command() {
    let packager = CommandPackager::new(".", Vec::new(), "asset/bootstrap");
    let err = packager
      .package(Path::new("."), &Platform::linux_arm64())
      .await
      .unwrap_err();
    assert!(matches!(err, PackageError::EmptyCommand));
  }

  #[tokio::test]
  async fn test_static_packager_requires_existing_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bootstrap");
    std::fs::write(&path, b"#!/bin/sh\n").unwrap();

    let bundle = StaticPackager::new(&path)
      .package(Path::new("."), &Platform::linux_arm64())
      .await
      .unwrap();
    assert_eq!(bundle.entrypoint, "bootstrap");

    let missing = StaticPackager::new(dir.path().join("absent"))
      .package(Path::new("."), &Platform::linux_arm64())
      .await;
    assert!(matches!(missing, Err(PackageError::MissingAsset { .. })));
  }
}
