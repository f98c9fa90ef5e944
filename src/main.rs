use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use canopy_artifact::{CommandPackager, Packager, SimulatedBuilder, StaticPackager};
use canopy_config::TopologyConfig;
use canopy_provision::SimulatedProvisioner;
use canopy_runtime::Runtime;
use canopy_topology::{Topology, TopologyBackend};

/// Canopy - declare and provision a small serverless application topology
#[derive(Parser)]
#[command(name = "canopy")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the topology configuration (JSON). Defaults are used without it.
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Provision the topology against the simulated backend
  Up {
    /// Use a prebuilt function bundle instead of running the package command
    #[arg(long)]
    bundle: Option<PathBuf>,

    /// Make the named node fail when it is dispatched (repeatable)
    #[arg(long = "fail-node")]
    fail_nodes: Vec<String>,
  },

  /// Print the declared graph and dispatch order without provisioning
  Plan {
    #[arg(long)]
    bundle: Option<PathBuf>,
  },

  /// Print the content hash of a file or directory
  Hash { path: PathBuf },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  match cli.command {
    Some(Commands::Up { bundle, fail_nodes }) => {
      let config = load_config(cli.config)?;
      block_on(up(config, bundle, fail_nodes))?;
    }
    Some(Commands::Plan { bundle }) => {
      let config = load_config(cli.config)?;
      block_on(plan(config, bundle))?;
    }
    Some(Commands::Hash { path }) => {
      let digest = if path.is_dir() {
        canopy_artifact::hash_directory(&path)
      } else {
        canopy_artifact::hash_file(&path)
      }
      .with_context(|| format!("failed to hash {}", path.display()))?;
      println!("{digest}");
    }
    None => {
      println!("canopy - use --help to see available commands");
    }
  }

  Ok(())
}

fn block_on<F: Future<Output = Result<()>>>(future: F) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(future)
}

fn load_config(path: Option<PathBuf>) -> Result<TopologyConfig> {
  match path {
    Some(path) => TopologyConfig::from_path(&path)
      .with_context(|| format!("failed to load config: {}", path.display())),
    None => Ok(TopologyConfig::default()),
  }
}

fn packager(config: &TopologyConfig, bundle: Option<PathBuf>) -> Box<dyn Packager> {
  match bundle {
    Some(path) => Box::new(StaticPackager::new(path)),
    None => Box::new(CommandPackager::from_config(&config.function.package)),
  }
}

async fn up(config: TopologyConfig, bundle: Option<PathBuf>, fail_nodes: Vec<String>) -> Result<()> {
  let provisioner = SimulatedProvisioner::new(config.region.clone())
    .with_concurrency(config.backend.max_concurrency)
    .with_latency(Duration::from_millis(config.backend.latency_ms));
  for node in fail_nodes {
    provisioner.fail_on(node, "injected failure");
  }

  let backend = TopologyBackend::new(Arc::new(provisioner), Arc::new(SimulatedBuilder::new()));
  let runtime = Runtime::new(Arc::new(backend));
  let packager = packager(&config, bundle);
  let topology = Topology::new(config);

  match topology.deploy(&runtime, packager.as_ref()).await {
    Ok(deployment) => {
      eprintln!(
        "Run {} completed: {} nodes",
        deployment.report.run_id,
        deployment.report.outcomes.len()
      );
      let output = json!({
        "exports": deployment.exports,
        "routes": deployment.routes,
      });
      println!("{}", serde_json::to_string_pretty(&output)?);
      Ok(())
    }
    Err(e) => {
      if let Some(report) = e.report() {
        println!("{}", serde_json::to_string_pretty(report)?);
      }
      Err(e).context("deployment failed")
    }
  }
}

async fn plan(config: TopologyConfig, bundle: Option<PathBuf>) -> Result<()> {
  let packager = packager(&config, bundle);
  let plan = Topology::new(config)
    .plan(packager.as_ref())
    .await
    .context("failed to plan topology")?;

  eprintln!("Planned {} nodes", plan.order.len());
  println!("{}", serde_json::to_string_pretty(&plan)?);

  Ok(())
}
