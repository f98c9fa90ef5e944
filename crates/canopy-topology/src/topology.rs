//! Declaring and deploying the whole application.

use canopy_artifact::Packager;
use canopy_config::{RouteKey, TopologyConfig};
use canopy_graph::{Declaration, Deferred, ResourceGraph};
use canopy_runtime::{ExecutionNotifier, RunReport, Runtime};
use serde::Serialize;
use tracing::{info, instrument};

use crate::container::ContainerService;
use crate::error::TopologyError;
use crate::export::{ExportSink, Exports};
use crate::front_door::FrontDoor;
use crate::function::Function;
use crate::image::ContainerImage;
use crate::network::Network;
use crate::wiring::{ComputeVariant, WiringRecord};

/// The fully declared graph, before anything is dispatched.
pub struct Declared {
  pub graph: ResourceGraph,
  pub exports: ExportSink,
  pub wiring: Vec<WiringRecord>,
}

/// What a deployment would create, in dispatch order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
  pub declarations: Vec<Declaration>,
  pub order: Vec<String>,
  pub routes: Vec<String>,
}

/// A route as it exists after a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredRoute {
  pub route_key: String,
  pub variant: ComputeVariant,
  pub route_node: String,
  pub target: String,
  pub integration_uri: String,
  /// Source pattern of the invocation permission, for function routes.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub permission_source: Option<String>,
}

#[derive(Debug)]
pub struct Deployment {
  pub report: RunReport,
  pub exports: Exports,
  pub routes: Vec<RegisteredRoute>,
}

/// One network, one front door, one function and one container service.
pub struct Topology {
  config: TopologyConfig,
}

impl Topology {
  pub fn new(config: TopologyConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &TopologyConfig {
    &self.config
  }

  /// Declare every assembly into a fresh graph.
  ///
  /// Assemblies are declared in dependency order so each one receives the
  /// handles it reads from. The function bundle is packaged along the way.
  pub async fn declare(&self, packager: &dyn Packager) -> Result<Declared, TopologyError> {
    let config = &self.config;
    let mut graph = ResourceGraph::new();
    let mut exports = ExportSink::open();

    let network = Network::declare(&mut graph, &config.network)?;
    let image = ContainerImage::declare(&mut graph, &config.container.image)?;
    let mut front_door = FrontDoor::declare(&mut graph, &config.front_door, &network, &mut exports)?;

    Function::declare(&mut graph, &config.function, packager, &mut front_door).await?;
    ContainerService::declare(
      &mut graph,
      &config.container,
      &config.region,
      &network,
      &image,
      &mut front_door,
    )?;

    let wiring = front_door.into_wiring();
    info!(
      project = %config.project,
      nodes = graph.len(),
      routes = wiring.len(),
      exports = exports.len(),
      "topology_declared"
    );

    Ok(Declared {
      graph,
      exports,
      wiring,
    })
  }

  /// Declare the graph and check it, without dispatching anything.
  pub async fn plan(&self, packager: &dyn Packager) -> Result<Plan, TopologyError> {
    let declared = self.declare(packager).await?;
    declared.graph.validate()?;

    Ok(Plan {
      declarations: declared.graph.declarations(),
      order: declared.graph.graph().topological_order()?,
      routes: declared
        .wiring
        .iter()
        .map(|w| w.route_key.to_string())
        .collect(),
    })
  }

  /// Declare, provision, and collect the exports and registered routes.
  #[instrument(name = "topology_deploy", skip_all, fields(project = %self.config.project))]
  pub async fn deploy<N: ExecutionNotifier>(
    &self,
    runtime: &Runtime<N>,
    packager: &dyn Packager,
  ) -> Result<Deployment, TopologyError> {
    let Declared {
      graph,
      exports,
      wiring,
    } = self.declare(packager).await?;

    let report = runtime.run(graph).await?;
    let exports = exports.seal().await?;

    let mut routes = Vec::with_capacity(wiring.len());
    for record in &wiring {
      routes.push(registered_route(record).await?);
    }

    info!(routes = routes.len(), exports = exports.len(), "topology_deployed");

    Ok(Deployment {
      report,
      exports,
      routes,
    })
  }
}

async fn registered_route(record: &WiringRecord) -> Result<RegisteredRoute, TopologyError> {
  let route = &record.route_key;
  let permission_source = match &record.grant {
    Some(grant) => Some(resolved(route, &grant.source_arn).await?),
    None => None,
  };

  Ok(RegisteredRoute {
    route_key: route.to_string(),
    variant: record.variant,
    route_node: record.route_node.clone(),
    target: resolved(route, &record.target).await?,
    integration_uri: resolved(route, &record.integration_uri).await?,
    permission_source,
  })
}

async fn resolved(route: &RouteKey, value: &Deferred<String>) -> Result<String, TopologyError> {
  value.value().await.map_err(|reason| TopologyError::Route {
    route: route.to_string(),
    reason,
  })
}
