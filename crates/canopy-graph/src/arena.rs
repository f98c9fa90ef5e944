//! The resource graph arena.
//!
//! Nodes are submitted here during declaration. Submission never provisions
//! anything: it records the node and hands back a [`ResourceHandle`] whose
//! outputs resolve once the scheduler completes the node.

use std::collections::HashMap;

use crate::deferred::{Deferred, Resolver};
use crate::error::GraphError;
use crate::graph::Graph;
use crate::node::{Attributes, Declaration, ResourceHandle, ResourceKind, ResourceNode};

/// A declared node paired with the resolver for its outputs.
#[derive(Debug)]
pub struct DeclaredNode {
  pub node: ResourceNode,
  pub resolver: Resolver<Attributes>,
}

#[derive(Debug)]
struct Slot {
  resolver: Option<Resolver<Attributes>>,
  outputs: Deferred<Attributes>,
  /// Kinds the node was referenced as before or after submission.
  referenced_as: Vec<ResourceKind>,
}

impl Slot {
  fn new() -> Self {
    let (resolver, outputs) = Deferred::pending_output();
    Self {
      resolver: Some(resolver),
      outputs,
      referenced_as: Vec::new(),
    }
  }
}

/// Arena of submitted resource nodes, indexed by name.
#[derive(Debug, Default)]
pub struct ResourceGraph {
  nodes: Vec<ResourceNode>,
  slots: HashMap<String, Slot>,
}

impl ResourceGraph {
  pub fn new() -> Self {
    Self::default()
  }

  /// Submit a node and get a handle to its deferred outputs.
  pub fn submit(&mut self, node: ResourceNode) -> Result<ResourceHandle, GraphError> {
    if self.get(node.name()).is_some() {
      return Err(GraphError::DuplicateNode {
        name: node.name().to_string(),
      });
    }

    let slot = self
      .slots
      .entry(node.name().to_string())
      .or_insert_with(Slot::new);
    if let Some(&expected) = slot.referenced_as.iter().find(|k| **k != node.kind()) {
      return Err(GraphError::KindMismatch {
        name: node.name().to_string(),
        expected,
        found: node.kind(),
      });
    }
    let handle = ResourceHandle::new(node.kind(), node.name().to_string(), slot.outputs.clone());
    self.nodes.push(node);
    Ok(handle)
  }

  /// Handle to a node that may not have been submitted yet.
  ///
  /// The reference must be satisfied by a later [`ResourceGraph::submit`] or
  /// validation fails with [`GraphError::MissingDependency`]. The submitted
  /// node must be of the referenced `kind`.
  pub fn reference(&mut self, name: &str, kind: ResourceKind) -> ResourceHandle {
    let slot = self.slots.entry(name.to_string()).or_insert_with(Slot::new);
    if !slot.referenced_as.contains(&kind) {
      slot.referenced_as.push(kind);
    }
    ResourceHandle::new(kind, name.to_string(), slot.outputs.clone())
  }

  pub fn get(&self, name: &str) -> Option<&ResourceNode> {
    self.nodes.iter().find(|n| n.name() == name)
  }

  /// Submitted nodes in submission order.
  pub fn nodes(&self) -> &[ResourceNode] {
    &self.nodes
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Build the adjacency view.
  pub fn graph(&self) -> Graph {
    Graph::new(&self.nodes)
  }

  /// Snapshot of every declaration, in submission order.
  pub fn declarations(&self) -> Vec<Declaration> {
    self.nodes.iter().map(ResourceNode::declaration).collect()
  }

  /// Check the graph can run: required inputs present and bound, references
  /// of the right kind and declared, no cycles.
  pub fn validate(&self) -> Result<(), GraphError> {
    for node in &self.nodes {
      if let Some(field) = node.missing_inputs().first() {
        return Err(GraphError::MissingInput {
          node: node.name().to_string(),
          field: field.to_string(),
        });
      }
      if let Some(field) = node.unbound_inputs().first() {
        return Err(GraphError::UnboundInput {
          node: node.name().to_string(),
          field: field.to_string(),
        });
      }
      let referenced_as = self
        .slots
        .get(node.name())
        .map(|slot| slot.referenced_as.as_slice())
        .unwrap_or_default();
      if let Some(&expected) = referenced_as.iter().find(|k| **k != node.kind()) {
        return Err(GraphError::KindMismatch {
          name: node.name().to_string(),
          expected,
          found: node.kind(),
        });
      }
    }

    let graph = self.graph();
    if let Some((node, missing)) = graph.dangling().first() {
      return Err(GraphError::MissingDependency {
        node: node.clone(),
        missing: missing.clone(),
      });
    }

    if let Some(path) = graph.detect_cycle() {
      return Err(GraphError::CycleDetected { path });
    }

    Ok(())
  }

  /// Validate and split into nodes paired with their output resolvers.
  pub fn into_declared(mut self) -> Result<Vec<DeclaredNode>, GraphError> {
    self.validate()?;

    let mut declared = Vec::with_capacity(self.nodes.len());
    for node in std::mem::take(&mut self.nodes) {
      let resolver = self
        .slots
        .get_mut(node.name())
        .and_then(|slot| slot.resolver.take())
        .ok_or_else(|| GraphError::NodeNotFound {
          name: node.name().to_string(),
        })?;
      declared.push(DeclaredNode { node, resolver });
    }
    Ok(declared)
  }
}
