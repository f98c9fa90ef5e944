use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::GraphError;
use crate::node::ResourceNode;

/// Dependency structure for traversal and analysis.
///
/// Edges point from a node to the nodes that read its outputs.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Node names in declaration order.
  order: Vec<String>,
  /// Adjacency list: node -> nodes that depend on it.
  adjacency: HashMap<String, Vec<String>>,
  /// Reverse adjacency: node -> nodes it depends on.
  reverse_adjacency: HashMap<String, Vec<String>>,
  /// Nodes with no dependencies.
  entry_points: Vec<String>,
  /// References to names that were never declared, as (node, missing).
  dangling: Vec<(String, String)>,
}

impl Graph {
  /// Build a graph from declared nodes. Edges come from input references.
  pub fn new<'a>(nodes: impl IntoIterator<Item = &'a ResourceNode>) -> Self {
    let nodes: Vec<&ResourceNode> = nodes.into_iter().collect();
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut reverse_adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut dangling = Vec::new();

    // Initialize all nodes
    for node in &nodes {
      adjacency.entry(node.name().to_string()).or_default();
      reverse_adjacency.entry(node.name().to_string()).or_default();
    }

    for node in &nodes {
      for dependency in node.dependencies() {
        if !adjacency.contains_key(&dependency) {
          dangling.push((node.name().to_string(), dependency));
          continue;
        }
        adjacency
          .entry(dependency.clone())
          .or_default()
          .push(node.name().to_string());
        reverse_adjacency
          .entry(node.name().to_string())
          .or_default()
          .push(dependency);
      }
    }

    let order: Vec<String> = nodes.iter().map(|n| n.name().to_string()).collect();

    let entry_points = order
      .iter()
      .filter(|name| reverse_adjacency.get(*name).is_none_or(|v| v.is_empty()))
      .cloned()
      .collect();

    Self {
      order,
      adjacency,
      reverse_adjacency,
      entry_points,
      dangling,
    }
  }

  /// Node names in declaration order.
  pub fn nodes(&self) -> &[String] {
    &self.order
  }

  /// Get entry points (nodes with no dependencies).
  pub fn entry_points(&self) -> &[String] {
    &self.entry_points
  }

  /// Get nodes that read outputs of the given node.
  pub fn downstream(&self, name: &str) -> &[String] {
    self
      .adjacency
      .get(name)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Get nodes the given node reads outputs from.
  pub fn upstream(&self, name: &str) -> &[String] {
    self
      .reverse_adjacency
      .get(name)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// References to nodes that were never declared.
  pub fn dangling(&self) -> &[(String, String)] {
    &self.dangling
  }

  /// Every node that transitively depends on the given node.
  pub fn dependents(&self, name: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut queue: VecDeque<&str> = self.downstream(name).iter().map(String::as_str).collect();
    let mut result = Vec::new();

    while let Some(next) = queue.pop_front() {
      if !seen.insert(next) {
        continue;
      }
      result.push(next.to_string());
      queue.extend(self.downstream(next).iter().map(String::as_str));
    }

    result
  }

  /// Find a dependency cycle, if any, as the list of nodes along it.
  pub fn detect_cycle(&self) -> Option<Vec<String>> {
    // DFS with coloring: 0 = unvisited, 1 = in progress, 2 = done
    let mut color: HashMap<&str, u8> = self.order.iter().map(|n| (n.as_str(), 0u8)).collect();
    let mut stack: Vec<&str> = Vec::new();

    fn dfs<'a>(
      node: &'a str,
      graph: &'a Graph,
      color: &mut HashMap<&'a str, u8>,
      stack: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
      color.insert(node, 1);
      stack.push(node);

      for neighbor in graph.downstream(node) {
        match color.get(neighbor.as_str()) {
          Some(1) => {
            // Back edge: the cycle is the stack from the neighbor onwards
            let start = stack.iter().position(|n| *n == neighbor.as_str())?;
            let mut path: Vec<String> = stack[start..].iter().map(|n| n.to_string()).collect();
            path.push(neighbor.clone());
            return Some(path);
          }
          Some(0) => {
            if let Some(path) = dfs(neighbor, graph, color, stack) {
              return Some(path);
            }
          }
          _ => {}
        }
      }

      stack.pop();
      color.insert(node, 2);
      None
    }

    for name in &self.order {
      if color.get(name.as_str()) == Some(&0)
        && let Some(path) = dfs(name, self, &mut color, &mut stack)
      {
        return Some(path);
      }
    }

    None
  }

  /// An order in which every node comes after everything it depends on.
  ///
  /// Ties keep declaration order.
  pub fn topological_order(&self) -> Result<Vec<String>, GraphError> {
    let mut remaining: HashMap<&str, usize> = self
      .order
      .iter()
      .map(|n| (n.as_str(), self.upstream(n).len()))
      .collect();
    let mut ready: VecDeque<&str> = self
      .order
      .iter()
      .filter(|n| remaining.get(n.as_str()) == Some(&0))
      .map(String::as_str)
      .collect();
    let mut sorted = Vec::with_capacity(self.order.len());

    while let Some(next) = ready.pop_front() {
      sorted.push(next.to_string());
      for dependent in self.downstream(next) {
        if let Some(count) = remaining.get_mut(dependent.as_str()) {
          *count -= 1;
          if *count == 0 {
            ready.push_back(dependent);
          }
        }
      }
    }

    if sorted.len() != self.order.len() {
      return Err(GraphError::CycleDetected {
        path: self.detect_cycle().unwrap_or_default(),
      });
    }

    Ok(sorted)
  }
}
