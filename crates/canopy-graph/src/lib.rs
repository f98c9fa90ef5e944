//! Canopy Graph
//!
//! This crate provides the declaration side of a canopy run: typed resource
//! nodes, the deferred values that thread not-yet-known attributes between
//! them, and the explicit graph those references induce.
//!
//! Key pieces:
//! - [`Deferred`] is a handle to a value that is resolved exactly once, with
//!   [`Deferred::resolve`] and [`Deferred::combine`] registering continuations
//! - [`ResourceNode`] is a construction request whose inputs are literals or
//!   deferred values
//! - [`ResourceGraph`] is the arena nodes are submitted to; submission hands
//!   back a [`ResourceHandle`] carrying the node's own deferred outputs
//! - [`Graph`] is the adjacency view used for validation and scheduling

mod arena;
mod deferred;
mod error;
mod graph;
mod node;

pub use arena::{DeclaredNode, ResourceGraph};
pub use deferred::{Deferred, OutputRef, Resolver, Unresolved};
pub use error::GraphError;
pub use graph::Graph;
pub use node::{
  Attributes, DeclaredInput, Declaration, Input, ResourceHandle, ResourceKind, ResourceNode,
};
