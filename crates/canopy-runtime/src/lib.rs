//! Canopy Runtime
//!
//! This crate runs a declared [`ResourceGraph`](canopy_graph::ResourceGraph).
//! The [`Runtime`] validates the graph, then dispatches every node whose
//! upstream nodes have all succeeded, concurrently, to a
//! [`Provisioner`](canopy_provision::Provisioner). A node whose upstream
//! failed is skipped without being dispatched, and the failure flows on to
//! its own dependents. Independent branches keep running.
//!
//! Progress is reported through `tracing` events and, optionally, an
//! [`ExecutionNotifier`].

mod error;
mod events;
mod report;
mod runtime;
mod scheduler;
mod state;

pub use error::{NodeError, RuntimeError};
pub use events::{ChannelNotifier, ExecutionNotifier, NoopNotifier, ProvisionEvent};
pub use report::{NodeOutcome, NodeStatus, RunReport};
pub use runtime::Runtime;
pub use state::{Failure, NodeState};
