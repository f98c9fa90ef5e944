//! Deferred values.
//!
//! A [`Deferred`] is a handle to a value that does not exist yet at
//! declaration time, typically an attribute a provisioning call assigns. It
//! is resolved exactly once through its paired [`Resolver`], and readers
//! never block: [`Deferred::resolve`] and [`Deferred::combine`] register
//! continuations that run once their inputs are available.
//!
//! Every deferred value remembers which node outputs it was derived from
//! ([`Deferred::refs`]). That set is what turns data references into graph
//! edges. A value no node produces (one made with [`Deferred::pending`]
//! outside the arena) is tracked as an external source instead, so the graph
//! can refuse to run while such a value is still unresolved.

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::channel::oneshot;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// One output attribute of a resource node, e.g. `vpc.vpc_id`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutputRef {
  pub node: String,
  pub attribute: String,
}

impl OutputRef {
  pub fn new(node: impl Into<String>, attribute: impl Into<String>) -> Self {
    Self {
      node: node.into(),
      attribute: attribute.into(),
    }
  }
}

impl fmt::Display for OutputRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}", self.node, self.attribute)
  }
}

/// Why a deferred value did not resolve to a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Unresolved {
  /// The owning node failed, or was skipped because something it depends on
  /// failed. `node` is the node that failed directly.
  #[error("upstream node '{node}' failed")]
  Upstream { node: String },

  /// The owning node succeeded but did not publish the attribute.
  #[error("node '{node}' did not publish output '{attribute}'")]
  MissingOutput { node: String, attribute: String },

  /// A continuation rejected the value it was given.
  #[error("{message}")]
  Rejected { message: String },

  /// The resolver was dropped without resolving.
  #[error("deferred value was abandoned before it resolved")]
  Abandoned,
}

impl Unresolved {
  pub fn rejected(message: impl Into<String>) -> Self {
    Self::Rejected {
      message: message.into(),
    }
  }

  /// The node that failed directly, when the failure came from upstream.
  pub fn origin(&self) -> Option<&str> {
    match self {
      Self::Upstream { node } => Some(node),
      _ => None,
    }
  }
}

type SharedResult<T> = Shared<BoxFuture<'static, Result<T, Unresolved>>>;

/// Completes once an external source has resolved, either way.
type Settled = Shared<BoxFuture<'static, ()>>;

/// An eventually-resolved value.
///
/// Cloning a `Deferred` clones the handle, not the value: every clone observes
/// the same single resolution.
pub struct Deferred<T> {
  refs: Arc<BTreeSet<OutputRef>>,
  external: Arc<Vec<Settled>>,
  value: SharedResult<T>,
}

impl<T> Clone for Deferred<T> {
  fn clone(&self) -> Self {
    Self {
      refs: self.refs.clone(),
      external: self.external.clone(),
      value: self.value.clone(),
    }
  }
}

impl<T> Deferred<T>
where
  T: Clone + Send + Sync + 'static,
{
  /// A value that is already known.
  pub fn ready(value: T) -> Self {
    Self::from_future(BTreeSet::new(), future::ready(Ok(value)))
  }

  /// A value that will never resolve.
  pub fn failed(reason: Unresolved) -> Self {
    Self::from_future(BTreeSet::new(), future::ready(Err(reason)))
  }

  /// A value resolved later through the returned [`Resolver`].
  ///
  /// No node produces it, so it counts as an external source: a graph
  /// reading it only runs once it has resolved.
  pub fn pending() -> (Resolver<T>, Self) {
    let (resolver, mut deferred) = Self::pending_output();
    let settled = deferred.value.clone().map(|_| ()).boxed().shared();
    deferred.external = Arc::new(vec![settled]);
    (resolver, deferred)
  }

  /// A pending value owned by a node slot in the arena.
  pub(crate) fn pending_output() -> (Resolver<T>, Self) {
    let (sender, receiver) = oneshot::channel();
    let deferred = Self::from_future(
      BTreeSet::new(),
      receiver.map(|received| received.unwrap_or(Err(Unresolved::Abandoned))),
    );
    (Resolver { sender }, deferred)
  }

  fn from_future<F>(refs: BTreeSet<OutputRef>, future: F) -> Self
  where
    F: Future<Output = Result<T, Unresolved>> + Send + 'static,
  {
    Self {
      refs: Arc::new(refs),
      external: Arc::new(Vec::new()),
      value: future.boxed().shared(),
    }
  }

  fn with_external(mut self, external: Vec<Settled>) -> Self {
    self.external = Arc::new(external);
    self
  }

  pub(crate) fn with_refs(mut self, refs: BTreeSet<OutputRef>) -> Self {
    self.refs = Arc::new(refs);
    self
  }

  /// Node outputs this value is derived from.
  pub fn refs(&self) -> &BTreeSet<OutputRef> {
    &self.refs
  }

  /// Names of the nodes this value is derived from.
  pub fn sources(&self) -> BTreeSet<&str> {
    self.refs.iter().map(|r| r.node.as_str()).collect()
  }

  /// Whether this value still waits on an external source no node produces.
  pub fn awaits_external(&self) -> bool {
    self
      .external
      .iter()
      .any(|settled| settled.clone().now_or_never().is_none())
  }

  /// Register a transformation that runs once this value is available.
  pub fn resolve<U, F>(&self, f: F) -> Deferred<U>
  where
    U: Clone + Send + Sync + 'static,
    F: FnOnce(T) -> U + Send + 'static,
  {
    let source = self.value.clone();
    Deferred::from_future((*self.refs).clone(), async move { source.await.map(f) })
      .with_external((*self.external).clone())
  }

  /// Like [`Deferred::resolve`], but the transformation may reject the value.
  pub fn try_resolve<U, F>(&self, f: F) -> Deferred<U>
  where
    U: Clone + Send + Sync + 'static,
    F: FnOnce(T) -> Result<U, Unresolved> + Send + 'static,
  {
    let source = self.value.clone();
    Deferred::from_future((*self.refs).clone(), async move { source.await.and_then(f) })
      .with_external((*self.external).clone())
  }

  /// Register a transformation that runs once both inputs are available.
  ///
  /// If either input fails, the result fails with the same reason and `f` is
  /// never called.
  pub fn combine<A, B, F>(a: &Deferred<A>, b: &Deferred<B>, f: F) -> Self
  where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
    F: FnOnce(A, B) -> T + Send + 'static,
  {
    let refs = a.refs.union(&b.refs).cloned().collect();
    let external = a.external.iter().chain(b.external.iter()).cloned().collect();
    let (left, right) = (a.value.clone(), b.value.clone());
    Self::from_future(refs, async move {
      future::try_join(left, right)
        .await
        .map(|(left, right)| f(left, right))
    })
    .with_external(external)
  }

  /// Wait for the value, without blocking the thread.
  pub async fn value(&self) -> Result<T, Unresolved> {
    self.value.clone().await
  }

  /// The resolution, if some reader has already driven it to completion.
  pub fn peek(&self) -> Option<Result<T, Unresolved>> {
    self.value.peek().cloned()
  }
}

impl<T> Deferred<Vec<T>>
where
  T: Clone + Send + Sync + 'static,
{
  /// Collect several deferred values, preserving order.
  pub fn all(values: impl IntoIterator<Item = Deferred<T>>) -> Self {
    let values: Vec<_> = values.into_iter().collect();
    let refs = values
      .iter()
      .flat_map(|v| v.refs.iter().cloned())
      .collect();
    let external = values
      .iter()
      .flat_map(|v| v.external.iter().cloned())
      .collect();
    let futures: Vec<_> = values.into_iter().map(|v| v.value).collect();
    Self::from_future(refs, future::try_join_all(futures)).with_external(external)
  }
}

impl<T> Deferred<T>
where
  T: Serialize + Clone + Send + Sync + 'static,
{
  /// Erase the static type, keeping the references.
  pub fn erase(&self) -> Deferred<serde_json::Value> {
    self.try_resolve(|value| {
      serde_json::to_value(value)
        .map_err(|e| Unresolved::rejected(format!("unserializable value: {e}")))
    })
  }
}

impl Deferred<serde_json::Value> {
  /// Decode into a concrete type once resolved.
  pub fn decode<U>(&self) -> Deferred<U>
  where
    U: DeserializeOwned + Clone + Send + Sync + 'static,
  {
    self.try_resolve(|value| {
      serde_json::from_value(value)
        .map_err(|e| Unresolved::rejected(format!("unexpected value shape: {e}")))
    })
  }
}

impl<T: Clone> fmt::Debug for Deferred<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Deferred")
      .field("refs", &self.refs)
      .field("resolved", &self.value.peek().is_some())
      .finish()
  }
}

/// The write side of a pending [`Deferred`].
///
/// Consumed on use, so a value is resolved at most once.
#[derive(Debug)]
pub struct Resolver<T> {
  sender: oneshot::Sender<Result<T, Unresolved>>,
}

impl<T> Resolver<T> {
  pub fn resolve(self, value: T) {
    // Receiver side may be gone if nobody kept a handle
    let _ = self.sender.send(Ok(value));
  }

  pub fn fail(self, reason: Unresolved) {
    let _ = self.sender.send(Err(reason));
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicBool, Ordering};

  use super::*;

  #[tokio::test]
  async fn test_ready_value() {
    let value = Deferred::ready(42u32);
    assert_eq!(value.value().await, Ok(42));
    assert!(value.refs().is_empty());
  }

  #[tokio::test]
  async fn test_continuation_registered_before_resolution() {
    let (resolver, id) = Deferred::<String>::pending();
    let target = id.resolve(|id| format!("integrations/{id}"));

    assert!(target.peek().is_none());

    resolver.resolve("abc123".to_string());
    assert_eq!(target.value().await, Ok("integrations/abc123".to_string()));
    assert_eq!(id.value().await, Ok("abc123".to_string()));
  }

  #[tokio::test]
  async fn test_external_source_is_tracked_through_transformations() {
    let (resolver, cidr) = Deferred::<String>::pending();
    let block = Deferred::combine(&cidr, &Deferred::ready(16u8), |cidr, bits| {
      format!("{cidr}/{bits}")
    });

    assert!(cidr.awaits_external());
    assert!(block.awaits_external());
    assert!(block.erase().awaits_external());
    assert!(!Deferred::ready(1u8).awaits_external());

    resolver.resolve("10.0.0.0".to_string());
    assert!(!block.awaits_external());
    assert_eq!(block.value().await, Ok("10.0.0.0/16".to_string()));
  }

  #[test]
  fn test_abandoned_external_source_is_settled() {
    let (resolver, value) = Deferred::<u8>::pending();
    drop(resolver);
    assert!(!value.awaits_external());
  }

  #[tokio::test]
  async fn test_resolution_is_observed_identically_by_every_clone() {
    let (resolver, value) = Deferred::<u16>::pending();
    let copy = value.clone();
    resolver.resolve(3000);

    assert_eq!(value.value().await, Ok(3000));
    assert_eq!(copy.peek(), Some(Ok(3000)));
    assert_eq!(value.value().await, Ok(3000));
  }

  #[tokio::test]
  async fn test_combine_merges_refs_and_values() {
    let arn = Deferred::ready("arn:api".to_string())
      .with_refs(BTreeSet::from([OutputRef::new("api", "execution_arn")]));
    let stage = Deferred::ready("$default".to_string())
      .with_refs(BTreeSet::from([OutputRef::new("default-stage", "name")]));

    let pattern = Deferred::combine(&arn, &stage, |arn, stage| format!("{arn}/{stage}/GET/"));

    assert_eq!(pattern.sources(), BTreeSet::from(["api", "default-stage"]));
    assert_eq!(pattern.value().await, Ok("arn:api/$default/GET/".to_string()));
  }

  #[tokio::test]
  async fn test_failure_short_circuits_continuations() {
    let called = Arc::new(AtomicBool::new(false));
    let flag = called.clone();

    let (resolver, upstream) = Deferred::<String>::pending();
    let downstream = upstream.resolve(move |v| {
      flag.store(true, Ordering::SeqCst);
      v.len()
    });
    let joined = Deferred::combine(&downstream, &Deferred::ready(1usize), |a, b| a + b);

    resolver.fail(Unresolved::Upstream {
      node: "vpc".to_string(),
    });

    let err = joined.value().await.unwrap_err();
    assert_eq!(err.origin(), Some("vpc"));
    assert!(!called.load(Ordering::SeqCst));
  }

  #[tokio::test]
  async fn test_dropped_resolver_abandons_value() {
    let (resolver, value) = Deferred::<u8>::pending();
    drop(resolver);
    assert_eq!(value.value().await, Err(Unresolved::Abandoned));
  }

  #[tokio::test]
  async fn test_all_preserves_order() {
    let (first, a) = Deferred::<String>::pending();
    let (second, b) = Deferred::<String>::pending();
    let ids = Deferred::all(vec![a, b]);

    second.resolve("subnet-b".to_string());
    first.resolve("subnet-a".to_string());

    assert_eq!(
      ids.value().await,
      Ok(vec!["subnet-a".to_string(), "subnet-b".to_string()])
    );
  }

  #[tokio::test]
  async fn test_decode_rejects_wrong_shape() {
    let value = Deferred::ready(serde_json::json!({ "not": "a string" }));
    let decoded = value.decode::<String>();
    assert!(matches!(
      decoded.value().await,
      Err(Unresolved::Rejected { .. })
    ));
  }
}
