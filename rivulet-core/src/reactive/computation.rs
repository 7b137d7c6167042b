//! Computation Implementation
//!
//! A Computation is a cached derived value whose dependencies are discovered
//! by recording the sources it reads while it runs.
//!
//! # How Computations Work
//!
//! 1. Nothing runs on creation. The first `evaluate()` runs the function,
//!    records every source it reads, and caches the result.
//!
//! 2. While clean, `evaluate()` returns the cached value without calling the
//!    function.
//!
//! 3. When any source read by the last evaluation changes, the computation is
//!    marked dirty and its subscribers are notified, once, whether or not
//!    the value would actually differ.
//!
//! 4. The next `evaluate()` recomputes and replaces the recorded sources, so
//!    sources that were not read again stop affecting it.
//!
//! # Chaining
//!
//! Each computation owns an output source. Evaluating it inside another
//! computation records a read of that output source, so invalidating the
//! inner computation also invalidates the outer one.
//!
//! # Thread Safety
//!
//! The cached value and edge set sit behind a per-computation lock held for
//! the whole evaluation, so at most one thread evaluates a given computation
//! at a time. The dirty flag is an atomic outside that lock: propagation can
//! dirty a computation while another thread is evaluating it, and that
//! evaluation will then not mark it clean.
//!
//! # Failures
//!
//! If the function fails or panics, the cached value and edge set are left
//! as they were and the computation stays dirty, so the next read retries.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::context::{ContextGuard, EvaluationContext, Reads};
use super::property::Property;
use super::runtime::{Dependent, PanicPayload, Runtime};
use super::source::Source;
use super::subscriber::{Notification, Subscribers, Subscription, SubscriptionId};
use crate::error::{ReactiveError, Result};
use crate::graph::{ComputationState, EdgeSet, NodeId, NodeState};

type ComputeFn<T> = Box<dyn Fn() -> Result<T> + Send + Sync>;

/// State guarded by the evaluation lock.
struct Cache<T> {
    value: Option<T>,
    edges: EdgeSet,
    evaluations: u64,
}

pub(crate) struct ComputationInner<T> {
    id: NodeId,
    name: Option<Arc<str>>,
    compute: ComputeFn<T>,
    state: NodeState,
    cache: Mutex<Cache<T>>,
    output: Source,
    subscribers: Arc<Subscribers>,
}

/// A cached, dependency-tracked wrapper around a function.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. Reads return clones, so cheap
///   `Clone` types (or `Arc`s) work best.
///
/// # Example
///
/// ```rust
/// use rivulet_core::reactive::{Computation, Property};
///
/// let count = Property::new(2);
/// let doubled = Computation::new({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// assert_eq!(doubled.evaluate().unwrap(), 4);
/// count.set(5);
/// assert_eq!(doubled.evaluate().unwrap(), 10);
/// ```
pub struct Computation<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<ComputationInner<T>>,
}

impl<T> Computation<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new computation. The function is not run until the first
    /// `evaluate()`.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::build(None, Box::new(move || Ok(compute())))
    }

    /// Create a new computation with a debug name.
    pub fn named<F>(name: impl Into<Arc<str>>, compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::build(Some(name.into()), Box::new(move || Ok(compute())))
    }

    /// Create a computation whose function can fail.
    ///
    /// Errors are returned from `evaluate()` and are never cached.
    pub fn try_new<F>(compute: F) -> Self
    where
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        Self::build(None, Box::new(compute))
    }

    /// Create a named computation whose function can fail.
    pub fn try_named<F>(name: impl Into<Arc<str>>, compute: F) -> Self
    where
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        Self::build(Some(name.into()), Box::new(compute))
    }

    /// A computation that reads a single property. It is named after the
    /// property when the property has a name.
    pub fn from_property(property: &Property<T>) -> Self {
        let name = property.source().name().map(Arc::<str>::from);
        let property = property.clone();
        Self::build(name, Box::new(move || Ok(property.get())))
    }

    fn build(name: Option<Arc<str>>, compute: ComputeFn<T>) -> Self {
        let id = NodeId::new();
        Self {
            inner: Arc::new(ComputationInner {
                id,
                output: Source::with_id(id, name.clone()),
                name,
                compute,
                state: NodeState::new(),
                cache: Mutex::new(Cache {
                    value: None,
                    edges: EdgeSet::new(),
                    evaluations: 0,
                }),
                subscribers: Arc::new(Subscribers::default()),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// When called inside another computation's evaluation, the outer
    /// computation becomes a dependent of this one.
    ///
    /// # Errors
    ///
    /// - [`ReactiveError::DependencyCycle`] if this computation is already
    ///   being evaluated on this thread.
    /// - Whatever a fallible function returned.
    pub fn evaluate(&self) -> Result<T> {
        let inner = &self.inner;

        if EvaluationContext::contains(inner.id) {
            let name = inner.display_name();
            debug!(node = %inner.id, name = %name, "dependency cycle");
            return Err(ReactiveError::DependencyCycle { name });
        }

        Runtime::record_read(&inner.output);

        let mut cache = inner.cache.lock();
        if inner.state.is_clean() {
            if let Some(value) = cache.value.as_ref() {
                return Ok(value.clone());
            }
        }

        debug!(node = %inner.id, name = inner.name.as_deref(), "recomputing");
        inner.state.begin_evaluation();

        let scope = EvaluationScope {
            context: EvaluationContext::enter(inner.id, self.downgrade()),
            node: inner.id,
            state: &inner.state,
            previous: &cache.edges,
            completed: false,
        };
        let value = (inner.compute)()?;
        let reads = scope.complete();

        let diff = cache.edges.commit(inner.id, reads);
        trace!(node = %inner.id, added = diff.added, removed = diff.removed, "edges committed");

        cache.value = Some(value.clone());
        cache.evaluations += 1;
        if !inner.state.finish_evaluation() {
            debug!(node = %inner.id, "invalidated while evaluating, staying dirty");
        }

        Ok(value)
    }

    /// Register a callback invoked on each future invalidation.
    ///
    /// Subscribing does not evaluate. A computation that was never evaluated
    /// has no dependencies yet, so it cannot be invalidated by a source.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        self.inner.subscribers.insert(id, Arc::new(callback));
        Subscription::new(id, self.inner.id, &self.inner.subscribers)
    }

    /// Mark this computation dirty and run a propagation pass from it,
    /// notifying its subscribers and every computation that reads it.
    pub fn invalidate(&self) {
        let root: Arc<dyn Dependent> = self.inner.clone();
        Runtime::propagate(self.inner.id, [root]);
    }

    /// Get the current dirty state.
    pub fn state(&self) -> ComputationState {
        self.inner.state.get()
    }

    pub fn is_dirty(&self) -> bool {
        !self.inner.state.is_clean()
    }

    /// Check if the computation has a cached value (possibly stale).
    pub fn has_value(&self) -> bool {
        self.inner.cache.lock().value.is_some()
    }

    /// Number of sources read by the last successful evaluation.
    pub fn dependency_count(&self) -> usize {
        self.inner.cache.lock().edges.len()
    }

    /// Ids of the sources read by the last successful evaluation.
    pub fn dependencies(&self) -> Vec<NodeId> {
        self.inner.cache.lock().edges.ids().collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Number of times the function completed successfully.
    pub fn evaluation_count(&self) -> u64 {
        self.inner.cache.lock().evaluations
    }

    /// Snapshot of this computation for diagnostics.
    pub fn info(&self) -> ComputationInfo {
        let cache = self.inner.cache.lock();
        ComputationInfo {
            id: self.inner.id,
            name: self.inner.name.as_deref().map(str::to_owned),
            state: self.inner.state.get(),
            has_value: cache.value.is_some(),
            dependencies: cache.edges.len(),
            dependents: self.inner.output.dependent_count(),
            subscribers: self.inner.subscribers.len(),
            evaluations: cache.evaluations,
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<dyn Dependent> {
        let weak: Weak<ComputationInner<T>> = Arc::downgrade(&self.inner);
        weak
    }

    pub(crate) fn from_weak(weak: &Weak<ComputationInner<T>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub(crate) fn weak_inner(&self) -> Weak<ComputationInner<T>> {
        Arc::downgrade(&self.inner)
    }
}

impl<T> ComputationInner<T> {
    fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.to_string(),
            None => format!("computation{}", self.id),
        }
    }
}

impl<T> Dependent for ComputationInner<T>
where
    T: Send + Sync + 'static,
{
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn invalidate(&self) -> bool {
        self.state.invalidate()
    }

    fn output(&self) -> &Source {
        &self.output
    }

    fn notify(&self, origin: NodeId) -> Option<PanicPayload> {
        let notification = Notification {
            computation: self.id,
            name: self.name.clone(),
            origin,
        };
        self.subscribers.notify(&notification)
    }
}

impl<T> Drop for ComputationInner<T> {
    fn drop(&mut self) {
        self.cache.get_mut().edges.clear(self.id);
    }
}

/// Ties one evaluation's context frame to its rollback.
///
/// Dropped without `complete()` (the function returned an error or
/// panicked), it pops the frame, detaches the sources only this run read,
/// and returns the node to dirty.
struct EvaluationScope<'a> {
    context: ContextGuard,
    node: NodeId,
    state: &'a NodeState,
    previous: &'a EdgeSet,
    completed: bool,
}

impl EvaluationScope<'_> {
    fn complete(mut self) -> Reads {
        self.completed = true;
        self.context.exit()
    }
}

impl Drop for EvaluationScope<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        let reads = self.context.exit();
        self.previous.rollback(self.node, reads.iter());
        self.state.abort_evaluation();
        debug!(node = %self.node, "evaluation failed, staying dirty");
    }
}

impl<T> Clone for Computation<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Computation<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computation")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Diagnostics snapshot returned by [`Computation::info`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ComputationInfo {
    pub id: NodeId,
    pub name: Option<String>,
    pub state: ComputationState,
    pub has_value: bool,
    /// Sources read by the last successful evaluation.
    pub dependencies: usize,
    /// Live computations that read this one.
    pub dependents: usize,
    pub subscribers: usize,
    pub evaluations: u64,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
