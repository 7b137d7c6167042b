//! Reactive Runtime
//!
//! The runtime connects sources to the computations that read them. It has
//! no state of its own: the dependency graph lives on the sources and
//! computations, and the evaluation stack is thread-local.
//!
//! # How It Works
//!
//! 1. While a computation evaluates, every source read is attributed to it
//!    through [`Runtime::record_read`].
//!
//! 2. When a source changes, [`Runtime::source_changed`] runs one
//!    propagation pass:
//!    a. Snapshot the live computations depending on the source
//!    b. Flip each to dirty; nodes already dirty are skipped
//!    c. Follow each newly dirtied node's output source to the computations
//!       that read it, and repeat
//!    d. Notify the subscribers of every newly dirtied node, once
//!
//! 3. Computations stay lazy: nothing is recomputed until it is read.
//!
//! # Thread Safety
//!
//! A pass only takes the per-source dependents locks, each briefly, and never
//! holds a lock while calling into user code. Passes over disjoint object
//! graphs share no lock, so a subscriber blocked on one graph cannot stall
//! a mutation on another.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug_span, trace};

use super::context::EvaluationContext;
use super::source::Source;
use crate::graph::NodeId;

/// Payload of a panic caught while running a subscriber callback.
pub(crate) type PanicPayload = Box<dyn Any + Send + 'static>;

/// A node that can be invalidated by a propagation pass.
///
/// Implemented by computations. Sources hold dependents as
/// `Weak<dyn Dependent>`.
pub(crate) trait Dependent: Send + Sync {
    /// Get the node ID for this dependent.
    fn node_id(&self) -> NodeId;

    /// Mark the node dirty. Returns `true` only if this call performed the
    /// transition; a node that was already dirty returns `false`.
    fn invalidate(&self) -> bool;

    /// The source other computations read when they evaluate this node.
    fn output(&self) -> &Source;

    /// Run every subscriber callback once.
    ///
    /// A panicking callback does not stop the others; the first panic is
    /// returned to the caller.
    fn notify(&self, origin: NodeId) -> Option<PanicPayload>;
}

/// The reactive runtime.
///
/// A namespace for the operations that collaborators (properties,
/// collections, interception layers) call into.
pub struct Runtime;

impl Runtime {
    /// Attribute a read of `source` to the computation evaluating on this
    /// thread. No-op outside an evaluation.
    pub fn record_read(source: &Source) {
        EvaluationContext::record_read(source);
    }

    /// Notify all computations that depend on `source`, directly or
    /// transitively, that it changed.
    ///
    /// Returns once every callback reached by this pass has returned.
    ///
    /// # Panics
    ///
    /// If a subscriber callback panics, the remaining callbacks still run and
    /// the first panic is then resumed on this thread.
    pub fn source_changed(source: &Source) {
        let span = debug_span!("propagate", source = %source.id(), name = source.name());
        let _enter = span.enter();

        Self::propagate(source.id(), source.live_dependents());
    }

    /// Run one pass starting at an explicit set of roots.
    pub(crate) fn propagate<I>(origin: NodeId, roots: I)
    where
        I: IntoIterator<Item = Arc<dyn Dependent>>,
    {
        let mut queue: VecDeque<Arc<dyn Dependent>> = roots.into_iter().collect();
        let mut invalidated: Vec<Arc<dyn Dependent>> = Vec::new();

        // Dirty the whole reachable set first, so callbacks never observe a
        // downstream node that is still clean.
        while let Some(node) = queue.pop_front() {
            if !node.invalidate() {
                continue;
            }
            trace!(node = %node.node_id(), "marked dirty");
            queue.extend(node.output().live_dependents());
            invalidated.push(node);
        }

        trace!(origin = %origin, count = invalidated.len(), "invalidated computations");

        // Callbacks may run inside some computation's function (the mutation
        // happened there); their reads must not be charged to it.
        let mut first_panic = None;
        {
            let _quiet = EvaluationContext::enter_untracked();
            for node in &invalidated {
                if let Some(payload) = node.notify(origin) {
                    first_panic.get_or_insert(payload);
                }
            }
        }
        drop(invalidated);

        if let Some(payload) = first_panic {
            std::panic::resume_unwind(payload);
        }
    }

    /// The innermost computation evaluating on this thread, if any.
    pub fn current_computation() -> Option<NodeId> {
        EvaluationContext::current_computation()
    }

    /// Check if we're inside an evaluation.
    pub fn is_tracking() -> bool {
        EvaluationContext::current_computation().is_some()
    }

    /// Run `f` without attributing any of its reads to the running
    /// computation.
    pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
        let _quiet = EvaluationContext::enter_untracked();
        f()
    }
}
