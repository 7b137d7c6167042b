//! Source Implementation
//!
//! A Source is one unit of observable mutable state: a property slot, a
//! collection's structure, or a computation's output. It holds no value
//! itself. Whatever owns the state calls [`Source::record_read`] when the
//! state is read and [`Source::changed`] after it is written.
//!
//! # Dependents
//!
//! A source keeps the computations that read it as weak references keyed by
//! node id. Dead entries are pruned whenever the dependents are snapshotted,
//! so a dropped computation never lingers here for long, and it never stays
//! alive because of a source.
//!
//! The dependents map is insertion-ordered, which makes the notification
//! order of a single-threaded mutation deterministic.

use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use smallvec::SmallVec;

use super::runtime::{Dependent, Runtime};
use crate::graph::NodeId;

/// A live snapshot of a source's dependents.
pub(crate) type DependentSnapshot = SmallVec<[Arc<dyn Dependent>; 4]>;

struct SourceInner {
    id: NodeId,
    name: Option<Arc<str>>,
    dependents: Mutex<IndexMap<NodeId, Weak<dyn Dependent>>>,
}

/// Handle to a node of observable state.
///
/// Cloning a `Source` yields another handle to the same node.
#[derive(Clone)]
pub struct Source {
    inner: Arc<SourceInner>,
}

impl Source {
    /// Create a new anonymous source.
    pub fn new() -> Self {
        Self::build(NodeId::new(), None)
    }

    /// Create a new source with a debug name.
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Self::build(NodeId::new(), Some(name.into()))
    }

    /// The output source of a computation shares the computation's id.
    pub(crate) fn with_id(id: NodeId, name: Option<Arc<str>>) -> Self {
        Self::build(id, name)
    }

    fn build(id: NodeId, name: Option<Arc<str>>) -> Self {
        Self {
            inner: Arc::new(SourceInner {
                id,
                name,
                dependents: Mutex::new(IndexMap::new()),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Attribute a read of this source to the computation currently
    /// evaluating on this thread. No-op outside an evaluation.
    pub fn record_read(&self) {
        Runtime::record_read(self);
    }

    /// Report that the state behind this source changed.
    ///
    /// Runs invalidation propagation synchronously and returns after every
    /// subscriber callback reached by this pass has returned.
    pub fn changed(&self) {
        Runtime::source_changed(self);
    }

    /// Number of live computations currently depending on this source.
    pub fn dependent_count(&self) -> usize {
        let mut dependents = self.inner.dependents.lock();
        dependents.retain(|_, weak| weak.strong_count() > 0);
        dependents.len()
    }

    pub(crate) fn add_dependent(&self, id: NodeId, dependent: Weak<dyn Dependent>) {
        self.inner.dependents.lock().entry(id).or_insert(dependent);
    }

    pub(crate) fn remove_dependent(&self, id: NodeId) {
        self.inner.dependents.lock().shift_remove(&id);
    }

    /// Upgrade every live dependent, pruning the dead ones.
    ///
    /// The lock is released before the snapshot is returned, so callers can
    /// run arbitrary code against the dependents.
    pub(crate) fn live_dependents(&self) -> DependentSnapshot {
        let mut live = DependentSnapshot::new();
        let mut dependents = self.inner.dependents.lock();
        dependents.retain(|_, weak| match weak.upgrade() {
            Some(dependent) => {
                live.push(dependent);
                true
            }
            None => false,
        });
        drop(dependents);
        live
    }
}

impl Default for Source {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Source {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Source {}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("dependent_count", &self.inner.dependents.lock().len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
