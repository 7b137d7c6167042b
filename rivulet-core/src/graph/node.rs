//! Graph Nodes
//!
//! Identity and dirty-state primitives shared by sources and computations.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Unique identifier for a node in the dependency graph.
///
/// Sources and computations draw from the same counter, so an id is unique
/// across both kinds. A computation's output source reuses the computation's
/// id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Dirty state of a computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ComputationState {
    /// The cached value is not trusted; the next read recomputes.
    Dirty,

    /// An evaluation is running. An invalidation arriving now moves the
    /// node back to `Dirty`, and the running evaluation will not mark it clean.
    Evaluating,

    /// The cached value is up-to-date.
    Clean,
}

const DIRTY: u8 = 0;
const EVALUATING: u8 = 1;
const CLEAN: u8 = 2;

/// Lock-free state cell for a computation.
///
/// Propagation flips nodes to dirty through this cell without touching the
/// node's evaluation lock, so a long-running evaluation never blocks an
/// unrelated mutation.
#[derive(Debug)]
pub(crate) struct NodeState(AtomicU8);

impl NodeState {
    /// New nodes start dirty so the first read computes.
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(DIRTY))
    }

    pub(crate) fn get(&self) -> ComputationState {
        match self.0.load(Ordering::Acquire) {
            CLEAN => ComputationState::Clean,
            EVALUATING => ComputationState::Evaluating,
            _ => ComputationState::Dirty,
        }
    }

    pub(crate) fn is_clean(&self) -> bool {
        self.0.load(Ordering::Acquire) == CLEAN
    }

    pub(crate) fn begin_evaluation(&self) {
        self.0.store(EVALUATING, Ordering::Release);
    }

    /// Mark clean if nothing invalidated the node since `begin_evaluation`.
    ///
    /// Returns `false` when the node was dirtied mid-evaluation.
    pub(crate) fn finish_evaluation(&self) -> bool {
        self.0
            .compare_exchange(EVALUATING, CLEAN, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Roll back a failed evaluation.
    pub(crate) fn abort_evaluation(&self) {
        let _ = self
            .0
            .compare_exchange(EVALUATING, DIRTY, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Flip to dirty. Returns `true` only for the caller that performed the
    /// transition, which is what makes notification fire at most once.
    pub(crate) fn invalidate(&self) -> bool {
        self.0.swap(DIRTY, Ordering::AcqRel) != DIRTY
    }
}
