//! Edge Sets
//!
//! The computation-side half of the dependency graph. Each computation owns
//! an `EdgeSet` listing the sources it read during its last successful
//! evaluation. The source-side half (weak back-references) lives on
//! [`Source`](crate::reactive::Source).
//!
//! # Commit and Rollback
//!
//! Back-references are attached as soon as a read happens, so a mutation
//! that races with a running evaluation still reaches it. When the evaluation
//! finishes:
//!
//! - on success, `commit` replaces the edge set with the new reads and
//!   detaches every source that was not read again;
//! - on failure, `rollback` detaches the sources that were only read by the
//!   failed run, leaving the previous edge set intact.
//!
//! Both walk only this node's own edges and reads, never the whole graph.

use indexmap::IndexMap;

use super::NodeId;
use crate::reactive::Source;

/// Counts of edges changed by a commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct EdgeDiff {
    pub(crate) added: usize,
    pub(crate) removed: usize,
}

/// The sources a computation depends on.
#[derive(Debug, Default)]
pub(crate) struct EdgeSet {
    sources: IndexMap<NodeId, Source>,
}

impl EdgeSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.sources.len()
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.sources.contains_key(&id)
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.sources.keys().copied()
    }

    /// Replace the edge set with `reads`, detaching `owner` from every
    /// source that is no longer read.
    pub(crate) fn commit<I>(&mut self, owner: NodeId, reads: I) -> EdgeDiff
    where
        I: IntoIterator<Item = Source>,
    {
        let mut next = IndexMap::with_capacity(self.sources.len());
        let mut diff = EdgeDiff::default();

        for source in reads {
            if !self.sources.contains_key(&source.id()) && !next.contains_key(&source.id()) {
                diff.added += 1;
            }
            next.entry(source.id()).or_insert(source);
        }

        for (id, stale) in &self.sources {
            if !next.contains_key(id) {
                stale.remove_dependent(owner);
                diff.removed += 1;
            }
        }

        self.sources = next;
        diff
    }

    /// Undo the back-references a failed evaluation attached.
    pub(crate) fn rollback<'a, I>(&self, owner: NodeId, reads: I)
    where
        I: IntoIterator<Item = &'a Source>,
    {
        for source in reads {
            if !self.contains(source.id()) {
                source.remove_dependent(owner);
            }
        }
    }

    /// Detach `owner` from every source. Used when the computation is dropped.
    pub(crate) fn clear(&mut self, owner: NodeId) {
        for (_, source) in self.sources.drain(..) {
            source.remove_dependent(owner);
        }
    }
}
