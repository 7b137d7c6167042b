//! Dependency Graph
//!
//! This module implements the bookkeeping for the bipartite graph between
//! sources (mutable state) and computations (cached derived values).
//!
//! # Overview
//!
//! - An edge `source -> computation` means the computation read the source
//!   during its most recent evaluation.
//! - The graph is not stored centrally. Each computation owns the strong,
//!   forward half of its edges (`EdgeSet`); each source owns the weak,
//!   reverse half (its dependents). Neither side needs a global lock, so
//!   disjoint object graphs never contend.
//! - Edges are rebuilt on every evaluation. Sources that were not read again
//!   are detached, so a computation stops reacting to state it no longer uses.
//!
//! # Design Decisions
//!
//! 1. Sources hold computations weakly. A dependency edge never keeps a
//!    computation alive.
//!
//! 2. Dirty state is an atomic cell separate from the evaluation lock, so
//!    propagation can dirty a node that is being evaluated on another thread.

mod edges;
mod node;

pub(crate) use edges::EdgeSet;
pub use node::{ComputationState, NodeId};
pub(crate) use node::NodeState;
