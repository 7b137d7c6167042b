//! Error types for the reactive runtime.

use thiserror::Error;

use crate::graph::NodeId;

/// Boxed error produced by a user computation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, ReactiveError>;

#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A computation re-entered its own evaluation on the same thread,
    /// directly or through a chain of other computations.
    #[error("dependency cycle detected while evaluating `{name}`")]
    DependencyCycle { name: String },

    /// The evaluation context stack was popped out of order. This is an
    /// internal invariant violation and is raised as a panic.
    #[error("evaluation context exited out of order: expected {expected}, found {found:?}")]
    UnbalancedContextExit {
        expected: NodeId,
        found: Option<NodeId>,
    },

    /// A fallible computation reported a failure.
    #[error(transparent)]
    Computation(#[from] BoxError),
}

impl ReactiveError {
    /// Wrap an arbitrary error raised inside a computation.
    pub fn computation(err: impl Into<BoxError>) -> Self {
        Self::Computation(err.into())
    }

    /// Returns `true` for [`ReactiveError::DependencyCycle`].
    pub fn is_cycle(&self) -> bool {
        matches!(self, Self::DependencyCycle { .. })
    }
}
