//! Reactive Primitives
//!
//! This module implements the reactive core: sources, computations, and the
//! propagation that connects them.
//!
//! # Concepts
//!
//! ## Sources
//!
//! A Source stands for one piece of observable mutable state. Whatever owns
//! the state reports reads with [`Source::record_read`] and writes with
//! [`Source::changed`]. [`Property`] is the ready-made owner for a single
//! value; [`ObservableVec`](crate::collection::ObservableVec) is the one for
//! a list.
//!
//! ## Computations
//!
//! A Computation wraps a function, caches its result, and remembers which
//! sources the last run read. When one of them changes, the computation is
//! marked dirty and its subscribers are notified; it recomputes on the next
//! read.
//!
//! ## Effects
//!
//! An Effect hands a computation's value to a side-effecting function, now
//! and after every change.
//!
//! # Implementation Notes
//!
//! Dependencies are discovered, not declared. A thread-local stack records
//! which computation is running; a source read while a computation is on top
//! of the stack becomes one of its dependencies.

mod computation;
mod context;
mod effect;
mod property;
mod runtime;
mod source;
mod subscriber;

pub use computation::{Computation, ComputationInfo};
pub use context::EvaluationContext;
pub use effect::Effect;
pub use property::Property;
pub use runtime::Runtime;
pub use source::Source;
pub use subscriber::{Notification, Subscription, SubscriptionId};
