//! Rivulet Core
//!
//! This crate provides the core runtime for Rivulet, an automatic
//! dependency-tracking reactive graph. It implements:
//!
//! - Sources: observable mutable state, reported through explicit
//!   `record_read` / `changed` calls
//! - Computations: cached derived values whose dependencies are discovered
//!   while they run
//! - Invalidation propagation with once-per-pass notification
//! - A collection adapter for reactive lists
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Sources, computations, subscriptions, and propagation
//! - `graph`: Node identity, dirty state, and edge bookkeeping
//! - `collection`: Lists whose shape is a source
//! - `error`: The crate error type
//!
//! There is no global registry. Callers own their computations; sources
//! refer to computations only weakly, and the tracking stack is per thread.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! use rivulet_core::collection::ObservableVec;
//! use rivulet_core::reactive::Computation;
//!
//! let list = ObservableVec::from(vec![1, 2]);
//! let second = Computation::new({
//!     let list = list.clone();
//!     move || list.get(1)
//! });
//! assert_eq!(second.evaluate().unwrap(), Some(2));
//!
//! let notified = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&notified);
//! let _subscription = second.subscribe(move |_| {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! list.insert(0, 0);
//! assert_eq!(notified.load(Ordering::SeqCst), 1);
//! assert_eq!(second.evaluate().unwrap(), Some(1));
//! ```

pub mod collection;
pub mod error;
pub mod graph;
pub mod reactive;

pub use error::{ReactiveError, Result};
