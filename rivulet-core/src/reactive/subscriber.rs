//! Subscriber types for the reactive system.
//!
//! A subscription binds one callback to one computation. The callback runs
//! on the mutating thread each time the computation is invalidated.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::warn;

use super::runtime::PanicPayload;
use crate::graph::NodeId;

/// Unique identifier for a subscription.
///
/// Uses an atomic counter to ensure uniqueness across threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Generate a new unique subscription ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Event delivered to subscribers when a computation is invalidated.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Notification {
    /// The invalidated computation.
    pub computation: NodeId,
    /// Debug name of the invalidated computation.
    pub name: Option<Arc<str>>,
    /// The node whose change started the propagation pass.
    pub origin: NodeId,
}

type Callback = Arc<dyn Fn(&Notification) + Send + Sync>;

/// Ordered callback registry owned by a computation.
#[derive(Default)]
pub(crate) struct Subscribers {
    entries: Mutex<IndexMap<SubscriptionId, Callback>>,
}

impl Subscribers {
    pub(crate) fn insert(&self, id: SubscriptionId, callback: Callback) {
        self.entries.lock().insert(id, callback);
    }

    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        self.entries.lock().shift_remove(&id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Invoke every callback registered at the moment of the call.
    ///
    /// The registry lock is released first, so callbacks may subscribe or
    /// unsubscribe freely.
    pub(crate) fn notify(&self, notification: &Notification) -> Option<PanicPayload> {
        let callbacks: Vec<Callback> = self.entries.lock().values().cloned().collect();

        let mut first_panic = None;
        for callback in callbacks {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(notification))) {
                warn!(
                    computation = %notification.computation,
                    name = notification.name.as_deref(),
                    "subscriber callback panicked"
                );
                first_panic.get_or_insert(payload);
            }
        }
        first_panic
    }
}

/// Handle to a registered callback.
///
/// Dropping the handle unsubscribes the callback. Use [`Subscription::detach`]
/// to keep it registered for as long as the computation lives.
#[must_use = "dropping a Subscription unsubscribes its callback"]
pub struct Subscription {
    id: SubscriptionId,
    computation: NodeId,
    registry: Weak<Subscribers>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, computation: NodeId, registry: &Arc<Subscribers>) -> Self {
        Self {
            id,
            computation,
            registry: Arc::downgrade(registry),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The computation this subscription listens to.
    pub fn computation(&self) -> NodeId {
        self.computation
    }

    /// Check whether the callback is still registered.
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .map(|registry| registry.entries.lock().contains_key(&self.id))
            .unwrap_or(false)
    }

    /// Remove the callback. No further notifications are delivered.
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Keep the callback registered without holding the handle.
    pub fn detach(mut self) {
        self.registry = Weak::new();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("computation", &self.computation)
            .field("active", &self.is_active())
            .finish()
    }
}
