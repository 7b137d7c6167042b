//! Property Implementation
//!
//! A Property is an instrumented value slot: the smallest collaborator that
//! turns reads and writes of a value into source events. Reading it inside a
//! computation records a dependency; writing it runs a propagation pass.
//!
//! # Thread Safety
//!
//! The value sits behind a `RwLock`. Writers release the lock before
//! propagating, so subscribers can read the new value from their callbacks.

use std::fmt::{self, Debug};
use std::sync::Arc;

use parking_lot::RwLock;

use super::source::Source;

struct PropertyInner<T> {
    source: Source,
    value: RwLock<T>,
}

/// A reactive value slot.
///
/// Cloning a `Property` yields another handle to the same slot.
///
/// # Example
///
/// ```rust
/// use rivulet_core::reactive::Property;
///
/// let woop = Property::named("woop", false);
/// woop.set(true);
/// assert!(woop.get());
/// ```
pub struct Property<T>
where
    T: Send + Sync + 'static,
{
    inner: Arc<PropertyInner<T>>,
}

impl<T> Property<T>
where
    T: Send + Sync + 'static,
{
    /// Create a new property with the given initial value.
    pub fn new(value: T) -> Self {
        Self::with_source(Source::new(), value)
    }

    /// Create a new property with a debug name.
    pub fn named(name: impl Into<Arc<str>>, value: T) -> Self {
        Self::with_source(Source::named(name), value)
    }

    fn with_source(source: Source, value: T) -> Self {
        Self {
            inner: Arc::new(PropertyInner {
                source,
                value: RwLock::new(value),
            }),
        }
    }

    /// The source backing this property.
    pub fn source(&self) -> &Source {
        &self.inner.source
    }

    /// Borrow the value, recording a read.
    ///
    /// # Deadlocks
    ///
    /// The value stays read-locked while `f` runs. Reading the property
    /// again from `f` is fine; `set`, `update` or `replace` on it deadlocks.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.source.record_read();
        f(&*self.inner.value.read_recursive())
    }

    /// Set a new value and notify dependents.
    ///
    /// Always propagates, even if the new value equals the old one.
    pub fn set(&self, value: T) {
        *self.inner.value.write() = value;
        self.inner.source.changed();
    }

    /// Update the value in place and notify dependents.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut T),
    {
        f(&mut *self.inner.value.write());
        self.inner.source.changed();
    }

    /// Replace the value, returning the old one.
    pub fn replace(&self, value: T) -> T {
        let old = std::mem::replace(&mut *self.inner.value.write(), value);
        self.inner.source.changed();
        old
    }
}

impl<T> Property<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Get the current value, recording a read.
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.value.read().clone()
    }
}

impl<T> Clone for Property<T>
where
    T: Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Property<T>
where
    T: Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Debug for Property<T>
where
    T: Debug + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("source", &self.inner.source.id())
            .field("value", &*self.inner.value.read())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
