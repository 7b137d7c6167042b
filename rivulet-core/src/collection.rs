//! Observable Collections
//!
//! [`ObservableVec`] adapts a growable list into the reactive graph.
//!
//! # Structure Source
//!
//! Every list owns one *structure* source standing for its shape:
//! membership, order, and length.
//!
//! - Reads of the length, of any index, or of the whole contents record a
//!   read of the structure source.
//! - Every insert, removal, replacement, or reordering marks it changed.
//!
//! Individual indices are not tracked. Any structural change invalidates
//! every computation that read the list, whichever index it used. Changes
//! *inside* an element are the element's own business: an element that is
//! itself reactive (say, a struct of [`Property`](crate::reactive::Property)
//! fields) reports them through its own sources.
//!
//! Swapping one list for another is a change of whatever holds the list,
//! typically a `Property<ObservableVec<T>>`.

use std::fmt::{self, Debug};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::graph::NodeId;
use crate::reactive::Source;

struct VecInner<T> {
    structure: Source,
    items: RwLock<Vec<T>>,
}

/// A reactive list.
///
/// Cloning yields another handle to the same list; two handles are equal
/// when they refer to the same list.
pub struct ObservableVec<T>
where
    T: Send + Sync + 'static,
{
    inner: Arc<VecInner<T>>,
}

impl<T> ObservableVec<T>
where
    T: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Self::build(Source::named(name), Vec::new())
    }

    pub fn from_vec(items: Vec<T>) -> Self {
        Self::build(Source::new(), items)
    }

    fn build(structure: Source, items: Vec<T>) -> Self {
        Self {
            inner: Arc::new(VecInner {
                structure,
                items: RwLock::new(items),
            }),
        }
    }

    /// Identity of this list (the id of its structure source).
    pub fn id(&self) -> NodeId {
        self.inner.structure.id()
    }

    /// The structure source of this list.
    pub fn structure(&self) -> &Source {
        &self.inner.structure
    }

    // ------------------------------------------------------------------
    // Reads: each records a read of the structure source
    // ------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.read(<[T]>::len)
    }

    pub fn is_empty(&self) -> bool {
        self.read(<[T]>::is_empty)
    }

    /// Borrow the contents.
    ///
    /// # Deadlocks
    ///
    /// The list stays read-locked while `f` runs. Reading the same list
    /// again from `f` is fine; writing to it deadlocks.
    pub fn read<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        self.inner.structure.record_read();
        f(self.inner.items.read_recursive().as_slice())
    }

    // ------------------------------------------------------------------
    // Structural writes: each marks the structure source changed
    // ------------------------------------------------------------------

    pub fn push(&self, item: T) {
        self.inner.items.write().push(item);
        self.inner.structure.changed();
    }

    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert(&self, index: usize, item: T) {
        self.inner.items.write().insert(index, item);
        self.inner.structure.changed();
    }

    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn remove(&self, index: usize) -> T {
        let item = self.inner.items.write().remove(index);
        self.inner.structure.changed();
        item
    }

    pub fn pop(&self) -> Option<T> {
        let item = self.inner.items.write().pop();
        if item.is_some() {
            self.inner.structure.changed();
        }
        item
    }

    /// Replace the element at `index`, returning the old one.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn set(&self, index: usize, item: T) -> T {
        let old = std::mem::replace(&mut self.inner.items.write()[index], item);
        self.inner.structure.changed();
        old
    }

    /// # Panics
    ///
    /// Panics if either index is out of bounds.
    pub fn swap(&self, a: usize, b: usize) {
        self.inner.items.write().swap(a, b);
        self.inner.structure.changed();
    }

    /// Move the element at `from` so it ends up at `to`.
    ///
    /// # Panics
    ///
    /// Panics if either index is out of bounds. The list is left untouched.
    pub fn move_item(&self, from: usize, to: usize) {
        {
            let mut items = self.inner.items.write();
            let len = items.len();
            assert!(
                from < len && to < len,
                "move_item out of bounds: from {from}, to {to}, len {len}"
            );
            if from < to {
                items[from..=to].rotate_left(1);
            } else {
                items[to..=from].rotate_right(1);
            }
        }
        self.inner.structure.changed();
    }

    pub fn retain(&self, f: impl FnMut(&T) -> bool) {
        let changed = {
            let mut items = self.inner.items.write();
            let before = items.len();
            items.retain(f);
            items.len() != before
        };
        if changed {
            self.inner.structure.changed();
        }
    }

    pub fn clear(&self) {
        let changed = {
            let mut items = self.inner.items.write();
            let non_empty = !items.is_empty();
            items.clear();
            non_empty
        };
        if changed {
            self.inner.structure.changed();
        }
    }

    pub fn extend(&self, iter: impl IntoIterator<Item = T>) {
        let changed = {
            let mut items = self.inner.items.write();
            let before = items.len();
            items.extend(iter);
            items.len() != before
        };
        if changed {
            self.inner.structure.changed();
        }
    }
}

impl<T> ObservableVec<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Clone the element at `index`, recording a read of the structure.
    pub fn get(&self, index: usize) -> Option<T> {
        self.read(|items| items.get(index).cloned())
    }

    /// Clone the whole contents, recording a read of the structure.
    pub fn to_vec(&self) -> Vec<T> {
        self.read(<[T]>::to_vec)
    }
}

impl<T> Clone for ObservableVec<T>
where
    T: Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for ObservableVec<T>
where
    T: Send + Sync + 'static,
{
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Default for ObservableVec<T>
where
    T: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> From<Vec<T>> for ObservableVec<T>
where
    T: Send + Sync + 'static,
{
    fn from(items: Vec<T>) -> Self {
        Self::from_vec(items)
    }
}

impl<T> Debug for ObservableVec<T>
where
    T: Debug + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableVec")
            .field("structure", &self.inner.structure.id())
            .field("items", &*self.inner.items.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    use crate::reactive::Computation;

    fn watch_len(list: &ObservableVec<i32>) -> (Computation<usize>, Arc<AtomicI32>) {
        let list_clone = list.clone();
        let computation = Computation::new(move || list_clone.len());
        computation.evaluate().unwrap();

        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = Arc::clone(&calls);
        computation
            .subscribe(move |_| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            })
            .detach();
        (computation, calls)
    }

    #[test]
    fn reads_return_contents() {
        let list = ObservableVec::from(vec![1, 2, 3]);
        assert_eq!(list.len(), 3);
        assert!(!list.is_empty());
        assert_eq!(list.get(1), Some(2));
        assert_eq!(list.get(9), None);
        assert_eq!(list.to_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn structural_writes_mutate_in_place() {
        let list = ObservableVec::new();
        list.push(1);
        list.push(2);
        list.insert(0, 0);
        assert_eq!(list.to_vec(), vec![0, 1, 2]);

        assert_eq!(list.set(1, 10), 1);
        list.swap(0, 2);
        assert_eq!(list.to_vec(), vec![2, 10, 0]);

        list.move_item(0, 2);
        assert_eq!(list.to_vec(), vec![10, 0, 2]);

        assert_eq!(list.remove(1), 0);
        assert_eq!(list.pop(), Some(2));
        list.extend([4, 5]);
        list.retain(|v| *v != 4);
        assert_eq!(list.to_vec(), vec![10, 5]);

        list.clear();
        assert!(list.is_empty());
    }

    #[test]
    fn every_structural_write_notifies() {
        let list = ObservableVec::from(vec![1, 2, 3]);
        let (computation, calls) = watch_len(&list);

        let writes: Vec<Box<dyn Fn(&ObservableVec<i32>)>> = vec![
            Box::new(|l: &ObservableVec<i32>| l.push(4)),
            Box::new(|l: &ObservableVec<i32>| l.insert(0, 0)),
            Box::new(|l: &ObservableVec<i32>| {
                l.remove(0);
            }),
            Box::new(|l: &ObservableVec<i32>| {
                l.set(0, 9);
            }),
            Box::new(|l: &ObservableVec<i32>| l.swap(0, 1)),
            Box::new(|l: &ObservableVec<i32>| l.move_item(0, 2)),
            Box::new(|l: &ObservableVec<i32>| {
                l.pop();
            }),
            Box::new(|l: &ObservableVec<i32>| l.retain(|v| *v != 9)),
            Box::new(|l: &ObservableVec<i32>| l.extend([7])),
            Box::new(|l: &ObservableVec<i32>| l.clear()),
        ];

        for (expected, write) in writes.iter().enumerate() {
            write(&list);
            assert_eq!(calls.load(Ordering::SeqCst), expected as i32 + 1);
            computation.evaluate().unwrap();
        }
    }

    #[test]
    fn no_op_writes_do_not_notify() {
        let list: ObservableVec<i32> = ObservableVec::new();
        let (_computation, calls) = watch_len(&list);

        assert_eq!(list.pop(), None);
        list.clear();
        list.retain(|_| true);
        list.extend(Vec::new());

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn move_item_out_of_bounds_leaves_list_untouched() {
        let list = ObservableVec::from(vec![1, 2, 3]);
        let (computation, calls) = watch_len(&list);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| list.move_item(0, 5)));
        assert!(result.is_err());
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| list.move_item(7, 0)));
        assert!(result.is_err());

        assert_eq!(list.to_vec(), vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(computation.evaluate().unwrap(), 3);
    }

    #[test]
    fn move_item_shifts_the_elements_between() {
        let list = ObservableVec::from(vec![0, 1, 2, 3, 4]);
        list.move_item(1, 3);
        assert_eq!(list.to_vec(), vec![0, 2, 3, 1, 4]);
        list.move_item(4, 0);
        assert_eq!(list.to_vec(), vec![4, 0, 2, 3, 1]);
        list.move_item(2, 2);
        assert_eq!(list.to_vec(), vec![4, 0, 2, 3, 1]);
    }

    #[test]
    fn nested_reads_of_the_same_list() {
        let list = ObservableVec::from(vec![1, 2]);
        let total = list.read(|items| items.len() + list.len());
        assert_eq!(total, 4);
    }

    #[test]
    fn clones_are_the_same_list() {
        let list = ObservableVec::from(vec![1]);
        let other = list.clone();
        other.push(2);

        assert_eq!(list, other);
        assert_eq!(list.id(), other.id());
        assert_eq!(list.to_vec(), vec![1, 2]);
        assert_ne!(list, ObservableVec::from(vec![1, 2]));
    }
}
