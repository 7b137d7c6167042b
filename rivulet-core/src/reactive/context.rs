//! Evaluation Context
//!
//! The evaluation context tracks which computation is currently running on
//! this thread. This enables automatic dependency tracking: when a source is
//! read, the read is attributed to the innermost running computation.
//!
//! # Implementation
//!
//! We use a thread-local stack of frames. Evaluating a computation pushes a
//! frame; the frame collects the sources read while it is on top; the
//! computation pops it when its function returns. Two threads evaluating
//! concurrently never see each other's stack.
//!
//! Popping is tied to a scope guard ([`ContextGuard`]), so the stack stays
//! balanced on every exit path, including errors and panics.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Weak;

use smallvec::SmallVec;

use super::runtime::Dependent;
use super::Source;
use crate::error::ReactiveError;
use crate::graph::NodeId;

/// Sources read by one evaluation, in read order, possibly repeated.
pub(crate) type Reads = SmallVec<[Source; 4]>;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the context stack.
struct Frame {
    node: NodeId,
    /// `None` for untracked frames: reads under them are ignored.
    dependent: Option<Weak<dyn Dependent>>,
    reads: Reads,
}

/// Facade over this thread's evaluation stack.
pub struct EvaluationContext;

impl EvaluationContext {
    /// Push a frame for `node`. Reads are attributed to `dependent` until
    /// the returned guard exits.
    pub(crate) fn enter(node: NodeId, dependent: Weak<dyn Dependent>) -> ContextGuard {
        Self::push(node, Some(dependent))
    }

    /// Push a frame that swallows reads.
    pub(crate) fn enter_untracked() -> ContextGuard {
        Self::push(NodeId::new(), None)
    }

    fn push(node: NodeId, dependent: Option<Weak<dyn Dependent>>) -> ContextGuard {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(Frame {
                node,
                dependent,
                reads: Reads::new(),
            });
        });

        ContextGuard {
            node,
            exited: false,
            _not_send: PhantomData,
        }
    }

    /// Check if any computation is evaluating on this thread.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// The innermost computation evaluating on this thread, if any.
    pub fn current_computation() -> Option<NodeId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .iter()
                .rev()
                .find(|frame| frame.dependent.is_some())
                .map(|frame| frame.node)
        })
    }

    /// Check whether `node` is anywhere on this thread's stack.
    pub fn contains(node: NodeId) -> bool {
        CONTEXT_STACK.with(|stack| stack.borrow().iter().any(|frame| frame.node == node))
    }

    /// Number of frames on this thread's stack.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }

    /// Attribute a read of `source` to the top frame.
    ///
    /// The back-reference is attached to the source right away; the read is
    /// also kept in the frame so the owning computation can commit or roll
    /// it back once its function returns.
    pub(crate) fn record_read(source: &Source) {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let Some(frame) = stack.last_mut() else {
                return;
            };
            if let Some(dependent) = &frame.dependent {
                source.add_dependent(frame.node, dependent.clone());
                frame.reads.push(source.clone());
            }
        });
    }

    fn exit(node: NodeId) -> Result<Reads, ReactiveError> {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            match stack.last() {
                Some(frame) if frame.node == node => {
                    Ok(stack.pop().map(|frame| frame.reads).unwrap_or_default())
                }
                top => Err(ReactiveError::UnbalancedContextExit {
                    expected: node,
                    found: top.map(|frame| frame.node),
                }),
            }
        })
    }
}

/// Guard that pops its frame when exited or dropped.
///
/// The guard is `!Send`: the frame lives on the thread that pushed it.
pub struct ContextGuard {
    node: NodeId,
    exited: bool,
    _not_send: PhantomData<*const ()>,
}

impl ContextGuard {
    /// Pop the frame and hand back its reads.
    ///
    /// # Panics
    ///
    /// Panics with [`ReactiveError::UnbalancedContextExit`] if the frame is
    /// not on top of the stack.
    pub(crate) fn exit(&mut self) -> Reads {
        if self.exited {
            return Reads::new();
        }
        self.exited = true;
        match EvaluationContext::exit(self.node) {
            Ok(reads) => reads,
            Err(err) => panic!("{err}"),
        }
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if self.exited {
            return;
        }
        self.exited = true;
        if let Err(err) = EvaluationContext::exit(self.node) {
            // Never turn an unwind into an abort.
            if !std::thread::panicking() {
                panic!("{err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::reactive::Computation;

    fn weak_dependent() -> (Computation<i32>, Weak<dyn Dependent>) {
        let computation = Computation::new(|| 0);
        let weak = computation.downgrade();
        (computation, weak)
    }

    #[test]
    fn context_tracks_computation() {
        let (_owner, weak) = weak_dependent();
        let id = NodeId::new();

        assert!(!EvaluationContext::is_active());
        assert!(EvaluationContext::current_computation().is_none());

        {
            let _ctx = EvaluationContext::enter(id, weak);

            assert!(EvaluationContext::is_active());
            assert_eq!(EvaluationContext::current_computation(), Some(id));
            assert!(EvaluationContext::contains(id));
        }

        // Context should be cleaned up after drop
        assert!(!EvaluationContext::is_active());
        assert!(EvaluationContext::current_computation().is_none());
    }

    #[test]
    fn context_collects_reads_in_order() {
        let (_owner, weak) = weak_dependent();
        let a = Source::new();
        let b = Source::new();

        let mut ctx = EvaluationContext::enter(NodeId::new(), weak);
        a.record_read();
        b.record_read();
        a.record_read();

        let reads = ctx.exit();
        let ids: Vec<_> = reads.iter().map(Source::id).collect();
        assert_eq!(ids, vec![a.id(), b.id(), a.id()]);
        assert_eq!(a.dependent_count(), 1);
        assert_eq!(b.dependent_count(), 1);
    }

    #[test]
    fn nested_contexts() {
        let (_outer_owner, outer_weak) = weak_dependent();
        let (_inner_owner, inner_weak) = weak_dependent();
        let outer = NodeId::new();
        let inner = NodeId::new();

        {
            let _ctx1 = EvaluationContext::enter(outer, outer_weak);
            assert_eq!(EvaluationContext::current_computation(), Some(outer));

            {
                let _ctx2 = EvaluationContext::enter(inner, inner_weak);
                assert_eq!(EvaluationContext::current_computation(), Some(inner));
                assert!(EvaluationContext::contains(outer));
                assert_eq!(EvaluationContext::depth(), 2);
            }

            // After inner context drops, outer should be current
            assert_eq!(EvaluationContext::current_computation(), Some(outer));
        }

        assert!(EvaluationContext::current_computation().is_none());
    }

    #[test]
    fn untracked_frame_swallows_reads() {
        let (_owner, weak) = weak_dependent();
        let outer = NodeId::new();
        let source = Source::new();

        let mut ctx = EvaluationContext::enter(outer, weak);
        {
            let _quiet = EvaluationContext::enter_untracked();
            source.record_read();
            assert_eq!(EvaluationContext::current_computation(), Some(outer));
        }
        assert!(ctx.exit().is_empty());
        assert_eq!(source.dependent_count(), 0);
    }

    #[test]
    #[should_panic(expected = "exited out of order")]
    fn out_of_order_exit_panics() {
        let (_outer_owner, outer_weak) = weak_dependent();
        let (_inner_owner, inner_weak) = weak_dependent();

        let mut outer = EvaluationContext::enter(NodeId::new(), outer_weak);
        let _inner = EvaluationContext::enter(NodeId::new(), inner_weak);
        outer.exit();
    }

    #[test]
    fn stack_is_thread_local() {
        let (_owner, weak) = weak_dependent();
        let _ctx = EvaluationContext::enter(NodeId::new(), weak);

        let seen = Arc::new(parking_lot::Mutex::new(None));
        let seen_clone = Arc::clone(&seen);
        std::thread::spawn(move || {
            *seen_clone.lock() = Some(EvaluationContext::depth());
        })
        .join()
        .unwrap();

        assert_eq!(*seen.lock(), Some(0));
        assert_eq!(EvaluationContext::depth(), 1);
    }
}
