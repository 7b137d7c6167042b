//! Effect Implementation
//!
//! An Effect delivers a computation's value to a side-effecting function now
//! and again after every invalidation.
//!
//! # How Effects Work
//!
//! 1. When created, the effect subscribes to the computation, then
//!    evaluates it and runs its function with the result. Subscribing first
//!    means a change that lands during that first evaluation is not lost.
//!
//! 2. Each invalidation requests another run. Runs happen on the thread
//!    that requested them, re-evaluating the computation, which keeps its
//!    dependencies current so the next change is observed too.
//!
//! 3. Runs never overlap. A request arriving while a run is in progress,
//!    from any thread, is folded into one more run by the thread already
//!    running instead of waiting for it. A mutation made from inside the
//!    computation, or from a thread the computation waits on, therefore
//!    cannot deadlock the effect.
//!
//! # Differences from a plain subscription
//!
//! - A subscription is told that the value *might* have changed; an effect
//!   is handed the recomputed value.
//! - An effect runs once on creation; a subscription does not.
//!
//! # Lifetime
//!
//! The effect holds the computation weakly. Dropping or disposing the effect
//! unsubscribes it; dropping every handle to the computation silences it.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use super::computation::Computation;
use super::subscriber::Subscription;
use crate::error::Result;

/// Run bookkeeping shared between the effect handle and its subscription.
#[derive(Default)]
struct Schedule {
    pending: AtomicBool,
    running: AtomicBool,
    disposed: AtomicBool,
    run_count: AtomicUsize,
}

impl Schedule {
    /// Ask for a run, and perform it unless another caller is already
    /// running; that caller picks the request up before it stops.
    ///
    /// `step` returns `false` once there is nothing left to run against.
    fn request(&self, step: &dyn Fn() -> bool) {
        self.pending.store(true, Ordering::SeqCst);
        loop {
            if self
                .running
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                trace!("effect already running, request folded in");
                return;
            }
            let running = Running(&self.running);
            while self.pending.swap(false, Ordering::AcqRel) {
                if self.disposed.load(Ordering::SeqCst) || !step() {
                    break;
                }
                self.run_count.fetch_add(1, Ordering::SeqCst);
            }
            drop(running);

            // A request may have landed after the last swap but before
            // `running` was released.
            if !self.pending.load(Ordering::Acquire) || self.disposed.load(Ordering::SeqCst) {
                return;
            }
        }
    }
}

/// Clears the running flag even if a run panics.
struct Running<'a>(&'a AtomicBool);

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A side effect driven by a computation's value.
///
/// # Example
///
/// ```rust
/// use std::sync::{Arc, Mutex};
/// use rivulet_core::reactive::{Computation, Effect, Property};
///
/// let count = Property::new(1);
/// let doubled = Computation::new({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = Arc::clone(&seen);
/// let _effect = Effect::new(&doubled, move |value| {
///     sink.lock().unwrap().push(value.unwrap());
/// });
///
/// count.set(5);
/// assert_eq!(*seen.lock().unwrap(), vec![2, 10]);
/// ```
pub struct Effect {
    subscription: Mutex<Option<Subscription>>,
    schedule: Arc<Schedule>,
}

impl Effect {
    /// Create a new effect on `computation`.
    ///
    /// `run` is called immediately with the current result, then with the
    /// recomputed result after each invalidation. Evaluation errors are
    /// passed to `run` rather than raised.
    pub fn new<T, F>(computation: &Computation<T>, run: F) -> Self
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(Result<T>) + Send + Sync + 'static,
    {
        let schedule = Arc::new(Schedule::default());
        let weak = computation.weak_inner();
        let step = Arc::new(move || match Computation::from_weak(&weak) {
            Some(computation) => {
                run(computation.evaluate());
                true
            }
            None => false,
        });

        let subscription = {
            let schedule = Arc::clone(&schedule);
            let step = Arc::clone(&step);
            computation.subscribe(move |_| schedule.request(&*step))
        };
        schedule.request(&*step);

        Self {
            subscription: Mutex::new(Some(subscription)),
            schedule,
        }
    }

    /// Stop the effect. It will not run again.
    pub fn dispose(&self) {
        self.schedule.disposed.store(true, Ordering::SeqCst);
        self.subscription.lock().take();
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.schedule.disposed.load(Ordering::SeqCst)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.schedule.run_count.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("run_count", &self.run_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;
    use std::thread;

    use crate::graph::ComputationState;
    use crate::reactive::Property;

    fn doubled(property: &Property<i32>) -> Computation<i32> {
        let property = property.clone();
        Computation::new(move || property.get() * 2)
    }

    #[test]
    fn effect_runs_on_creation() {
        let property = Property::new(3);
        let computation = doubled(&property);
        let seen = Arc::new(AtomicI32::new(0));
        let seen_clone = Arc::clone(&seen);

        let effect = Effect::new(&computation, move |value| {
            seen_clone.store(value.unwrap(), Ordering::SeqCst);
        });

        assert_eq!(seen.load(Ordering::SeqCst), 6);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn effect_reruns_after_every_change() {
        let property = Property::new(1);
        let computation = doubled(&property);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);

        let effect = Effect::new(&computation, move |value| {
            seen_clone.lock().push(value.unwrap());
        });

        property.set(2);
        property.set(3);

        assert_eq!(*seen.lock(), vec![2, 4, 6]);
        assert_eq!(effect.run_count(), 3);
    }

    #[test]
    fn effect_does_not_run_after_disposal() {
        let property = Property::new(1);
        let computation = doubled(&property);
        let effect = Effect::new(&computation, |_| {});

        effect.dispose();
        assert!(effect.is_disposed());
        assert_eq!(computation.subscriber_count(), 0);

        property.set(2);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn dropping_the_effect_unsubscribes() {
        let property = Property::new(1);
        let computation = doubled(&property);

        let effect = Effect::new(&computation, |_| {});
        assert_eq!(computation.subscriber_count(), 1);

        drop(effect);
        assert_eq!(computation.subscriber_count(), 0);
    }

    #[test]
    fn effect_does_not_keep_the_computation_alive() {
        let property = Property::new(1);
        let computation = doubled(&property);
        let effect = Effect::new(&computation, |_| {});

        drop(computation);
        assert_eq!(property.source().dependent_count(), 0);

        property.set(5);
        assert_eq!(effect.run_count(), 1);
    }

    /// A computation over `property` that, when `armed`, has another thread
    /// write `property` in the middle of its run and waits for it.
    fn interrupted(property: &Property<i32>, armed: &Arc<AtomicBool>) -> Computation<i32> {
        let property = property.clone();
        let armed = Arc::clone(armed);
        Computation::new(move || {
            let value = property.get();
            if armed.swap(false, Ordering::SeqCst) {
                let writer = property.clone();
                thread::spawn(move || writer.set(value + 1)).join().unwrap();
            }
            value
        })
    }

    fn recording(computation: &Computation<i32>) -> (Effect, Arc<Mutex<Vec<i32>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let effect = Effect::new(computation, move |value| {
            seen_clone.lock().push(value.unwrap());
        });
        (effect, seen)
    }

    #[test]
    fn change_during_first_run_is_delivered() {
        let property = Property::new(0);
        let armed = Arc::new(AtomicBool::new(true));
        let computation = interrupted(&property, &armed);

        let (effect, seen) = recording(&computation);
        assert_eq!(*seen.lock(), vec![0, 1]);
        assert_eq!(computation.state(), ComputationState::Clean);

        // Later changes still arrive
        property.set(5);
        property.set(6);
        assert_eq!(*seen.lock(), vec![0, 1, 5, 6]);
        assert_eq!(effect.run_count(), 4);
    }

    #[test]
    fn change_during_rerun_is_delivered() {
        let property = Property::new(0);
        let armed = Arc::new(AtomicBool::new(false));
        let computation = interrupted(&property, &armed);
        let (effect, seen) = recording(&computation);

        armed.store(true, Ordering::SeqCst);
        property.set(10);

        assert_eq!(*seen.lock(), vec![0, 10, 11]);
        assert_eq!(effect.run_count(), 3);
        assert_eq!(computation.state(), ComputationState::Clean);

        property.set(20);
        assert_eq!(*seen.lock(), vec![0, 10, 11, 20]);
    }

    #[test]
    fn change_made_by_the_computation_itself_is_delivered() {
        let property = Property::new(0);
        let bump = Arc::new(AtomicBool::new(true));
        let computation = Computation::new({
            let property = property.clone();
            let bump = Arc::clone(&bump);
            move || {
                let value = property.get();
                if bump.swap(false, Ordering::SeqCst) {
                    property.set(value + 1);
                }
                value
            }
        });

        let (effect, seen) = recording(&computation);
        assert_eq!(*seen.lock(), vec![0, 1]);
        assert_eq!(effect.run_count(), 2);
        assert!(!computation.is_dirty());
    }

    #[test]
    fn panicking_run_does_not_stop_later_runs() {
        use std::panic::{self, AssertUnwindSafe};

        let property = Property::new(0);
        let computation = Computation::from_property(&property);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let effect = Effect::new(&computation, {
            let seen = Arc::clone(&seen);
            move |value| {
                let value = value.unwrap();
                assert_ne!(value, 1, "refusing 1");
                seen.lock().push(value);
            }
        });

        let result = panic::catch_unwind(AssertUnwindSafe(|| property.set(1)));
        assert!(result.is_err());

        property.set(2);
        assert_eq!(*seen.lock(), vec![0, 2]);
        assert_eq!(effect.run_count(), 2);
    }
}
