//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect is queued and runs as soon as the current
//!    batch flushes (immediately, outside of a batch) to establish its
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect is queued to re-run once the
//!    memos it read have settled.
//!
//! 3. Before re-running, the effect drops its old dependencies, disposes
//!    everything it created last time and runs its cleanups.
//!
//! # Differences from Memo
//!
//! - Memos expose a value; effects do not.
//! - Memos are lazy (compute on access); effects are eager (run when deps change).
//! - Memos stop propagation on equal values; effects have no readers to notify.
//!
//! # Computed Nodes
//!
//! [`create_computed`] builds the same kind of node but queues it ahead of
//! effects, for pure bookkeeping that effects of the same wave may rely on.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use super::runtime::{
    create_node, dispose_node, is_alive, run_batch, schedule_new, throw, with_runtime,
};
use crate::error::Result;
use crate::graph::{Computation, NodeId, NodeKind, NodeState};

struct EffectComputation<T, F> {
    f: RefCell<F>,
    value: RefCell<Option<T>>,
}

impl<T, F> Computation for EffectComputation<T, F>
where
    F: FnMut(Option<T>) -> T,
{
    fn run(&self) -> bool {
        let previous = self.value.borrow_mut().take();
        let next = (self.f.borrow_mut())(previous);
        *self.value.borrow_mut() = Some(next);
        false
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// The function receives whatever it returned last time, so effects can
/// carry state between runs without an extra signal.
///
/// # Example
///
/// ```rust
/// use rivulet_core::reactive::{create_root, Effect, Signal};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// create_root(|_| {
///     let count = Signal::new(0);
///     let seen = Rc::new(Cell::new(0));
///
///     let log = seen.clone();
///     Effect::new(move |_| log.set(count.get()));
///
///     count.set(5);
///     assert_eq!(seen.get(), 5);
/// });
/// ```
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Effect {
    id: NodeId,
}

impl Effect {
    /// Create an effect and queue its first run.
    pub fn new<T: 'static>(f: impl FnMut(Option<T>) -> T + 'static) -> Self {
        Self::build(NodeKind::Effect, None, f)
    }

    /// Create an effect whose first run receives `initial`.
    pub fn with_initial<T: 'static>(initial: T, f: impl FnMut(Option<T>) -> T + 'static) -> Self {
        Self::build(NodeKind::Effect, Some(initial), f)
    }

    /// Like [`Effect::new`], returning propagation errors from the first run
    /// instead of unwinding.
    pub fn try_new<T: 'static>(f: impl FnMut(Option<T>) -> T + 'static) -> Result<Self> {
        Self::try_build(NodeKind::Effect, None, f)
    }

    fn build<T: 'static>(
        kind: NodeKind,
        initial: Option<T>,
        f: impl FnMut(Option<T>) -> T + 'static,
    ) -> Self {
        Self::try_build(kind, initial, f).unwrap_or_else(|err| throw(err))
    }

    fn try_build<T: 'static>(
        kind: NodeKind,
        initial: Option<T>,
        f: impl FnMut(Option<T>) -> T + 'static,
    ) -> Result<Self> {
        let compute = EffectComputation {
            f: RefCell::new(f),
            value: RefCell::new(initial),
        };
        let id = create_node(kind, None, Some(Rc::new(compute)));
        schedule_new(id)?;
        Ok(Self { id })
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Dispose of the effect ahead of its owner.
    ///
    /// Its cleanups run, everything it created is disposed and it will not
    /// run again, even if it is already queued.
    pub fn try_dispose(&self) -> Result<()> {
        let id = self.id;
        run_batch(|| dispose_node(id))
    }

    /// Dispose of the effect, unwinding if cleanups trigger a failing update.
    pub fn dispose(&self) {
        self.try_dispose().unwrap_or_else(|err| throw(err));
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        !is_alive(self.id)
    }

    /// Get the current propagation state.
    pub fn state(&self) -> Option<NodeState> {
        with_runtime(|rt| rt.graph.state(self.id))
    }

    /// Number of signals and memos read during the latest run.
    pub fn dependency_count(&self) -> usize {
        with_runtime(|rt| rt.graph.sources(self.id).len())
    }
}

impl Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Create an effect. Same as [`Effect::new`].
pub fn create_effect<T: 'static>(f: impl FnMut(Option<T>) -> T + 'static) -> Effect {
    Effect::new(f)
}

/// Create an eager computation that runs before the effects of each flush.
pub fn create_computed<T: 'static>(f: impl FnMut(Option<T>) -> T + 'static) -> Effect {
    Effect::build(NodeKind::Computed, None, f)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{batch, create_root, on_cleanup, Signal};
    use std::cell::Cell;

    #[test]
    fn effect_runs_on_creation() {
        let run_count = Rc::new(Cell::new(0));
        let runs = run_count.clone();

        create_root(|_| {
            Effect::new(move |_| runs.set(runs.get() + 1));
        });

        assert_eq!(run_count.get(), 1);
    }

    #[test]
    fn effect_deferred_inside_batch() {
        let run_count = Rc::new(Cell::new(0));
        let runs = run_count.clone();

        create_root(|_| {
            batch(|| {
                Effect::new(move |_| runs.set(runs.get() + 1));
                assert_eq!(run_count.get(), 0);
            });
            assert_eq!(run_count.get(), 1);
        });
    }

    #[test]
    fn effect_reruns_when_source_changes() {
        let source = Signal::new(1);
        let seen = Rc::new(Cell::new(0));
        let log = seen.clone();

        create_root(|_| {
            Effect::new(move |_| log.set(source.get()));
        });

        source.set(2);
        assert_eq!(seen.get(), 2);
        source.set(3);
        assert_eq!(seen.get(), 3);
    }

    #[test]
    fn effect_receives_previous_return_value() {
        let source = Signal::new(0);
        let history = Rc::new(RefCell::new(Vec::new()));
        let log = history.clone();

        create_root(|_| {
            Effect::with_initial(100, move |prev: Option<i32>| {
                log.borrow_mut().push(prev);
                source.get()
            });
        });

        source.set(7);
        assert_eq!(*history.borrow(), vec![Some(100), Some(0)]);
        source.set(8);
        assert_eq!(history.borrow().last(), Some(&Some(7)));
    }

    #[test]
    fn effect_does_not_run_after_disposal() {
        let source = Signal::new(0);
        let run_count = Rc::new(Cell::new(0));
        let cleaned = Rc::new(Cell::new(false));

        let (runs, flag) = (run_count.clone(), cleaned.clone());
        let effect = create_root(move |_| {
            Effect::new(move |_| {
                source.get();
                runs.set(runs.get() + 1);
                let flag = flag.clone();
                on_cleanup(move || flag.set(true));
            })
        });
        assert_eq!(run_count.get(), 1);

        effect.dispose();
        assert!(effect.is_disposed());
        assert!(cleaned.get());
        assert_eq!(source.observer_count(), 0);

        source.set(1);
        assert_eq!(run_count.get(), 1);
    }

    #[test]
    fn dependencies_follow_latest_run() {
        let toggle = Signal::new(true);
        let a = Signal::new(1);
        let b = Signal::new(2);

        let effect = create_root(|_| {
            Effect::new(move |_| {
                if toggle.get() {
                    a.get();
                } else {
                    b.get();
                }
            })
        });
        assert_eq!(effect.dependency_count(), 2);
        assert_eq!(a.observer_count(), 1);

        toggle.set(false);
        assert_eq!(a.observer_count(), 0);
        assert_eq!(b.observer_count(), 1);
    }

    #[test]
    fn computed_runs_before_effects() {
        let source = Signal::new(0);
        let order = Rc::new(RefCell::new(Vec::new()));

        create_root(|_| {
            let log = order.clone();
            Effect::new(move |_| {
                source.get();
                log.borrow_mut().push("effect");
            });
            let log = order.clone();
            create_computed(move |_| {
                source.get();
                log.borrow_mut().push("computed");
            });
        });
        order.borrow_mut().clear();

        source.set(1);
        assert_eq!(*order.borrow(), vec!["computed", "effect"]);
    }
}
