//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. On first access, the memo runs its computation and caches the result.
//!
//! 2. When accessed again, if no dependencies have changed, returns the
//!    cached value.
//!
//! 3. When a dependency changes, the memo is marked `Stale` (direct source)
//!    or `Pending` (something further upstream).
//!
//! 4. On next access, a pending memo first settles its own sources. It only
//!    recomputes if one of them actually produced a different value.
//!
//! 5. A recomputation that yields an equal value stops propagation there:
//!    readers of the memo stay as they are.
//!
//! # Why This Matters
//!
//! Memos are never queued by the scheduler. A memo that nothing reads after
//! a write stays stale and costs nothing until somebody asks for it.

use std::any::Any;
use std::cell::RefCell;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::rc::Rc;

use super::runtime::{create_node, is_alive, read_node, throw, with_runtime};
use crate::error::{ReactiveError, Result};
use crate::graph::{Computation, NodeId, NodeKind, NodeState, ValueCell};
use crate::loadable::Loadable;

/// Value storage for a memo. `None` until the first successful run.
pub(crate) struct MemoCell<T> {
    value: RefCell<Option<T>>,
}

impl<T: 'static> ValueCell for MemoCell<T> {
    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

struct MemoComputation<T, F> {
    cell: Rc<MemoCell<T>>,
    f: F,
    equals: Box<dyn Fn(&T, &T) -> bool>,
}

impl<T, F> Computation for MemoComputation<T, F>
where
    T: 'static,
    F: Fn(Option<&T>) -> T,
{
    fn run(&self) -> bool {
        let next = {
            let previous = self.cell.value.borrow();
            (self.f)(previous.as_ref())
        };

        let changed = match self.cell.value.borrow().as_ref() {
            Some(previous) => !(self.equals)(previous, &next),
            None => true,
        };
        if changed {
            let previous = self.cell.value.replace(Some(next));
            drop(previous);
        }
        changed
    }

    fn has_value(&self) -> bool {
        self.cell.value.borrow().is_some()
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// The function receives the previous value (`None` on the first run).
///
/// ```rust
/// use rivulet_core::reactive::{Memo, Signal};
///
/// let count = Signal::new(2);
/// let doubled = Memo::new(move |_| count.get() * 2);
/// assert_eq!(doubled.get(), 4);
///
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Memo<T> {
    id: NodeId,
    ty: PhantomData<fn() -> T>,
}

impl<T: 'static> Memo<T> {
    /// Create a new memo whose readers are only notified when the computed
    /// value differs from the previous one.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new(f: impl Fn(Option<&T>) -> T + 'static) -> Self
    where
        T: PartialEq,
    {
        Self::with_equals(f, T::eq)
    }

    /// Create a memo with a custom equality predicate.
    pub fn with_equals(
        f: impl Fn(Option<&T>) -> T + 'static,
        equals: impl Fn(&T, &T) -> bool + 'static,
    ) -> Self {
        let cell = Rc::new(MemoCell {
            value: RefCell::new(None),
        });
        let compute = MemoComputation {
            cell: Rc::clone(&cell),
            f,
            equals: Box::new(equals),
        };
        let id = create_node(NodeKind::Memo, Some(cell), Some(Rc::new(compute)));
        Self {
            id,
            ty: PhantomData,
        }
    }

    /// Get the memo's unique ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    fn read(&self, track: bool) -> Result<Rc<MemoCell<T>>> {
        read_node(self.id, track)?
            .into_any()
            .downcast::<MemoCell<T>>()
            .map_err(|_| ReactiveError::Disposed { node: self.id })
    }

    fn with_cell<R>(&self, cell: &MemoCell<T>, f: impl FnOnce(&T) -> R) -> Result<R> {
        match cell.value.borrow().as_ref() {
            Some(value) => Ok(f(value)),
            None => Err(ReactiveError::ComputationPanicked {
                message: format!("memo {:?} has no value; its computation failed", self.id),
            }),
        }
    }

    /// Borrow the current value, recomputing first if necessary.
    pub fn try_with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let cell = self.read(true)?;
        self.with_cell(&cell, f)
    }

    /// Borrow the current value, recomputing first if necessary.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.try_with(f).unwrap_or_else(|err| throw(err))
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// Fails with `CircularDependency` when called from inside its own
    /// computation, directly or through other memos.
    pub fn try_get(&self) -> Result<T>
    where
        T: Clone,
    {
        self.try_with(T::clone)
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// This is the main entry point for reading a memo's value.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Get the current value without registering a dependency.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.read(false)
            .and_then(|cell| self.with_cell(&cell, T::clone))
            .unwrap_or_else(|err| throw(err))
    }

    /// Read the value as a [`Loadable`], tracked like [`Memo::get`].
    ///
    /// `Pending` while the memo has not produced a value, for instance
    /// because every run so far failed. Other errors still unwind.
    pub fn loadable(&self) -> Loadable<T>
    where
        T: Clone,
    {
        let cell = self.read(true).unwrap_or_else(|err| throw(err));
        let value = cell.value.borrow().clone();
        value.into()
    }

    /// Get the current propagation state.
    pub fn state(&self) -> Option<NodeState> {
        with_runtime(|rt| rt.graph.state(self.id))
    }

    /// Check if the memo has a cached value.
    pub fn has_value(&self) -> bool {
        with_runtime(|rt| rt.graph.get(self.id).and_then(|node| node.compute.clone()))
            .is_some_and(|compute| compute.has_value())
    }

    /// Number of computations currently reading this memo.
    pub fn observer_count(&self) -> usize {
        with_runtime(|rt| rt.graph.observers(self.id).len())
    }

    pub fn is_disposed(&self) -> bool {
        !is_alive(self.id)
    }
}

impl<T> Clone for Memo<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Memo<T> {}

impl<T> PartialEq for Memo<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Memo<T> {}

impl<T: 'static> Debug for Memo<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("has_value", &self.has_value())
            .field("observer_count", &self.observer_count())
            .finish()
    }
}

/// Create a memo. Same as [`Memo::new`].
pub fn create_memo<T: PartialEq + 'static>(f: impl Fn(Option<&T>) -> T + 'static) -> Memo<T> {
    Memo::new(f)
}

/// Create a memo with a custom equality. Same as [`Memo::with_equals`].
pub fn create_memo_with<T: 'static>(
    f: impl Fn(Option<&T>) -> T + 'static,
    equals: impl Fn(&T, &T) -> bool + 'static,
) -> Memo<T> {
    Memo::with_equals(f, equals)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
