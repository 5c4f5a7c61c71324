//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (memo/effect), the
//!    signal registers that context as an observer.
//!
//! 2. A write is first compared with the current value using the signal's
//!    equality. An equal write does nothing at all.
//!
//! 3. A differing write is staged on the signal and committed when the
//!    current batch flushes. Writes outside a batch flush immediately.
//!
//! # Memory Layout
//!
//! The handle is just a [`NodeId`]; it is `Copy` and can be captured by any
//! number of closures. The value lives in a cell owned by the graph node and
//! goes away when the signal's owner is disposed.

use std::any::Any;
use std::cell::RefCell;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::rc::Rc;

use super::runtime::{
    create_node, is_alive, read_node, run_batch, stage_write, throw, with_runtime,
    write_conflict_policy,
};
use crate::config::WriteConflictPolicy;
use crate::error::{ReactiveError, Result};
use crate::graph::{NodeId, NodeKind, ValueCell};

type Equality<T> = Box<dyn Fn(&T, &T) -> bool>;

/// Value storage for a signal.
pub(crate) struct SignalCell<T> {
    value: RefCell<T>,
    pending: RefCell<Option<T>>,
    /// `None` means every write counts as a change.
    equals: Option<Equality<T>>,
}

impl<T: 'static> SignalCell<T> {
    fn new(value: T, equals: Option<Equality<T>>) -> Self {
        Self {
            value: RefCell::new(value),
            pending: RefCell::new(None),
            equals,
        }
    }

    fn is_equal(&self, a: &T, b: &T) -> bool {
        self.equals.as_ref().is_some_and(|eq| eq(a, b))
    }

    /// Stage `value` for the current batch. Returns true when the signal
    /// needs to be queued for commit.
    fn stage(&self, node: NodeId, value: T, policy: WriteConflictPolicy) -> Result<bool> {
        let staged = self.pending.borrow_mut().take();
        match staged {
            Some(previous) => {
                if self.is_equal(&previous, &value) {
                    *self.pending.borrow_mut() = Some(previous);
                    return Ok(false);
                }
                match policy {
                    WriteConflictPolicy::LastWriteWins => {
                        *self.pending.borrow_mut() = Some(value);
                        Ok(false)
                    }
                    WriteConflictPolicy::Reject => {
                        *self.pending.borrow_mut() = Some(previous);
                        Err(ReactiveError::ConflictingWrite { node })
                    }
                }
            }
            None => {
                if self.is_equal(&self.value.borrow(), &value) {
                    return Ok(false);
                }
                *self.pending.borrow_mut() = Some(value);
                Ok(true)
            }
        }
    }
}

impl<T: 'static> ValueCell for SignalCell<T> {
    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }

    fn commit_pending(&self) -> bool {
        let Some(next) = self.pending.borrow_mut().take() else {
            return false;
        };
        if self.is_equal(&self.value.borrow(), &next) {
            return false;
        }
        let previous = self.value.replace(next);
        drop(previous);
        true
    }

    fn discard_pending(&self) {
        let staged = self.pending.borrow_mut().take();
        drop(staged);
    }
}

/// A reactive signal holding a value of type T.
///
/// # Example
///
/// ```rust
/// use rivulet_core::reactive::Signal;
///
/// let count = Signal::new(0);
///
/// // Read the value
/// assert_eq!(count.get(), 0);
///
/// // Update the value (notifies observers)
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T> {
    id: NodeId,
    ty: PhantomData<fn() -> T>,
}

impl<T: 'static> Signal<T> {
    /// Create a new signal that skips writes equal to the current value.
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_equals(value, T::eq)
    }

    /// Create a signal with a custom equality predicate.
    pub fn with_equals(value: T, equals: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Self::from_cell(SignalCell::new(value, Some(Box::new(equals))))
    }

    /// Create a signal for which every write is a change.
    pub fn always_notify(value: T) -> Self {
        Self::from_cell(SignalCell::new(value, None))
    }

    fn from_cell(cell: SignalCell<T>) -> Self {
        let id = create_node(NodeKind::Signal, Some(Rc::new(cell)), None);
        Self {
            id,
            ty: PhantomData,
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    fn cell(&self, track: bool) -> Result<Rc<SignalCell<T>>> {
        read_node(self.id, track)?
            .into_any()
            .downcast::<SignalCell<T>>()
            .map_err(|_| ReactiveError::Disposed { node: self.id })
    }

    /// Borrow the current value, registering a dependency.
    ///
    /// The value stays borrowed while `f` runs; do not write to this signal
    /// from inside `f`.
    pub fn try_with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let cell = self.cell(true)?;
        let value = cell.value.borrow();
        Ok(f(&value))
    }

    /// Borrow the current value, registering a dependency.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.try_with(f).unwrap_or_else(|err| throw(err))
    }

    /// Borrow the current value without registering a dependency.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let cell = self.cell(false).unwrap_or_else(|err| throw(err));
        let value = cell.value.borrow();
        f(&value)
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as an observer.
    pub fn try_get(&self) -> Result<T>
    where
        T: Clone,
    {
        self.try_with(T::clone)
    }

    /// Get the current value, unwinding if the signal was disposed.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.with_untracked(T::clone)
    }

    /// Write a new value.
    ///
    /// Inside a batch the value is staged and committed when the batch
    /// flushes; otherwise it is committed and propagated immediately.
    pub fn try_set(&self, value: T) -> Result<()> {
        let cell = self.cell(false)?;
        if cell.stage(self.id, value, write_conflict_policy())? {
            run_batch(|| stage_write(self.id))?;
        }
        Ok(())
    }

    /// Write a new value, unwinding on propagation errors.
    pub fn set(&self, value: T) {
        self.try_set(value).unwrap_or_else(|err| throw(err));
    }

    /// Update the value using a function of the latest value, including one
    /// staged earlier in the same batch.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let cell = self.cell(false).unwrap_or_else(|err| throw(err));
        let next = {
            let staged = cell.pending.borrow();
            match staged.as_ref() {
                Some(value) => f(value),
                None => f(&cell.value.borrow()),
            }
        };
        self.set(next);
    }

    /// Split into a read-only and a write-only handle.
    pub fn split(self) -> (ReadSignal<T>, WriteSignal<T>) {
        (ReadSignal { inner: self }, WriteSignal { inner: self })
    }

    /// Whether the signal's owner has been disposed.
    pub fn is_disposed(&self) -> bool {
        !is_alive(self.id)
    }

    /// Number of computations currently reading this signal.
    pub fn observer_count(&self) -> usize {
        with_runtime(|rt| rt.graph.observers(self.id).len())
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Signal<T> {}

impl<T> PartialEq for Signal<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Signal<T> {}

impl<T: Debug + 'static> Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Signal");
        s.field("id", &self.id);
        match self.cell(false) {
            Ok(cell) => {
                let value = cell.value.borrow();
                s.field("value", &*value);
            }
            Err(_) => {
                s.field("disposed", &true);
            }
        }
        s.field("observer_count", &self.observer_count()).finish()
    }
}

/// Read half of a signal.
pub struct ReadSignal<T> {
    inner: Signal<T>,
}

impl<T: 'static> ReadSignal<T> {
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn try_with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        self.inner.try_with(f)
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.with(f)
    }

    pub fn try_get(&self) -> Result<T>
    where
        T: Clone,
    {
        self.inner.try_get()
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.inner.get()
    }

    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.inner.get_untracked()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }
}

impl<T> Clone for ReadSignal<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ReadSignal<T> {}

impl<T: Debug + 'static> Debug for ReadSignal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.inner.fmt(f)
    }
}

/// Write half of a signal.
pub struct WriteSignal<T> {
    inner: Signal<T>,
}

impl<T: 'static> WriteSignal<T> {
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn try_set(&self, value: T) -> Result<()> {
        self.inner.try_set(value)
    }

    pub fn set(&self, value: T) {
        self.inner.set(value)
    }

    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        self.inner.update(f)
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }
}

impl<T> Clone for WriteSignal<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for WriteSignal<T> {}

impl<T> Debug for WriteSignal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteSignal").field("id", &self.inner.id).finish()
    }
}

/// Create a signal and return its read and write halves.
pub fn create_signal<T: PartialEq + 'static>(value: T) -> (ReadSignal<T>, WriteSignal<T>) {
    Signal::new(value).split()
}

/// Create a signal with a custom equality and return its halves.
pub fn create_signal_with<T: 'static>(
    value: T,
    equals: impl Fn(&T, &T) -> bool + 'static,
) -> (ReadSignal<T>, WriteSignal<T>) {
    Signal::with_equals(value, equals).split()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::reactive::{batch, configure, try_batch};

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        signal.set(42);
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn signal_update_sees_staged_value() {
        let signal = Signal::new(0);
        batch(|| {
            signal.update(|v| v + 1);
            signal.update(|v| v + 1);
            // Not committed until the batch ends
            assert_eq!(signal.get_untracked(), 0);
        });
        assert_eq!(signal.get(), 2);
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1;

        signal1.set(42);
        assert_eq!(signal2.get(), 42);

        signal2.set(100);
        assert_eq!(signal1.get(), 100);
    }

    #[test]
    fn signal_ids_are_unique() {
        let s1 = Signal::new(0);
        let s2 = Signal::new(0);
        let s3 = Signal::new(0);

        assert_ne!(s1.id(), s2.id());
        assert_ne!(s2.id(), s3.id());
        assert_ne!(s1.id(), s3.id());
    }

    #[test]
    fn split_halves_share_value() {
        let (read, write) = create_signal(String::from("a"));
        write.set("b".to_string());
        assert_eq!(read.get(), "b");
        assert_eq!(read.id(), write.id());
    }

    #[test]
    fn last_write_wins_in_batch() {
        let signal = Signal::new(1);
        batch(|| {
            signal.set(2);
            signal.set(3);
        });
        assert_eq!(signal.get(), 3);
    }

    #[test]
    fn writing_back_the_original_value_in_batch_is_a_no_op() {
        let signal = Signal::new(1);
        batch(|| {
            signal.set(2);
            signal.set(1);
        });
        assert_eq!(signal.get(), 1);
    }

    #[test]
    fn reject_policy_fails_on_conflicting_writes() {
        configure(RuntimeConfig::default().with_write_conflicts(WriteConflictPolicy::Reject));
        let signal = Signal::new(1);

        let result = try_batch(|| {
            signal.set(2);
            signal.try_set(3)
        })
        .unwrap();

        assert_eq!(result, Err(ReactiveError::ConflictingWrite { node: signal.id() }));
        assert_eq!(signal.get(), 2);
        configure(RuntimeConfig::default());
    }

    #[test]
    fn reject_policy_accepts_equal_rewrites() {
        configure(RuntimeConfig::default().with_write_conflicts(WriteConflictPolicy::Reject));
        let signal = Signal::with_equals(10, |a: &i32, b: &i32| a / 10 == b / 10);

        batch(|| {
            signal.set(20);
            // Equal to the staged 20 under the custom equality
            signal.set(25);
        });
        assert_eq!(signal.get(), 20);
        configure(RuntimeConfig::default());
    }

    #[test]
    fn always_notify_commits_equal_values() {
        let signal = Signal::always_notify(vec![1]);
        signal.set(vec![1]);
        assert_eq!(signal.get(), vec![1]);
    }

    #[test]
    fn debug_output_includes_value() {
        let signal = Signal::new(7);
        let text = format!("{signal:?}");
        assert!(text.contains("value: 7"));
    }
}
