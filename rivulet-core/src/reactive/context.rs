//! Reactive Context
//!
//! The reactive context tracks which owner and which listener are current.
//! The owner receives every computation and cleanup created while it is
//! current; the listener receives a dependency edge for every read.
//!
//! # Implementation
//!
//! Both values live on the thread-local runtime. Entering a context swaps
//! new values in and returns a guard that swaps the previous ones back when
//! dropped, so nesting behaves like dynamically scoped variables and the
//! previous state is restored even when a computation unwinds.

use super::runtime::with_runtime;
use crate::graph::NodeId;

/// Guard that restores the previous owner and listener when dropped.
pub(crate) struct ReactiveContext {
    prev_owner: Option<NodeId>,
    prev_listener: Option<NodeId>,
}

impl ReactiveContext {
    /// Make `owner` and `listener` current until the guard is dropped.
    pub(crate) fn enter(owner: Option<NodeId>, listener: Option<NodeId>) -> Self {
        with_runtime(|rt| {
            let prev_owner = std::mem::replace(&mut rt.owner, owner);
            let prev_listener = std::mem::replace(&mut rt.listener, listener);
            Self {
                prev_owner,
                prev_listener,
            }
        })
    }

    /// Keep the current owner but stop tracking reads.
    pub(crate) fn untracked() -> Self {
        let owner = current_owner();
        Self::enter(owner, None)
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        with_runtime(|rt| {
            rt.owner = self.prev_owner;
            rt.listener = self.prev_listener;
        });
    }
}

/// The owner new nodes will be attached to, if any.
pub(crate) fn current_owner() -> Option<NodeId> {
    with_runtime(|rt| rt.owner)
}

/// The computation currently collecting dependencies, if any.
pub(crate) fn current_listener() -> Option<NodeId> {
    with_runtime(|rt| rt.listener)
}

/// Check if reads are currently being tracked.
pub fn is_tracking() -> bool {
    current_listener().is_some()
}

/// Run `f` without recording any reads as dependencies.
///
/// The current owner and batch are left untouched, so computations created
/// inside `f` are still owned as usual.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::untracked();
    f()
}

/// Read without subscribing. Same as [`untrack`].
pub fn sample<R>(f: impl FnOnce() -> R) -> R {
    untrack(f)
}
