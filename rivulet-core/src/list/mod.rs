//! List Mapping
//!
//! Incremental mapping of a reactive list to a list of derived values.
//!
//! # Overview
//!
//! Each mapped item lives under its own root. When the source list changes,
//! the mapper diffs the old and new lists and only creates roots for items
//! that are new and only disposes roots for items that are gone. Surviving
//! items keep their derived value and everything it owns, even when they
//! move.
//!
//! - [`map_array`] / [`map_array_keyed`]: identity by value or by key. Each
//!   item also gets a signal holding its current index.
//! - [`index_array`]: identity by position. Each slot gets a signal holding
//!   the item currently at that position.
//!
//! Both return a [`Memo`](crate::reactive::Memo) over the mapped values and
//! dispose every item root when the owner they were created under goes away.

mod index_array;
mod map_array;

use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::reactive::{create_root, Disposer};

pub use index_array::{index_array, index_array_with};
pub use map_array::{map_array, map_array_keyed, map_array_with};

/// Options shared by the list mappers.
pub struct MapOptions<U> {
    fallback: Option<Rc<dyn Fn() -> U>>,
}

impl<U> MapOptions<U> {
    pub fn new() -> Self {
        Self { fallback: None }
    }

    /// Render a single value, under its own root, while the list is empty.
    pub fn with_fallback(mut self, fallback: impl Fn() -> U + 'static) -> Self {
        self.fallback = Some(Rc::new(fallback));
        self
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

impl<U> Default for MapOptions<U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U> Clone for MapOptions<U> {
    fn clone(&self) -> Self {
        Self {
            fallback: self.fallback.clone(),
        }
    }
}

impl<U> std::fmt::Debug for MapOptions<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapOptions")
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

/// The fallback value shown for an empty list, with the root that owns it.
pub(crate) struct FallbackSlot<U> {
    value: U,
    disposer: Disposer,
}

impl<U> FallbackSlot<U> {
    pub(crate) fn dispose(self) {
        self.disposer.dispose();
    }
}

impl<U: Clone> FallbackSlot<U> {
    /// Create the fallback if `options` has one.
    pub(crate) fn create(options: &MapOptions<U>) -> std::thread::Result<Option<Self>> {
        let Some(fallback) = options.fallback.as_ref() else {
            return Ok(None);
        };
        catch_root(|disposer| FallbackSlot {
            value: fallback(),
            disposer,
        })
        .map(Some)
    }

    pub(crate) fn value(&self) -> U {
        self.value.clone()
    }
}

/// Run `f` under a fresh root. If `f` panics, the root is disposed and the
/// panic handed back instead of unwinding through the mapper's state.
pub(crate) fn catch_root<R>(f: impl FnOnce(Disposer) -> R) -> std::thread::Result<R> {
    let mut root = None;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        create_root(|disposer| {
            root = Some(disposer);
            f(disposer)
        })
    }));
    if outcome.is_err() {
        if let Some(root) = root {
            root.dispose();
        }
    }
    outcome
}
