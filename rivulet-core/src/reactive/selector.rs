//! Selectors
//!
//! A selector answers "is this key the selected one?" for many readers at
//! once. When the selection moves, only the readers of the old key and of
//! the new key are notified, instead of every reader of the source.

use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::Hash;
use std::rc::Rc;

use super::context::is_tracking;
use super::effect::{create_computed, Effect};
use super::owner::{get_owner, on_cleanup, run_with_owner, Owner};
use super::runtime::dispose_node;
use super::signal::Signal;

struct Subscription {
    flag: Signal<bool>,
    readers: usize,
}

struct SelectorState<T> {
    owner: Option<Owner>,
    current: RefCell<Option<T>>,
    subs: RefCell<HashMap<T, Subscription>>,
}

impl<T: Hash + Eq + Clone + 'static> SelectorState<T> {
    fn flag_for(&self, key: &T) -> Signal<bool> {
        if let Some(sub) = self.subs.borrow().get(key) {
            return sub.flag;
        }

        let initial = self.current.borrow().as_ref() == Some(key);
        let flag = match self.owner {
            Some(owner) => run_with_owner(owner, || Signal::new(initial)),
            None => Signal::new(initial),
        };
        self.subs.borrow_mut().insert(
            key.clone(),
            Subscription {
                flag,
                readers: 0,
            },
        );
        flag
    }

    fn release(&self, key: &T) {
        let removed = {
            let mut subs = self.subs.borrow_mut();
            let remaining = subs.get_mut(key).map(|sub| {
                sub.readers = sub.readers.saturating_sub(1);
                sub.readers
            });
            match remaining {
                Some(0) => subs.remove(key),
                _ => None,
            }
        };
        if let Some(sub) = removed {
            dispose_node(sub.flag.id());
        }
    }
}

/// Keyed membership test over a reactive selection.
pub struct Selector<T> {
    state: Rc<SelectorState<T>>,
    driver: Effect,
}

impl<T: Hash + Eq + Clone + 'static> Selector<T> {
    /// Whether `key` is the current selection.
    ///
    /// Inside a computation this subscribes to `key` only: the computation
    /// re-runs when `key` becomes selected or stops being selected.
    pub fn selected(&self, key: &T) -> bool {
        if !is_tracking() {
            return self.state.current.borrow().as_ref() == Some(key);
        }

        let flag = self.state.flag_for(key);
        if let Some(sub) = self.state.subs.borrow_mut().get_mut(key) {
            sub.readers += 1;
        }
        let state = Rc::clone(&self.state);
        let key = key.clone();
        on_cleanup(move || state.release(&key));
        flag.get()
    }

    /// Number of keys with live subscriptions.
    pub fn key_count(&self) -> usize {
        self.state.subs.borrow().len()
    }

    pub fn is_disposed(&self) -> bool {
        self.driver.is_disposed()
    }
}

impl<T> Clone for Selector<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
            driver: self.driver,
        }
    }
}

impl<T> std::fmt::Debug for Selector<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selector")
            .field("driver", &self.driver)
            .field("keys", &self.state.subs.borrow().len())
            .finish()
    }
}

/// Create a selector over `source`.
///
/// ```rust
/// use rivulet_core::reactive::{create_root, create_selector, Signal};
///
/// create_root(|_| {
///     let current = Signal::new(1);
///     let is_selected = create_selector(move || current.get());
///     assert!(is_selected.selected(&1));
///     assert!(!is_selected.selected(&2));
/// });
/// ```
pub fn create_selector<T>(source: impl Fn() -> T + 'static) -> Selector<T>
where
    T: Hash + Eq + Clone + 'static,
{
    let state = Rc::new(SelectorState {
        owner: get_owner(),
        current: RefCell::new(None),
        subs: RefCell::new(HashMap::new()),
    });

    let inner = Rc::clone(&state);
    let driver = create_computed(move |prev: Option<T>| {
        let next = source();
        if prev.as_ref() == Some(&next) {
            return next;
        }
        *inner.current.borrow_mut() = Some(next.clone());

        let (old_flag, new_flag) = {
            let subs = inner.subs.borrow();
            (
                prev.as_ref().and_then(|key| subs.get(key)).map(|sub| sub.flag),
                subs.get(&next).map(|sub| sub.flag),
            )
        };
        if let Some(flag) = old_flag {
            flag.set(false);
        }
        if let Some(flag) = new_flag {
            flag.set(true);
        }
        next
    });

    Selector { state, driver }
}
