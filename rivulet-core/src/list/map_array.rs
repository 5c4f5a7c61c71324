//! Identity-preserving list mapping.
//!
//! # Algorithm
//!
//! Reconciling an old key list against a new one:
//!
//! 1. Empty lists are handled wholesale: dispose everything, or create
//!    everything.
//! 2. Items that match at the start of both lists and at the end of both
//!    lists are kept where they are.
//! 3. For the window left in the middle, an index from key to new position
//!    is built. Duplicate keys are chained so each old occurrence claims the
//!    next new occurrence in order.
//! 4. Every old item in the window either moves to its claimed position or,
//!    if its key is gone, has its root disposed.
//! 5. New positions nobody claimed get a fresh root.
//!
//! Moved items are told their new position through their index signal.
//!
//! If `map_fn` panics part way, every root the mapper holds is disposed and
//! the state is left empty, so the next change rebuilds the whole list.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::Hash;
use std::panic;
use std::rc::Rc;

use super::{catch_root, FallbackSlot, MapOptions};
use crate::reactive::{on_cleanup, untrack, Disposer, Memo, ReadSignal, Signal};

/// One mapped item and the root that owns everything it created.
struct Slot<U> {
    value: U,
    index: Signal<usize>,
    disposer: Disposer,
}

struct MapState<K, U> {
    keys: Vec<K>,
    slots: Vec<Slot<U>>,
    fallback: Option<FallbackSlot<U>>,
}

impl<K, U> MapState<K, U> {
    fn new() -> Self {
        Self {
            keys: Vec::new(),
            slots: Vec::new(),
            fallback: None,
        }
    }
}

/// Work left over from a reconcile that must happen once the state is no
/// longer borrowed.
struct Retired<U> {
    slots: Vec<Slot<U>>,
    fallback: Option<FallbackSlot<U>>,
}

impl<U> Retired<U> {
    fn dispose(self) {
        for slot in self.slots.into_iter().rev() {
            slot.disposer.dispose();
        }
        if let Some(fallback) = self.fallback {
            fallback.dispose();
        }
    }
}

/// A reconcile cut short by a panicking `map_fn`.
struct Aborted<U> {
    retired: Retired<U>,
    payload: Box<dyn Any + Send>,
}

fn create_slot<T, U>(
    item: &T,
    position: usize,
    map_fn: &dyn Fn(&T, ReadSignal<usize>) -> U,
) -> std::thread::Result<Slot<U>> {
    catch_root(|disposer| {
        let index = Signal::new(position);
        let value = map_fn(item, index.split().0);
        Slot {
            value,
            index,
            disposer,
        }
    })
}

/// Bring `state` in line with `items`. Returns the roots to dispose.
fn reconcile<T, K, U>(
    state: &mut MapState<K, U>,
    items: &[T],
    key_fn: &dyn Fn(&T) -> K,
    map_fn: &dyn Fn(&T, ReadSignal<usize>) -> U,
    options: &MapOptions<U>,
) -> Result<Retired<U>, Aborted<U>>
where
    K: Hash + Eq,
    U: Clone,
{
    let new_keys: Vec<K> = items.iter().map(key_fn).collect();
    // Until the end the state holds nothing, so an abort leaves it empty
    let old_keys = std::mem::take(&mut state.keys);
    let old_len = old_keys.len();
    let new_len = new_keys.len();

    // Fast path: nothing left
    if new_len == 0 {
        let retired = Retired {
            slots: std::mem::take(&mut state.slots),
            fallback: None,
        };
        if state.fallback.is_none() {
            match FallbackSlot::create(options) {
                Ok(fallback) => state.fallback = fallback,
                Err(payload) => return Err(Aborted { retired, payload }),
            }
        }
        return Ok(retired);
    }

    let mut retired = Retired {
        slots: Vec::new(),
        fallback: state.fallback.take(),
    };

    let mut old: Vec<Option<Slot<U>>> = std::mem::take(&mut state.slots)
        .into_iter()
        .map(Some)
        .collect();
    let mut placed: Vec<Option<Slot<U>>> = (0..new_len).map(|_| None).collect();

    if old_len > 0 {
        // Common prefix
        let mut start = 0;
        while start < old_len && start < new_len && old_keys[start] == new_keys[start] {
            placed[start] = old[start].take();
            start += 1;
        }

        // Common suffix
        let mut end = old_len;
        let mut new_end = new_len;
        while end > start && new_end > start && old_keys[end - 1] == new_keys[new_end - 1] {
            end -= 1;
            new_end -= 1;
            placed[new_end] = old[end].take();
        }

        // Key to first new position in the window, chained through duplicates
        let mut new_indices: HashMap<&K, usize> = HashMap::with_capacity(new_end - start);
        let mut next_same: Vec<Option<usize>> = vec![None; new_end];
        for j in (start..new_end).rev() {
            let key = &new_keys[j];
            next_same[j] = new_indices.insert(key, j);
        }

        for i in start..end {
            let key = &old_keys[i];
            match new_indices.get(key).copied() {
                Some(j) => {
                    placed[j] = old[i].take();
                    match next_same[j] {
                        Some(next) => {
                            if let Some(first) = new_indices.get_mut(key) {
                                *first = next;
                            }
                        }
                        None => {
                            new_indices.remove(key);
                        }
                    }
                }
                None => {
                    if let Some(slot) = old[i].take() {
                        retired.slots.push(slot);
                    }
                }
            }
        }
    }

    let mut slots = Vec::with_capacity(new_len);
    let mut placed = placed.into_iter().enumerate();
    while let Some((j, slot)) = placed.next() {
        match slot {
            Some(slot) => {
                slot.index.set(j);
                slots.push(slot);
            }
            None => match create_slot(&items[j], j, map_fn) {
                Ok(slot) => slots.push(slot),
                Err(payload) => {
                    retired.slots.extend(slots);
                    retired.slots.extend(placed.by_ref().filter_map(|(_, slot)| slot));
                    return Err(Aborted { retired, payload });
                }
            },
        }
    }

    state.slots = slots;
    state.keys = new_keys;
    Ok(retired)
}

fn snapshot<K, U: Clone>(state: &MapState<K, U>) -> Vec<U> {
    match &state.fallback {
        Some(fallback) if state.slots.is_empty() => vec![fallback.value()],
        _ => state.slots.iter().map(|slot| slot.value.clone()).collect(),
    }
}

/// Map a reactive list, keeping each item's derived value for as long as an
/// equal item stays in the list.
///
/// `map_fn` runs untracked under a fresh root per item and receives the
/// item and a signal with its current position.
///
/// ```rust
/// use rivulet_core::list::map_array;
/// use rivulet_core::reactive::{create_root, Signal};
///
/// create_root(|_| {
///     let names = Signal::new(vec!["a", "b"]);
///     let upper = map_array(move || names.get(), |name: &&str, _| name.to_uppercase());
///     assert_eq!(upper.get(), vec!["A", "B"]);
///
///     names.set(vec!["b", "c"]);
///     assert_eq!(upper.get(), vec!["B", "C"]);
/// });
/// ```
pub fn map_array<T, U>(
    list: impl Fn() -> Vec<T> + 'static,
    map_fn: impl Fn(&T, ReadSignal<usize>) -> U + 'static,
) -> Memo<Vec<U>>
where
    T: Hash + Eq + Clone + 'static,
    U: Clone + 'static,
{
    map_array_keyed(list, T::clone, map_fn, MapOptions::default())
}

/// [`map_array`] with options, such as a fallback for the empty list.
pub fn map_array_with<T, U>(
    list: impl Fn() -> Vec<T> + 'static,
    map_fn: impl Fn(&T, ReadSignal<usize>) -> U + 'static,
    options: MapOptions<U>,
) -> Memo<Vec<U>>
where
    T: Hash + Eq + Clone + 'static,
    U: Clone + 'static,
{
    map_array_keyed(list, T::clone, map_fn, options)
}

/// Map a reactive list where item identity is given by `key_fn`.
///
/// An item whose key survives keeps its derived value even if the item
/// itself changed; read fields that may change through signals instead.
pub fn map_array_keyed<T, K, U>(
    list: impl Fn() -> Vec<T> + 'static,
    key_fn: impl Fn(&T) -> K + 'static,
    map_fn: impl Fn(&T, ReadSignal<usize>) -> U + 'static,
    options: MapOptions<U>,
) -> Memo<Vec<U>>
where
    T: 'static,
    K: Hash + Eq + 'static,
    U: Clone + 'static,
{
    let state = Rc::new(RefCell::new(MapState::new()));

    let teardown = Rc::clone(&state);
    on_cleanup(move || {
        let retired = {
            let mut state = teardown.borrow_mut();
            state.keys.clear();
            Retired {
                slots: std::mem::take(&mut state.slots),
                fallback: state.fallback.take(),
            }
        };
        retired.dispose();
    });

    Memo::with_equals(
        move |_| {
            let items = list();
            untrack(|| {
                let outcome = reconcile(&mut state.borrow_mut(), &items, &key_fn, &map_fn, &options);
                match outcome {
                    Ok(retired) => {
                        retired.dispose();
                        snapshot(&state.borrow())
                    }
                    Err(aborted) => {
                        aborted.retired.dispose();
                        panic::resume_unwind(aborted.payload)
                    }
                }
            })
        },
        // A fresh vector is always a change
        |_, _| false,
    )
}
