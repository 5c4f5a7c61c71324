//! Position-keyed list mapping.
//!
//! Slot `i` is created once for position `i` and lives for as long as the
//! list is at least `i + 1` long. A new item at that position is written to
//! the slot's item signal instead of creating a new slot.
//!
//! If `map_fn` panics for position `i`, slots `0..i` stay in place and the
//! next change picks up from there.

use std::any::Any;
use std::cell::RefCell;
use std::panic;
use std::rc::Rc;

use super::{catch_root, FallbackSlot, MapOptions};
use crate::reactive::{on_cleanup, untrack, Disposer, Memo, ReadSignal, Signal};

struct IndexSlot<T, U> {
    value: U,
    item: Signal<T>,
    disposer: Disposer,
}

struct IndexState<T, U> {
    slots: Vec<IndexSlot<T, U>>,
    fallback: Option<FallbackSlot<U>>,
}

fn dispose_all<T, U>(slots: Vec<IndexSlot<T, U>>, fallback: Option<FallbackSlot<U>>) {
    for slot in slots.into_iter().rev() {
        slot.disposer.dispose();
    }
    if let Some(fallback) = fallback {
        fallback.dispose();
    }
}

/// Map a reactive list by position.
///
/// `map_fn` runs untracked under a fresh root per position and receives a
/// signal with the item currently at that position, and the position.
///
/// ```rust
/// use rivulet_core::list::index_array;
/// use rivulet_core::reactive::{create_root, Memo, Signal};
///
/// create_root(|_| {
///     let scores = Signal::new(vec![1, 2]);
///     let labels = index_array(move || scores.get(), |score, i| {
///         Memo::new(move |_| format!("#{i}: {}", score.get()))
///     });
///
///     scores.set(vec![5, 2, 7]);
///     let text: Vec<String> = labels.get().iter().map(|m| m.get()).collect();
///     assert_eq!(text, vec!["#0: 5", "#1: 2", "#2: 7"]);
/// });
/// ```
pub fn index_array<T, U>(
    list: impl Fn() -> Vec<T> + 'static,
    map_fn: impl Fn(ReadSignal<T>, usize) -> U + 'static,
) -> Memo<Vec<U>>
where
    T: PartialEq + Clone + 'static,
    U: Clone + 'static,
{
    index_array_with(list, map_fn, MapOptions::default())
}

/// [`index_array`] with options, such as a fallback for the empty list.
pub fn index_array_with<T, U>(
    list: impl Fn() -> Vec<T> + 'static,
    map_fn: impl Fn(ReadSignal<T>, usize) -> U + 'static,
    options: MapOptions<U>,
) -> Memo<Vec<U>>
where
    T: PartialEq + Clone + 'static,
    U: Clone + 'static,
{
    let state = Rc::new(RefCell::new(IndexState {
        slots: Vec::new(),
        fallback: None,
    }));

    let teardown = Rc::clone(&state);
    on_cleanup(move || {
        let (slots, fallback) = {
            let mut state = teardown.borrow_mut();
            (std::mem::take(&mut state.slots), state.fallback.take())
        };
        dispose_all(slots, fallback);
    });

    Memo::with_equals(
        move |_| {
            let items = list();
            untrack(|| {
                let outcome = reconcile(&mut state.borrow_mut(), items, &map_fn, &options);
                let ((removed, fallback), failure) = match outcome {
                    Ok(retired) => (retired, None),
                    Err((retired, payload)) => (retired, Some(payload)),
                };
                dispose_all(removed, fallback);
                if let Some(payload) = failure {
                    panic::resume_unwind(payload);
                }

                let state = state.borrow();
                match &state.fallback {
                    Some(fallback) if state.slots.is_empty() => vec![fallback.value()],
                    _ => state.slots.iter().map(|slot| slot.value.clone()).collect(),
                }
            })
        },
        |_, _| false,
    )
}

type Retired<T, U> = (Vec<IndexSlot<T, U>>, Option<FallbackSlot<U>>);

fn reconcile<T, U>(
    state: &mut IndexState<T, U>,
    items: Vec<T>,
    map_fn: &dyn Fn(ReadSignal<T>, usize) -> U,
    options: &MapOptions<U>,
) -> Result<Retired<T, U>, (Retired<T, U>, Box<dyn Any + Send>)>
where
    T: PartialEq + Clone + 'static,
    U: Clone,
{
    if items.is_empty() {
        let removed = std::mem::take(&mut state.slots);
        if state.fallback.is_none() {
            match FallbackSlot::create(options) {
                Ok(fallback) => state.fallback = fallback,
                Err(payload) => return Err(((removed, None), payload)),
            }
        }
        return Ok((removed, None));
    }

    let fallback = state.fallback.take();
    let removed = if state.slots.len() > items.len() {
        state.slots.split_off(items.len())
    } else {
        Vec::new()
    };

    let kept = state.slots.len();
    for (slot, item) in state.slots.iter().zip(items.iter()) {
        slot.item.set(item.clone());
    }
    for (i, item) in items.into_iter().enumerate().skip(kept) {
        let created = catch_root(|disposer| {
            let item = Signal::new(item);
            IndexSlot {
                value: map_fn(item.split().0, i),
                item,
                disposer,
            }
        });
        match created {
            Ok(slot) => state.slots.push(slot),
            Err(payload) => return Err(((removed, fallback), payload)),
        }
    }
    Ok((removed, fallback))
}
