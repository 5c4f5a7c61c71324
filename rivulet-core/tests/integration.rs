//! Integration Tests for Reactive System
//!
//! These tests verify that signals, memos, effects, owners and the list
//! mappers work together correctly.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rivulet_core::list::map_array;
use rivulet_core::reactive::{
    batch, configure, create_context, create_root, create_signal, node_count, on_cleanup,
    on_error, untrack, Effect, Memo, Signal,
};
use rivulet_core::{ReactiveError, RuntimeConfig, WriteConflictPolicy};

fn counter() -> (Rc<Cell<usize>>, Rc<Cell<usize>>) {
    let count = Rc::new(Cell::new(0));
    (count.clone(), count)
}

fn bump(count: &Cell<usize>) {
    count.set(count.get() + 1);
}

/// A diamond settles both branches before the join runs, and the join runs
/// once.
#[test]
fn diamond_is_glitch_free() {
    let a = Signal::new(1);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let (b_runs, b_count) = counter();
    let (c_runs, c_count) = counter();

    create_root(|_| {
        let b = Memo::new(move |_| {
            bump(&b_count);
            a.get() * 2
        });
        let c = Memo::new(move |_| {
            bump(&c_count);
            a.get() + 10
        });
        let log = seen.clone();
        Effect::new(move |_| log.borrow_mut().push((b.get(), c.get())));
    });

    a.set(2);

    assert_eq!(*seen.borrow(), vec![(2, 11), (4, 12)]);
    assert_eq!(b_runs.get(), 2);
    assert_eq!(c_runs.get(), 2);
}

/// Writing an equal value does no graph work at all.
#[test]
fn equal_write_is_a_no_op() {
    let source = Signal::new(5);
    let (runs, count) = counter();

    create_root(|_| {
        Effect::new(move |_| {
            source.get();
            bump(&count);
        });
    });

    source.set(5);
    batch(|| source.set(5));
    assert_eq!(runs.get(), 1);
}

/// A memo that recomputes to an equal value stops propagation.
#[test]
fn unchanged_memo_stops_propagation() {
    let source = Signal::new(1);
    let (runs, count) = counter();

    create_root(|_| {
        let is_odd = Memo::new(move |_| source.get() % 2 == 1);
        Effect::new(move |_| {
            is_odd.get();
            bump(&count);
        });
    });

    source.set(3);
    source.set(5);
    assert_eq!(runs.get(), 1);

    source.set(6);
    assert_eq!(runs.get(), 2);
}

/// Several writes in one batch re-run each dependent once with every new
/// value.
#[test]
fn batch_runs_each_computation_once() {
    let first = Signal::new("ada");
    let last = Signal::new("lovelace");
    let seen = Rc::new(RefCell::new(Vec::new()));

    create_root(|_| {
        let full = Memo::new(move |_| format!("{} {}", first.get(), last.get()));
        let log = seen.clone();
        Effect::new(move |_| log.borrow_mut().push(full.get()));
    });

    batch(|| {
        first.set("grace");
        last.set("hopper");
        // Reads inside the batch still see the committed values
        assert_eq!(first.get(), "ada");
    });

    assert_eq!(*seen.borrow(), vec!["ada lovelace", "grace hopper"]);
}

/// A memo nobody reads is not recomputed after its source changes.
#[test]
fn unread_memo_is_never_recomputed() {
    let source = Signal::new(1);
    let (runs, count) = counter();

    let memo = create_root(|_| {
        Memo::new(move |_| {
            bump(&count);
            source.get() + 1
        })
    });

    assert_eq!(memo.get(), 2);
    source.set(10);
    source.set(20);
    assert_eq!(runs.get(), 1);

    assert_eq!(memo.get(), 21);
    assert_eq!(runs.get(), 2);
}

/// Disposing a root detaches every computation and runs cleanups children
/// first.
#[test]
fn disposal_cascades_child_before_parent() {
    let source = Signal::new(0);
    let order = Rc::new(RefCell::new(Vec::new()));
    let before = node_count();

    let dispose = create_root(|dispose| {
        let log = order.clone();
        Effect::new(move |_| {
            source.get();
            let inner_log = log.clone();
            Effect::new(move |_| {
                source.get();
                let log = inner_log.clone();
                on_cleanup(move || log.borrow_mut().push("inner"));
            });
            let log = log.clone();
            on_cleanup(move || log.borrow_mut().push("outer"));
        });
        let log = order.clone();
        on_cleanup(move || log.borrow_mut().push("root"));
        dispose
    });
    assert_eq!(source.observer_count(), 2);

    dispose.dispose();

    assert_eq!(*order.borrow(), vec!["inner", "outer", "root"]);
    assert_eq!(source.observer_count(), 0);
    assert_eq!(node_count(), before);
}

/// Re-running a computation disposes what it created last time.
#[test]
fn rerun_rebuilds_owned_subtree() {
    let source = Signal::new(0);
    let (cleanups, count) = counter();

    create_root(|_| {
        Effect::new(move |_| {
            source.get();
            let count = count.clone();
            Effect::new(move |_| {
                let count = count.clone();
                on_cleanup(move || bump(&count));
            });
        });
    });

    source.set(1);
    source.set(2);
    assert_eq!(cleanups.get(), 2);
}

/// Two memos reading each other fail with a circular dependency instead of
/// recursing forever.
#[test]
fn mutual_memos_are_circular() {
    let slot: Rc<Cell<Option<Memo<i32>>>> = Rc::new(Cell::new(None));

    let (a, b) = create_root(|_| {
        let other = slot.clone();
        let a = Memo::new(move |_| other.get().map_or(0, |b| b.get()) + 1);
        let b = Memo::new(move |_| a.get() + 1);
        (a, b)
    });
    slot.set(Some(b));

    let err = a.try_get().unwrap_err();
    assert!(matches!(err, ReactiveError::CircularDependency { .. }));
    assert!(err.is_integrity());
}

/// The mapper reuses surviving items and only creates and disposes the
/// difference.
#[test]
fn list_rotation_creates_and_disposes_minimum() {
    let list = Signal::new(vec!["a", "b", "c", "d"]);
    let created = Rc::new(RefCell::new(Vec::new()));
    let disposed = Rc::new(RefCell::new(Vec::new()));

    let mapped = create_root(|_| {
        let (created, disposed) = (created.clone(), disposed.clone());
        map_array(move || list.get(), move |item: &&str, _| {
            let item = *item;
            created.borrow_mut().push(item);
            let disposed = disposed.clone();
            on_cleanup(move || disposed.borrow_mut().push(item));
            item.to_uppercase()
        })
    });
    assert_eq!(mapped.get(), vec!["A", "B", "C", "D"]);
    created.borrow_mut().clear();

    list.set(vec!["b", "c", "a", "e"]);

    assert_eq!(mapped.get(), vec!["B", "C", "A", "E"]);
    assert_eq!(*created.borrow(), vec!["e"]);
    assert_eq!(*disposed.borrow(), vec!["d"]);
}

/// Dependencies found at run time are followed through both branches of a
/// conditional, and each memo on the taken path runs once per write.
#[test]
fn conditional_memos_settle_in_order() {
    let a = Signal::new(0);
    let runs: Rc<RefCell<Vec<&str>>> = Rc::new(RefCell::new(Vec::new()));
    let count_of = |name: &str| runs.borrow().iter().filter(|run| **run == name).count();

    let c = create_root(|_| {
        let log = runs.clone();
        let b = Memo::new(move |_| {
            log.borrow_mut().push("b");
            a.get() + 1
        });
        let log = runs.clone();
        let d = Memo::new(move |_| {
            log.borrow_mut().push("d");
            a.get()
        });
        let log = runs.clone();
        let e = Memo::new(move |_| {
            log.borrow_mut().push("e");
            d.get() + 10
        });
        let log = runs.clone();
        Memo::new(move |_| {
            log.borrow_mut().push("c");
            let b = b.get();
            if b != 0 {
                b
            } else {
                e.get()
            }
        })
    });
    assert_eq!(c.get(), 1);
    assert_eq!(*runs.borrow(), vec!["c", "b"]);

    runs.borrow_mut().clear();
    a.set(-1);
    assert_eq!(c.get(), 9);
    assert_eq!(*runs.borrow(), vec!["b", "c", "e", "d"]);

    runs.borrow_mut().clear();
    a.set(0);
    assert_eq!(c.get(), 1);
    // `e` fell off the taken path, so neither it nor `d` is recomputed
    assert_eq!(*runs.borrow(), vec!["b", "c"]);
    assert_eq!(count_of("e"), 0);
}

/// A memo that fails before producing any value recovers, together with its
/// readers, once its source changes.
#[test]
fn memo_without_value_recovers_on_source_change() {
    let source = Signal::new(0);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let (errors, count) = counter();

    create_root(|_| {
        on_error(move |_| bump(&count));
        let checked = Memo::new(move |_| {
            let value = source.get();
            if value == 0 {
                panic!("zero is not ready");
            }
            value
        });
        let log = seen.clone();
        Effect::new(move |_| log.borrow_mut().push(checked.get()));
    });
    // Once for the memo, once for the effect that could not read it
    assert_eq!(errors.get(), 2);
    assert!(seen.borrow().is_empty());

    source.set(1);
    source.set(2);
    assert_eq!(*seen.borrow(), vec![1, 2]);
    assert_eq!(errors.get(), 2);
}

/// An aborted flush drops the writes it had staged, but effects already in
/// the queue run at the next flush.
#[test]
fn aborted_flush_keeps_queued_effects() {
    let trigger = Signal::new(0);
    let other = Signal::new(0);
    let seen = Rc::new(RefCell::new(Vec::new()));

    create_root(|_| {
        Effect::new(move |_| {
            if trigger.get() == 1 {
                other.set(100);
                panic!("boom");
            }
        });
        let log = seen.clone();
        Effect::new(move |_| log.borrow_mut().push((trigger.get(), other.get())));
    });

    let err = trigger.try_set(1).unwrap_err();
    assert_eq!(
        err,
        ReactiveError::ComputationPanicked {
            message: "boom".to_string()
        }
    );
    assert_eq!(*seen.borrow(), vec![(0, 0)]);
    assert_eq!(other.get(), 0);

    batch(|| ());
    assert_eq!(*seen.borrow(), vec![(0, 0), (1, 0)]);
}

fn ping_pong(limit: usize) -> (Signal<u64>, Signal<u64>) {
    configure(RuntimeConfig::default().with_max_updates(limit));

    let a = Signal::new(0u64);
    let b = Signal::new(0u64);
    create_root(|_| {
        Effect::new(move |_| {
            let v = a.get();
            if v > 0 {
                b.set(v + 1);
            }
        });
        Effect::new(move |_| {
            let v = b.get();
            if v > 0 {
                a.set(v + 1);
            }
        });
    });
    (a, b)
}

/// Effects that keep re-triggering each other trip the runaway bound.
#[test]
fn runaway_propagation_is_rejected() {
    let (a, _) = ping_pong(50);

    let err = a.try_set(1).unwrap_err();
    assert!(matches!(err, ReactiveError::RunawayPropagation { limit: 50, .. }));
    configure(RuntimeConfig::default());
}

#[test]
#[should_panic(expected = "potential infinite update loop")]
fn runaway_propagation_panics_from_set() {
    let (a, _) = ping_pong(20);
    a.set(1);
}

/// A panicking computation is offered to the nearest `on_error` handler.
#[test]
fn on_error_intercepts_user_errors() {
    let source = Signal::new(1);
    let errors = Rc::new(RefCell::new(Vec::new()));

    create_root(|_| {
        let log = errors.clone();
        on_error(move |err| log.borrow_mut().push(err.clone()));
        Effect::new(move |_| {
            if source.get() == 3 {
                panic!("three is not allowed");
            }
        });
    });

    source.set(2);
    assert!(errors.borrow().is_empty());

    source.set(3);
    assert_eq!(
        *errors.borrow(),
        vec![ReactiveError::ComputationPanicked {
            message: "three is not allowed".to_string()
        }]
    );

    // The effect keeps its subscription and recovers
    source.set(4);
    assert_eq!(errors.borrow().len(), 1);
}

/// Without a handler the error reaches the writer.
#[test]
fn unhandled_error_reaches_the_writer() {
    let source = Signal::new(0);

    create_root(|_| {
        Effect::new(move |_| {
            if source.get() < 0 {
                panic!("negative");
            }
        });
    });

    let err = source.try_set(-1).unwrap_err();
    assert_eq!(
        err,
        ReactiveError::ComputationPanicked {
            message: "negative".to_string()
        }
    );
}

/// Conflicting writes in one batch are rejected when configured to.
#[test]
fn conflicting_writes_under_reject_policy() {
    configure(RuntimeConfig::default().with_write_conflicts(WriteConflictPolicy::Reject));
    let (read, write) = create_signal(1);

    let result = rivulet_core::reactive::try_batch(|| {
        write.set(2);
        write.try_set(3)
    });

    assert!(matches!(
        result,
        Ok(Err(ReactiveError::ConflictingWrite { .. }))
    ));
    assert_eq!(read.get(), 2);
    configure(RuntimeConfig::default());
}

/// Context values flow down the owner chain.
#[test]
fn context_is_visible_to_descendants() {
    let locale = create_context("en");
    let seen = Rc::new(RefCell::new(Vec::new()));
    let trigger = Signal::new(0);

    create_root(|_| {
        let ctx = locale.clone();
        let log = seen.clone();
        locale.provide("fr", move || {
            Effect::new(move |_| {
                trigger.get();
                log.borrow_mut().push(ctx.use_context());
            });
        });
    });
    trigger.set(1);

    assert_eq!(*seen.borrow(), vec!["fr", "fr"]);
}

/// Reads inside `untrack` create no dependencies.
#[test]
fn untracked_reads_do_not_subscribe() {
    let tracked = Signal::new(0);
    let ignored = Signal::new(0);
    let (runs, count) = counter();

    create_root(|_| {
        Effect::new(move |_| {
            tracked.get();
            untrack(|| ignored.get());
            bump(&count);
        });
    });

    ignored.set(1);
    assert_eq!(runs.get(), 1);
    tracked.set(1);
    assert_eq!(runs.get(), 2);
}

/// Writes made by effects are committed in a later wave of the same batch.
#[test]
fn effect_writes_propagate_in_next_wave() {
    let celsius = Signal::new(0);
    let fahrenheit = Signal::new(32);
    let seen = Rc::new(RefCell::new(Vec::new()));

    create_root(|_| {
        Effect::new(move |_| fahrenheit.set(celsius.get() * 9 / 5 + 32));
        let log = seen.clone();
        Effect::new(move |_| log.borrow_mut().push(fahrenheit.get()));
    });

    celsius.set(100);
    assert_eq!(*seen.borrow(), vec![32, 212]);
}
