//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos, and
//! effects. It owns the dependency graph, the scheduler and the current
//! owner/listener, and it runs the update loop when signals change.
//!
//! # How It Works
//!
//! 1. Every write happens inside a batch. A write outside [`batch`] opens a
//!    batch of its own that contains just that write.
//!
//! 2. When the outermost batch ends, the runtime flushes in waves. Each wave
//!    advances the clock, commits every staged write (once, in first-write
//!    order), lets the scheduler mark and queue the affected nodes, then
//!    drains the update queue and the effect queue.
//!
//! 3. A queued node is settled top-down: a `Pending` node first settles each
//!    memo it read, in read order, and only runs if one of them actually
//!    changed value. A `Stale` node runs directly.
//!
//! 4. Writes made by effects during a wave are staged and committed by the
//!    next wave of the same batch.
//!
//! # Thread Model
//!
//! The runtime is a thread-local. Handles are plain ids, so they are only
//! meaningful on the thread that created them. No user code ever runs while
//! the runtime is borrowed.

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use smallvec::SmallVec;

use super::context::ReactiveContext;
use crate::config::RuntimeConfig;
use crate::error::{ReactiveError, Result};
use crate::graph::{Computation, Graph, Node, NodeId, NodeKind, NodeState, Scheduler, ValueCell};

thread_local! {
    static RUNTIME: RefCell<Runtime> = RefCell::new(Runtime::new());
}

/// Per-thread reactive state.
pub(crate) struct Runtime {
    pub(crate) graph: Graph,
    pub(crate) scheduler: Scheduler,
    pub(crate) owner: Option<NodeId>,
    pub(crate) listener: Option<NodeId>,

    /// Number of computations currently on the stack.
    pub(crate) depth: usize,

    pub(crate) config: RuntimeConfig,
}

impl Runtime {
    fn new() -> Self {
        let config = RuntimeConfig::default();
        Self {
            graph: Graph::new(),
            scheduler: Scheduler::new(config.max_updates_per_batch),
            owner: None,
            listener: None,
            depth: 0,
            config,
        }
    }
}

/// Borrow the thread's runtime. `f` must not call user code.
pub(crate) fn with_runtime<R>(f: impl FnOnce(&mut Runtime) -> R) -> R {
    RUNTIME.with(|rt| f(&mut rt.borrow_mut()))
}

/// Install a configuration for the current thread.
pub fn configure(config: RuntimeConfig) {
    with_runtime(|rt| {
        rt.scheduler.set_limit(config.max_updates_per_batch);
        rt.config = config;
    });
}

/// The configuration active on the current thread.
pub fn current_config() -> RuntimeConfig {
    with_runtime(|rt| rt.config.clone())
}

/// Number of live nodes on the current thread.
///
/// Disposal removes nodes, so this is handy for spotting leaks in tests.
pub fn node_count() -> usize {
    with_runtime(|rt| rt.graph.len())
}

/// Run `f` as one batch: writes inside it are staged and propagated together
/// when the outermost batch ends.
///
/// Unwinds with the error if propagation fails; see [`try_batch`].
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    try_batch(f).unwrap_or_else(|err| throw(err))
}

/// Like [`batch`], returning propagation errors instead of unwinding.
///
/// Nested calls simply join the outer batch.
pub fn try_batch<R>(f: impl FnOnce() -> R) -> Result<R> {
    run_batch(f)
}

/// Raise `err` from a non-`Result` entry point.
///
/// Inside a computation the error itself becomes the unwind payload so the
/// enclosing evaluation recovers it intact. At top level it panics with the
/// error message.
pub(crate) fn throw(err: ReactiveError) -> ! {
    if with_runtime(|rt| rt.depth > 0) {
        panic::resume_unwind(Box::new(err));
    }
    panic!("{err}");
}

/// Insert a node under the current owner.
pub(crate) fn create_node(
    kind: NodeKind,
    cell: Option<Rc<dyn ValueCell>>,
    compute: Option<Rc<dyn Computation>>,
) -> NodeId {
    with_runtime(|rt| {
        let owner = rt.owner.filter(|owner| rt.graph.contains(*owner));
        if owner.is_none() && kind.is_computation() && rt.config.warn_unowned {
            tracing::warn!(
                ?kind,
                "computation created outside of a root; it will never be disposed"
            );
        }

        let mut node = Node::new(kind, owner);
        node.cell = cell;
        node.compute = compute;
        rt.graph.insert(node, true)
    })
}

/// Queue a freshly created computed node or effect for its first run.
pub(crate) fn schedule_new(id: NodeId) -> Result<()> {
    run_batch(|| {
        with_runtime(|rt| match rt.graph.kind(id) {
            Some(kind) => rt.scheduler.schedule(id, kind),
            None => Ok(()),
        })
    })?
}

pub(crate) fn run_batch<R>(f: impl FnOnce() -> R) -> Result<R> {
    if with_runtime(|rt| rt.scheduler.is_batching()) {
        return Ok(f());
    }

    with_runtime(|rt| rt.scheduler.begin());
    tracing::trace!("batch started");
    let guard = BatchGuard;
    let value = f();
    let flushed = flush();
    drop(guard);
    flushed.map(|()| value)
}

/// Ends the outermost batch, also when it unwinds.
struct BatchGuard;

impl Drop for BatchGuard {
    fn drop(&mut self) {
        // Anything still staged here belongs to an aborted flush
        let leftovers: SmallVec<[Rc<dyn ValueCell>; 4]> = with_runtime(|rt| {
            rt.scheduler.end();
            let writes = rt.scheduler.take_pending_writes();
            writes
                .into_iter()
                .filter_map(|id| rt.graph.get(id).and_then(|node| node.cell.clone()))
                .collect()
        });
        for cell in leftovers {
            cell.discard_pending();
        }
    }
}

/// Drain staged writes and queued computations until nothing is left.
fn flush() -> Result<()> {
    loop {
        let writes: SmallVec<[(NodeId, Rc<dyn ValueCell>); 8]> = with_runtime(|rt| {
            let clock = rt.scheduler.tick();
            tracing::trace!(clock, "flush wave");
            rt.scheduler
                .take_pending_writes()
                .into_iter()
                .filter_map(|id| rt.graph.get(id).and_then(|node| node.cell.clone()).map(|c| (id, c)))
                .collect()
        });

        // Commit every staged value before any computation runs
        let changed: SmallVec<[NodeId; 8]> = writes
            .into_iter()
            .filter(|(_, cell)| cell.commit_pending())
            .map(|(id, _)| id)
            .collect();

        with_runtime(|rt| {
            changed
                .iter()
                .try_for_each(|id| rt.scheduler.mark_stale(&mut rt.graph, *id))
        })?;

        loop {
            let next = with_runtime(|rt| {
                rt.scheduler
                    .next_update()
                    .or_else(|| rt.scheduler.next_effect())
            });
            match next {
                Some(id) => update_if_necessary(id)?,
                None => break,
            }
        }

        if with_runtime(|rt| rt.scheduler.is_idle()) {
            return Ok(());
        }
    }
}

/// Bring `id` up to date, settling the memos it read first.
pub(crate) fn update_if_necessary(id: NodeId) -> Result<()> {
    let Some((state, running)) =
        with_runtime(|rt| rt.graph.get(id).map(|node| (node.state, node.running)))
    else {
        // Disposed after it was queued
        return Ok(());
    };

    if state == NodeState::Clean {
        return Ok(());
    }
    if running {
        return Err(ReactiveError::CircularDependency { node: id });
    }

    if state == NodeState::Pending {
        let sources = with_runtime(|rt| rt.graph.sources(id));
        for source in sources {
            if with_runtime(|rt| rt.graph.kind(source)) == Some(NodeKind::Memo) {
                update_if_necessary(source)?;
            }
            match with_runtime(|rt| rt.graph.state(id)) {
                None => return Ok(()),
                Some(NodeState::Stale) => break,
                Some(_) => {}
            }
        }
    }

    let state = with_runtime(|rt| {
        rt.graph.get_mut(id).map(|node| {
            if node.state == NodeState::Pending {
                // Every source settled without changing
                node.state = NodeState::Clean;
            }
            node.state
        })
    });

    match state {
        Some(NodeState::Stale) => evaluate(id),
        _ => Ok(()),
    }
}

/// Run a computation's function, rebuilding its sources and owned subtree.
fn evaluate(id: NodeId) -> Result<()> {
    clean_node(id);

    let Some((compute, clock)) = with_runtime(|rt| {
        let node = rt.graph.get_mut(id)?;
        let compute = node.compute.clone()?;
        node.running = true;
        rt.depth += 1;
        Some((compute, rt.scheduler.clock()))
    }) else {
        return Ok(());
    };

    tracing::trace!(?id, clock, "evaluating");
    let outcome = {
        let _ctx = ReactiveContext::enter(Some(id), Some(id));
        panic::catch_unwind(AssertUnwindSafe(|| compute.run()))
    };
    with_runtime(|rt| {
        rt.depth -= 1;
        let Some(node) = rt.graph.get_mut(id) else {
            return Ok(());
        };
        node.running = false;

        let changed = match &outcome {
            Ok(changed) => {
                node.state = NodeState::Clean;
                *changed && !node.observers.is_empty()
            }
            Err(_) => {
                // Keep serving the last good value. Without one the node is
                // still clean so a source write reaches its readers, and the
                // next read retries it.
                node.state = NodeState::Clean;
                false
            }
        };

        if changed {
            rt.scheduler.mark_stale(&mut rt.graph, id)?;
        }
        Ok(())
    })?;

    match outcome {
        Ok(_) => Ok(()),
        Err(payload) => {
            let err = ReactiveError::from_panic(payload);
            if err.is_integrity() {
                return Err(err);
            }
            handle_error(id, err)
        }
    }
}

/// Offer a user error to the nearest `on_error` handlers.
fn handle_error(id: NodeId, err: ReactiveError) -> Result<()> {
    let handlers = with_runtime(|rt| rt.graph.lookup_error_handlers(id));
    if handlers.is_empty() {
        return Err(err);
    }

    tracing::debug!(?id, error = %err, "routing computation error to on_error handler");
    for handler in handlers {
        handler(&err);
    }
    Ok(())
}

/// Detach `id` from its sources, dispose everything it owns and run its
/// cleanups, leaving the node itself in the arena.
pub(crate) fn clean_node(id: NodeId) {
    let Some((owned, cleanups)) = with_runtime(|rt| {
        rt.graph.unlink_sources(id);
        let node = rt.graph.get_mut(id)?;
        node.error_handlers.clear();
        Some((std::mem::take(&mut node.owned), std::mem::take(&mut node.cleanups)))
    }) else {
        return;
    };

    if owned.is_empty() && cleanups.is_empty() {
        return;
    }

    // Cleanups belong to nobody: anything they register is not adopted
    let _ctx = ReactiveContext::enter(None, None);
    for child in owned.into_iter().rev() {
        dispose_node(child);
    }
    for cleanup in cleanups.into_iter().rev() {
        cleanup();
    }
}

/// Clean `id` and remove it from the arena.
pub(crate) fn dispose_node(id: NodeId) {
    if let Some(NodeKind::Owner) = with_runtime(|rt| rt.graph.kind(id)) {
        tracing::debug!(?id, "disposing owner");
    }

    clean_node(id);

    let removed = with_runtime(|rt| {
        rt.graph.unlink_observers(id);
        rt.graph.detach_from_owner(id);
        rt.graph.remove(id)
    });
    // Closures captured by the node drop here, outside the runtime borrow
    drop(removed);
}

/// Read a signal or memo, settling it first and recording a dependency on
/// the current listener when `track` is set.
pub(crate) fn read_node(id: NodeId, track: bool) -> Result<Rc<dyn ValueCell>> {
    let (kind, state, running, has_value) = with_runtime(|rt| {
        rt.graph.get(id).map(|node| {
            let has_value = node.compute.as_ref().map_or(true, |compute| compute.has_value());
            (node.kind, node.state, node.running, has_value)
        })
    })
    .ok_or(ReactiveError::Disposed { node: id })?;

    let mut settled = Ok(());
    if kind == NodeKind::Memo {
        if running {
            return Err(ReactiveError::CircularDependency { node: id });
        }
        if state == NodeState::Clean && !has_value {
            // An earlier run failed before producing anything
            with_runtime(|rt| {
                if let Some(node) = rt.graph.get_mut(id) {
                    node.state = NodeState::Stale;
                }
            });
        }
        if state != NodeState::Clean || !has_value {
            settled = run_batch(|| update_if_necessary(id)).and_then(|settled| settled);
        }
    }

    // Link even when settling failed, so the reader hears about the retry
    let cell = with_runtime(|rt| {
        if track {
            if let Some(listener) = rt.listener {
                rt.graph.link(id, listener);
            }
        }
        rt.graph
            .get(id)
            .and_then(|node| node.cell.clone())
            .ok_or(ReactiveError::Disposed { node: id })
    });
    settled?;
    cell
}

/// Whether `id` still resolves.
pub(crate) fn is_alive(id: NodeId) -> bool {
    with_runtime(|rt| rt.graph.contains(id))
}

/// The write conflict policy of the current thread.
pub(crate) fn write_conflict_policy() -> crate::config::WriteConflictPolicy {
    with_runtime(|rt| rt.config.write_conflicts)
}

/// Queue `signal` for commit at the end of the current batch.
pub(crate) fn stage_write(signal: NodeId) {
    with_runtime(|rt| {
        rt.scheduler.stage_write(signal);
    });
}
