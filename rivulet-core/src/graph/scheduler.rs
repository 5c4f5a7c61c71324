//! Update Scheduler
//!
//! The scheduler turns committed writes into a set of queued computations.
//! It owns the bookkeeping of a batch; the runtime owns the run phase.
//!
//! # Algorithm
//!
//! 1. Writes issued while batching are staged on the signal and the signal's
//!    id is queued once, in first-write order.
//! 2. At flush, staged values are committed. For every signal whose value
//!    actually changed, its direct observers are marked `Stale` and every
//!    clean node further downstream is marked `Pending`.
//! 3. Only a transition out of `Clean` enqueues a node: computed nodes go to
//!    the update queue, effects to the effect queue, memos to neither (they
//!    are settled on demand by whoever reads them).
//!
//! Because a node that is not clean already had its whole downstream marked
//! when it left `Clean`, each node is queued at most once per wave no matter
//! how many paths lead to it.

use std::collections::VecDeque;

use indexmap::IndexSet;
use smallvec::SmallVec;

use super::arena::Graph;
use super::node::{NodeId, NodeKind, NodeState};
use crate::error::{ReactiveError, Result};

/// Queues and clock for the current batch.
pub(crate) struct Scheduler {
    /// Logical clock, advanced once per flush wave.
    clock: u64,

    batching: bool,

    /// Signals with a staged value, in first-write order.
    pending_writes: IndexSet<NodeId>,

    /// Eager pure computations, run before effects.
    updates: VecDeque<NodeId>,

    effects: VecDeque<NodeId>,

    /// Queue entries produced since the outermost batch started.
    queued: usize,

    limit: usize,
}

impl Scheduler {
    pub fn new(limit: usize) -> Self {
        Self {
            clock: 0,
            batching: false,
            pending_writes: IndexSet::new(),
            updates: VecDeque::new(),
            effects: VecDeque::new(),
            queued: 0,
            limit,
        }
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    pub fn is_batching(&self) -> bool {
        self.batching
    }

    /// Start the outermost batch.
    pub fn begin(&mut self) {
        self.batching = true;
        self.queued = 0;
    }

    /// Leave the outermost batch.
    pub fn end(&mut self) {
        self.batching = false;
        self.queued = 0;
    }

    /// Advance the clock for a new wave.
    pub fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Queue a signal whose value was staged. Returns false if it was
    /// already queued in this batch.
    pub fn stage_write(&mut self, signal: NodeId) -> bool {
        self.pending_writes.insert(signal)
    }

    pub fn take_pending_writes(&mut self) -> IndexSet<NodeId> {
        std::mem::take(&mut self.pending_writes)
    }

    /// Queue a computation that was just created.
    pub fn schedule(&mut self, id: NodeId, kind: NodeKind) -> Result<()> {
        match kind {
            NodeKind::Computed => self.updates.push_back(id),
            NodeKind::Effect => self.effects.push_back(id),
            _ => {}
        }
        self.count()
    }

    pub fn next_update(&mut self) -> Option<NodeId> {
        self.updates.pop_front()
    }

    pub fn next_effect(&mut self) -> Option<NodeId> {
        self.effects.pop_front()
    }

    pub fn is_idle(&self) -> bool {
        self.pending_writes.is_empty() && self.updates.is_empty() && self.effects.is_empty()
    }

    /// Mark phase for a node whose value changed.
    pub fn mark_stale(&mut self, graph: &mut Graph, changed: NodeId) -> Result<()> {
        for observer in graph.observers(changed) {
            let Some(node) = graph.get_mut(observer) else {
                continue;
            };
            let was_clean = node.is_clean();
            node.state = NodeState::Stale;
            if was_clean {
                let kind = node.kind;
                self.schedule(observer, kind)?;
                self.mark_downstream(graph, observer)?;
            }
        }
        Ok(())
    }

    /// Mark every clean node below `start` as pending.
    fn mark_downstream(&mut self, graph: &mut Graph, start: NodeId) -> Result<()> {
        let mut stack: SmallVec<[NodeId; 16]> = SmallVec::new();
        stack.push(start);

        while let Some(id) = stack.pop() {
            // Reverse so observers are visited in link order
            for observer in graph.observers(id).into_iter().rev() {
                let Some(node) = graph.get_mut(observer) else {
                    continue;
                };
                if !node.is_clean() {
                    continue;
                }
                node.state = NodeState::Pending;
                let kind = node.kind;
                self.schedule(observer, kind)?;
                stack.push(observer);
            }
        }
        Ok(())
    }

    fn count(&mut self) -> Result<()> {
        self.queued += 1;
        if self.queued > self.limit {
            let queued = self.queued;
            tracing::error!(queued, limit = self.limit, "update queue exceeded bound; aborting batch");
            return Err(ReactiveError::RunawayPropagation {
                queued,
                limit: self.limit,
            });
        }
        Ok(())
    }
}
