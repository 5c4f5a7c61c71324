//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.
//!
//! Every reactive value is one [`Node`] in a single arena: signals, memos,
//! effects and plain owners (roots, context providers) all share the same
//! layout. Fields that do not apply to a kind stay empty.

use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

use slotmap::new_key_type;
use smallvec::SmallVec;

use crate::error::ReactiveError;

new_key_type! {
    /// Unique identifier for a node in the dependency graph.
    ///
    /// Keys are generational: once a node is disposed its id never resolves
    /// again, even if the slot is reused.
    pub struct NodeId;
}

/// Identifier for a context key (see `create_context`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    /// Generate a new unique context ID.
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A source node (signal). Has observers, never sources.
    Signal,

    /// A lazy derived value. Has both sources and observers, and is only
    /// recomputed when something reads it while it is not clean.
    Memo,

    /// An eager pure computation. Queued ahead of effects in every flush.
    Computed,

    /// A side effect. Always queued when any of its sources change.
    Effect,

    /// A bare owner with no computation: roots and context scopes.
    Owner,
}

impl NodeKind {
    /// Whether nodes of this kind run a user function.
    pub fn is_computation(self) -> bool {
        matches!(self, NodeKind::Memo | NodeKind::Computed | NodeKind::Effect)
    }
}

/// Propagation state of a computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// The node's value is up-to-date.
    Clean,

    /// Some ancestor changed; the direct sources must be settled before we
    /// know whether this node has to run.
    Pending,

    /// A direct source changed value; the node must run.
    Stale,
}

/// One half of a bidirectional edge.
///
/// On a listener, `sources[i] = Edge { node: source, slot }` where `slot` is
/// the listener's index inside `source.observers`. On a source,
/// `observers[k] = Edge { node: listener, slot }` where `slot` is the index
/// inside `listener.sources`. Keeping both indices makes detaching O(1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub node: NodeId,
    pub slot: usize,
}

/// Type-erased storage for a signal or memo value.
pub(crate) trait ValueCell {
    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;

    /// Apply a value staged during a batch. Returns whether the committed
    /// value differs from the previous one.
    fn commit_pending(&self) -> bool {
        false
    }

    /// Drop a staged value without applying it.
    fn discard_pending(&self) {}
}

/// Type-erased user function of a memo, effect or computed node.
pub(crate) trait Computation {
    /// Run the function once. Returns whether the node's observable value
    /// changed.
    fn run(&self) -> bool;

    /// Whether a previous run left a usable value behind.
    fn has_value(&self) -> bool {
        true
    }
}

pub(crate) type ErrorHandler = Rc<dyn Fn(&ReactiveError)>;

/// A node in the dependency graph.
pub(crate) struct Node {
    pub kind: NodeKind,
    pub state: NodeState,

    /// Set while the node's function is on the stack.
    pub running: bool,

    pub cell: Option<Rc<dyn ValueCell>>,
    pub compute: Option<Rc<dyn Computation>>,

    /// Nodes this node read during its latest run, in read order.
    pub sources: SmallVec<[Edge; 4]>,

    /// Nodes that read this node. Order carries no meaning.
    pub observers: SmallVec<[Edge; 4]>,

    pub owner: Option<NodeId>,
    pub owned: Vec<NodeId>,
    pub cleanups: Vec<Box<dyn FnOnce()>>,
    pub contexts: Option<HashMap<ContextId, Rc<dyn Any>>>,
    pub error_handlers: SmallVec<[ErrorHandler; 1]>,
}

impl Node {
    /// Create a new node with the given kind.
    pub fn new(kind: NodeKind, owner: Option<NodeId>) -> Self {
        Self {
            kind,
            state: match kind {
                NodeKind::Signal | NodeKind::Owner => NodeState::Clean,
                // Start stale so the first read or flush runs the function
                NodeKind::Memo | NodeKind::Computed | NodeKind::Effect => NodeState::Stale,
            },
            running: false,
            cell: None,
            compute: None,
            sources: SmallVec::new(),
            observers: SmallVec::new(),
            owner,
            owned: Vec::new(),
            cleanups: Vec::new(),
            contexts: None,
            error_handlers: SmallVec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.state == NodeState::Clean
    }

    pub fn has_source(&self, id: NodeId) -> bool {
        self.sources.iter().any(|edge| edge.node == id)
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("running", &self.running)
            .field("sources", &self.sources.len())
            .field("observers", &self.observers.len())
            .field("owned", &self.owned.len())
            .field("cleanups", &self.cleanups.len())
            .finish()
    }
}
