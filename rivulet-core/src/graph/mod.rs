//! Dependency Graph
//!
//! This module implements the computational dependency graph that tracks
//! relationships between reactive values and computations.
//!
//! # Overview
//!
//! - Nodes represent reactive values (signals) or computations (memos,
//!   computed nodes, effects), plus bare owners that only group children.
//! - Edges represent reads: if A read B during its latest run, B lists A as
//!   an observer and A lists B as a source.
//! - A second, tree-shaped relation records ownership: every node is owned
//!   by the owner that was active when it was created.
//!
//! When a signal changes, the [`Scheduler`](scheduler::Scheduler) walks the
//! observers to mark them and queue the eager ones. The runtime then settles
//! the queue top-down.
//!
//! # Design Decisions
//!
//! 1. All nodes share one generational arena, indexed by [`NodeId`]. Handles
//!    held by user code are plain ids, so a disposed node simply stops
//!    resolving.
//!
//! 2. Sources and observers are growable vectors with parallel slot indices
//!    for O(1) detach.
//!
//! 3. Nothing in this module runs user code.

mod arena;
mod node;
mod scheduler;

pub use node::{ContextId, NodeId, NodeKind, NodeState};

pub(crate) use arena::Graph;
pub(crate) use node::{Computation, Node, ValueCell};
pub(crate) use scheduler::Scheduler;
