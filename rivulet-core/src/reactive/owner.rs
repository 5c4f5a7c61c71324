//! Ownership
//!
//! Every computation is owned by the owner that was current when it was
//! created, and disposing an owner tears down everything below it. Roots
//! are the top of this tree: they are created explicitly and live until
//! their [`Disposer`] is called.

use super::context::{current_owner, ReactiveContext};
use super::runtime::{dispose_node, run_batch, throw, with_runtime};
use crate::error::{ReactiveError, Result};
use crate::graph::{Node, NodeId, NodeKind};

/// A captured position in the ownership tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    id: NodeId,
}

impl Owner {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn is_disposed(&self) -> bool {
        !with_runtime(|rt| rt.graph.contains(self.id))
    }
}

/// Tears down a root created by [`create_root`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disposer {
    root: NodeId,
}

impl Disposer {
    /// The root this disposer tears down.
    pub fn owner(&self) -> Owner {
        Owner { id: self.root }
    }

    /// Dispose the root and everything it owns.
    ///
    /// Runs as a batch, so signal writes made by cleanups propagate once at
    /// the end. Disposing twice does nothing.
    pub fn try_dispose(&self) -> Result<()> {
        let root = self.root;
        run_batch(|| dispose_node(root))
    }

    pub fn dispose(&self) {
        self.try_dispose().unwrap_or_else(|err| throw(err));
    }
}

fn new_root() -> NodeId {
    with_runtime(|rt| {
        // Lookups continue into the enclosing owner, disposal does not
        let parent = rt.owner.filter(|id| rt.graph.contains(*id));
        rt.graph.insert(Node::new(NodeKind::Owner, parent), false)
    })
}

/// Create a new root owner and run `f` inside it.
///
/// Nothing created inside `f` is disposed until the [`Disposer`] passed to
/// `f` is called. The root is not tracked: reads inside `f` create no
/// dependencies for any enclosing computation.
///
/// ```rust
/// use rivulet_core::reactive::{create_root, on_cleanup};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let cleaned = Rc::new(Cell::new(false));
/// let flag = cleaned.clone();
/// let dispose = create_root(move |dispose| {
///     on_cleanup(move || flag.set(true));
///     dispose
/// });
///
/// dispose.dispose();
/// assert!(cleaned.get());
/// ```
pub fn create_root<R>(f: impl FnOnce(Disposer) -> R) -> R {
    let root = new_root();
    let _ctx = ReactiveContext::enter(Some(root), None);
    f(Disposer { root })
}

/// Like [`create_root`] for a fallible body. The root is disposed again when
/// `f` returns an error.
pub fn try_create_root<R>(f: impl FnOnce(Disposer) -> Result<R>) -> Result<R> {
    let root = new_root();
    let disposer = Disposer { root };
    let result = {
        let _ctx = ReactiveContext::enter(Some(root), None);
        f(disposer)
    };
    if result.is_err() {
        disposer.try_dispose()?;
    }
    result
}

/// Register `f` to run when the current owner is disposed or re-runs.
///
/// Without an owner the callback could never run; it is dropped and a
/// warning is logged.
pub fn on_cleanup(f: impl FnOnce() + 'static) {
    let rejected = with_runtime(|rt| {
        let node = rt.owner.and_then(|id| rt.graph.get_mut(id));
        match node {
            Some(node) => {
                node.cleanups.push(Box::new(f));
                None
            }
            None => {
                if rt.config.warn_unowned {
                    tracing::warn!("on_cleanup called outside of an owner; it will never run");
                }
                Some(f)
            }
        }
    });
    drop(rejected);
}

/// Register an error handler on the current owner.
///
/// User errors raised by computations below this owner are passed to the
/// nearest owner's handlers instead of propagating to the caller. Graph
/// integrity errors never reach handlers.
pub fn on_error(handler: impl Fn(&ReactiveError) + 'static) {
    let rejected = with_runtime(|rt| {
        let node = rt.owner.and_then(|id| rt.graph.get_mut(id));
        match node {
            Some(node) => {
                node.error_handlers.push(std::rc::Rc::new(handler));
                None
            }
            None => {
                if rt.config.warn_unowned {
                    tracing::warn!("on_error called outside of an owner; it will never run");
                }
                Some(handler)
            }
        }
    });
    drop(rejected);
}

/// The owner new computations are currently attached to.
pub fn get_owner() -> Option<Owner> {
    current_owner()
        .filter(|id| with_runtime(|rt| rt.graph.contains(*id)))
        .map(|id| Owner { id })
}

/// Run `f` under a previously captured owner, untracked.
///
/// Computations and cleanups created by `f` belong to `owner`, as if they
/// had been created when it was current.
pub fn run_with_owner<R>(owner: Owner, f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::enter(Some(owner.id), None);
    f()
}
