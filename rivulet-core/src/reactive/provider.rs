//! Context values scoped to the ownership tree.
//!
//! A value provided on an owner is visible to everything created below it.
//! Lookups walk the owner chain towards the root, so a nearer provider
//! shadows a farther one for the same context.

use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

use super::context::ReactiveContext;
use super::runtime::with_runtime;
use crate::graph::{ContextId, Node, NodeKind};

/// A context key with its default value.
pub struct Context<T> {
    id: ContextId,
    default: Rc<T>,
}

impl<T: Clone + 'static> Context<T> {
    pub fn new(default: T) -> Self {
        Self {
            id: ContextId::new(),
            default: Rc::new(default),
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Run `f` in a new scope where this context resolves to `value`.
    pub fn provide<R>(&self, value: T, f: impl FnOnce() -> R) -> R {
        provide(self, value, f)
    }

    /// The nearest provided value, or the default.
    pub fn use_context(&self) -> T {
        use_context(self)
    }
}

impl<T> Clone for Context<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            default: Rc::clone(&self.default),
        }
    }
}

impl<T> std::fmt::Debug for Context<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context").field("id", &self.id).finish()
    }
}

/// Create a context. Same as [`Context::new`].
pub fn create_context<T: Clone + 'static>(default: T) -> Context<T> {
    Context::new(default)
}

/// Run `f` under a new owner that provides `value` for `context`.
///
/// The scope belongs to the current owner and is disposed with it. Reads
/// inside `f` stay tracked by the current computation.
pub fn provide<T: 'static, R>(context: &Context<T>, value: T, f: impl FnOnce() -> R) -> R {
    let (scope, listener) = with_runtime(|rt| {
        let parent = rt.owner.filter(|id| rt.graph.contains(*id));
        let mut node = Node::new(NodeKind::Owner, parent);
        let value: Rc<dyn Any> = Rc::new(value);
        node.contexts = Some(HashMap::from([(context.id, value)]));
        (rt.graph.insert(node, true), rt.listener)
    });

    let _ctx = ReactiveContext::enter(Some(scope), listener);
    f()
}

/// Look up the nearest value provided for `context`, falling back to its
/// default.
pub fn use_context<T: Clone + 'static>(context: &Context<T>) -> T {
    let found = with_runtime(|rt| rt.graph.lookup_context(rt.owner, context.id));
    found
        .and_then(|value| value.downcast::<T>().ok())
        .map_or_else(|| (*context.default).clone(), |value| (*value).clone())
}
