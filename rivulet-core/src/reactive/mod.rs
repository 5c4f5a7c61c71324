//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, memos, effects
//! and the ownership tree that decides how long they live.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a memo or effect), the signal
//! automatically registers that context as a dependent. When the signal's
//! value changes, all dependents are notified.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It re-evaluates only
//! when one of its dependencies changed value and somebody reads it.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Effects are used to synchronize reactive state with
//! external systems.
//!
//! ## Owners
//!
//! Every computation belongs to the owner that was current when it was
//! created. When a computation re-runs, or a root is disposed, everything it
//! owns is disposed first and its cleanups run.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local runtime to automatically detect
//! dependencies. When a signal is read, we check if there is an active
//! listener and, if so, record the dependency edge in both directions.
//!
//! This approach (sometimes called "automatic dependency tracking" or
//! "transparent reactivity") is used by SolidJS, Vue 3, and Leptos.

mod context;
mod effect;
mod memo;
mod owner;
mod provider;
mod runtime;
mod selector;
mod signal;

pub use context::{is_tracking, sample, untrack};
pub use effect::{create_computed, create_effect, Effect};
pub use memo::{create_memo, create_memo_with, Memo};
pub use owner::{
    create_root, get_owner, on_cleanup, on_error, run_with_owner, try_create_root, Disposer, Owner,
};
pub use provider::{create_context, provide, use_context, Context};
pub use runtime::{batch, configure, current_config, node_count, try_batch};
pub use selector::{create_selector, Selector};
pub use signal::{create_signal, create_signal_with, ReadSignal, Signal, WriteSignal};
