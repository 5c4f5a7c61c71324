//! Rivulet Core
//!
//! This crate provides a fine-grained reactive runtime: a dependency-tracking
//! data graph plus a synchronous update scheduler that propagates changes
//! from mutable signals to derived computations.
//! It implements:
//!
//! - Reactive primitives (signals, memos, effects)
//! - An ownership tree that disposes computations and runs cleanups
//! - Glitch-free, at-most-once propagation with batching
//! - Incremental list mapping that reuses per-item work
//!
//! The runtime is single-threaded. Each thread has its own graph, and
//! handles are only meaningful on the thread that created them.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Reactive primitives, ownership, and the runtime
//! - `graph`: Node arena, edges, and the mark phase of the scheduler
//! - `list`: Incremental list mapping
//! - `loadable`: Values that may not be available yet
//! - `config` / `error`: Runtime configuration and error types
//!
//! # Example
//!
//! ```rust
//! use rivulet_core::reactive::{create_root, Effect, Memo, Signal};
//!
//! create_root(|dispose| {
//!     // Create a signal
//!     let count = Signal::new(0);
//!
//!     // Create a derived value
//!     let doubled = Memo::new(move |_| count.get() * 2);
//!
//!     // Create an effect
//!     Effect::new(move |_| {
//!         println!("Count: {}, Doubled: {}", count.get(), doubled.get());
//!     });
//!
//!     // Update the signal
//!     count.set(5);
//!     // Effect automatically runs, prints: "Count: 5, Doubled: 10"
//!
//!     dispose.dispose();
//! });
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod list;
pub mod loadable;
pub mod reactive;

pub use config::{RuntimeConfig, WriteConflictPolicy};
pub use error::{ReactiveError, Result};
pub use loadable::Loadable;
