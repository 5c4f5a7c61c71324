//! Error types for the reactive runtime.

use std::any::Any;

use thiserror::Error;

use crate::graph::NodeId;

/// Errors raised while reading, writing or propagating through the graph.
///
/// Three of the variants describe a corrupt or diverging graph (see
/// [`ReactiveError::is_integrity`]). Those are never handed to `on_error`
/// handlers; they always surface to the caller that triggered the update.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A computation read itself, directly or through other memos, while it
    /// was still being evaluated.
    #[error("circular dependency detected while evaluating {node:?}")]
    CircularDependency {
        /// The node that was read while already running.
        node: NodeId,
    },

    /// A single batch queued more updates than the configured bound allows.
    ///
    /// This almost always means two effects keep writing signals the other
    /// one reads.
    #[error("potential infinite update loop: {queued} updates queued in one batch (limit {limit})")]
    RunawayPropagation {
        /// Number of queue entries seen when the bound tripped.
        queued: usize,
        /// The configured `max_updates_per_batch`.
        limit: usize,
    },

    /// Two different values were written to the same signal in one batch
    /// while the runtime is configured to reject such writes.
    #[error("conflicting values written to signal {node:?} within one batch")]
    ConflictingWrite {
        /// The signal that received both writes.
        node: NodeId,
    },

    /// The handle refers to a node whose owner has been disposed.
    #[error("reactive node {node:?} has been disposed")]
    Disposed {
        /// The disposed node.
        node: NodeId,
    },

    /// A user computation panicked.
    #[error("computation panicked: {message}")]
    ComputationPanicked {
        /// The panic message, when the payload was a string.
        message: String,
    },
}

impl ReactiveError {
    /// Whether this error describes a broken graph rather than a failure in
    /// user code.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            ReactiveError::CircularDependency { .. }
                | ReactiveError::RunawayPropagation { .. }
                | ReactiveError::ConflictingWrite { .. }
        )
    }

    /// Recover an error from an unwind payload.
    ///
    /// Payloads that already carry a `ReactiveError` (rethrown by a nested
    /// read) are returned as-is; anything else becomes `ComputationPanicked`.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let payload = match payload.downcast::<ReactiveError>() {
            Ok(err) => return *err,
            Err(payload) => payload,
        };

        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };

        ReactiveError::ComputationPanicked { message }
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;
