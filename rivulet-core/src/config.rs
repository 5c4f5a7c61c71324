//! Runtime Configuration
//!
//! Knobs that tune how the scheduler treats diverging or ambiguous updates.
//! A configuration is installed per thread with
//! [`configure`](crate::reactive::configure); every thread starts with
//! [`RuntimeConfig::default`].

use serde::{Deserialize, Serialize};

/// Default bound on update-queue entries within one batch.
pub const DEFAULT_MAX_UPDATES: usize = 100_000;

/// What to do when a signal receives two different values within one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteConflictPolicy {
    /// The last value written before the batch flushes is committed.
    #[default]
    LastWriteWins,

    /// The second differing write fails with `ConflictingWrite`.
    Reject,
}

/// Per-thread runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum number of update-queue entries a single batch may produce
    /// before the scheduler gives up with `RunawayPropagation`.
    pub max_updates_per_batch: usize,

    /// Policy for repeated writes to one signal inside a batch.
    pub write_conflicts: WriteConflictPolicy,

    /// Log a warning when a computation or cleanup is created with no owner.
    pub warn_unowned: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_updates_per_batch: DEFAULT_MAX_UPDATES,
            write_conflicts: WriteConflictPolicy::default(),
            warn_unowned: true,
        }
    }
}

impl RuntimeConfig {
    /// Set the runaway bound.
    pub fn with_max_updates(mut self, max: usize) -> Self {
        self.max_updates_per_batch = max;
        self
    }

    /// Set the same-batch write conflict policy.
    pub fn with_write_conflicts(mut self, policy: WriteConflictPolicy) -> Self {
        self.write_conflicts = policy;
        self
    }

    /// Enable or disable ownerless-creation warnings.
    pub fn with_warn_unowned(mut self, warn: bool) -> Self {
        self.warn_unowned = warn;
        self
    }
}
