// ── Core error types ──
//
// Errors surfaced by a reconciliation pass. Merge conflicts are not
// errors; they travel in `PassReport::conflicts`. Everything here
// aborts the pass for one resource type or render target only.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::ResourceType;
use crate::redundancy::RedundancyState;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── State errors ─────────────────────────────────────────────────
    #[error("Data bag for {resource} at {} is corrupt: {reason}", path.display())]
    BagCorrupt {
        resource: ResourceType,
        path: PathBuf,
        reason: String,
    },

    #[error("Could not acquire lock {}: {reason}", path.display())]
    Lock { path: PathBuf, reason: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Payload errors ───────────────────────────────────────────────
    #[error("Invalid {resource} payload: {reason}")]
    InvalidPayload {
        resource: ResourceType,
        reason: String,
    },

    #[error("Stored {resource} entry '{key}' is unreadable: {reason}")]
    InvalidEntry {
        resource: ResourceType,
        key: String,
        reason: String,
    },

    // ── External command errors ──────────────────────────────────────

    #[error("Command `{command}` exited with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("Command `{command}` timed out after {timeout_secs}s")]
    CommandTimeout { command: String, timeout_secs: u64 },

    #[error("Staged artifact {} failed validation: {reason}", path.display())]
    ValidationFailed { path: PathBuf, reason: String },

    // ── Redundancy errors ────────────────────────────────────────────
    #[error("Split brain: local router is {local} while peer reports {peer}")]
    SplitBrain {
        local: RedundancyState,
        peer: RedundancyState,
    },

    #[error("Transition rejected: cannot handle {event} while {state}")]
    InvalidTransition {
        state: RedundancyState,
        event: String,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<crate::merge::MergeError> for CoreError {
    fn from(err: crate::merge::MergeError) -> Self {
        match err {
            crate::merge::MergeError::InvalidPayload { resource, reason } => {
                Self::InvalidPayload { resource, reason }
            }
        }
    }
}
