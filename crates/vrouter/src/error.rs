//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use vrouter_config::ConfigError;
use vrouter_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const TIMEOUT: i32 = 8;
    pub const SPLIT_BRAIN: i32 = 9;
    pub const CORRUPT: i32 = 10;
    pub const EXEC: i32 = 11;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── State ────────────────────────────────────────────────────────

    #[error("Data bag for {resource} is corrupt: {reason}")]
    #[diagnostic(
        code(vrouter::corrupt_bag),
        help(
            "The file at {path} could not be parsed. Nothing was changed.\n\
             Restore it from backup, or move it aside to start from an empty bag."
        )
    )]
    CorruptBag {
        resource: String,
        path: String,
        reason: String,
    },

    #[error("Lock {path} is held by another process")]
    #[diagnostic(
        code(vrouter::lock_busy),
        help("Another pass for the same resource is running. Retry, or raise lock_timeout_secs.")
    )]
    LockBusy { path: String, reason: String },

    // ── Payloads ─────────────────────────────────────────────────────

    #[error("Invalid {resource} payload: {reason}")]
    #[diagnostic(
        code(vrouter::invalid_payload),
        help("The payload was rejected as a whole; the stored bag is unchanged.")
    )]
    InvalidPayload { resource: String, reason: String },

    #[error("{resource}: {count} conflicting entr(ies) rejected")]
    #[diagnostic(
        code(vrouter::conflict),
        help("The rest of the payload was applied. Run: vrouter show {resource}")
    )]
    Conflicts { resource: String, count: usize },

    // ── Host ─────────────────────────────────────────────────────────

    #[error("Command failed: {command}")]
    #[diagnostic(code(vrouter::exec_failed), help("{detail}"))]
    CommandFailed { command: String, detail: String },

    #[error("Command timed out after {seconds}s: {command}")]
    #[diagnostic(
        code(vrouter::timeout),
        help("Raise command_timeout_secs in the configuration if the host is slow.")
    )]
    Timeout { command: String, seconds: u64 },

    #[error("{count} render target(s) failed: {targets}")]
    #[diagnostic(
        code(vrouter::render_failed),
        help("Artifacts of the failed targets were restored. Re-run with -v for details.")
    )]
    RenderFailed { count: usize, targets: String },

    // ── Redundancy ───────────────────────────────────────────────────

    #[error("Split brain: local router is {local}, peer reports {peer}")]
    #[diagnostic(
        code(vrouter::split_brain),
        help(
            "Both nodes claim MASTER. This is never resolved automatically.\n\
             Demote one node: vrouter redundancy demote"
        )
    )]
    SplitBrain { local: String, peer: String },

    #[error("Transition rejected while {state}: {event}")]
    #[diagnostic(code(vrouter::invalid_transition))]
    InvalidTransition { state: String, event: String },

    // ── Verification ─────────────────────────────────────────────────

    #[error("{artifact} is missing {count} reservation(s)")]
    #[diagnostic(
        code(vrouter::missing_entries),
        help("Re-publish with: vrouter render {target} --force")
    )]
    MissingEntries {
        count: usize,
        artifact: String,
        target: String,
    },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(vrouter::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error(transparent)]
    #[diagnostic(
        code(vrouter::config),
        help("Check the configuration with: vrouter config show")
    )]
    Config(#[from] ConfigError),

    // ── Interactive ──────────────────────────────────────────────────

    #[error("Operation '{action}' requires confirmation")]
    #[diagnostic(
        code(vrouter::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Internal ─────────────────────────────────────────────────────

    #[error("{0}")]
    #[diagnostic(code(vrouter::internal))]
    Internal(String),

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(vrouter::json), help("Check the JSON file contents and try again."))]
    Json(#[from] serde_json::Error),

    #[error("Could not render YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::CorruptBag { .. } => exit_code::CORRUPT,
            Self::LockBusy { .. } | Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Conflicts { .. } | Self::InvalidTransition { .. } => exit_code::CONFLICT,
            Self::CommandFailed { .. } | Self::RenderFailed { .. } => exit_code::EXEC,
            Self::SplitBrain { .. } => exit_code::SPLIT_BRAIN,
            Self::MissingEntries { .. } => exit_code::NOT_FOUND,
            Self::InvalidPayload { .. }
            | Self::Validation { .. }
            | Self::Json(_)
            | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::BagCorrupt {
                resource,
                path,
                reason,
            } => CliError::CorruptBag {
                resource: resource.to_string(),
                path: path.display().to_string(),
                reason,
            },

            CoreError::Lock { path, reason } => CliError::LockBusy {
                path: path.display().to_string(),
                reason,
            },

            CoreError::InvalidPayload { resource, reason } => CliError::InvalidPayload {
                resource: resource.to_string(),
                reason,
            },

            CoreError::InvalidEntry {
                resource,
                key,
                reason,
            } => CliError::InvalidPayload {
                resource: resource.to_string(),
                reason: format!("stored entry '{key}': {reason}"),
            },

            CoreError::CommandFailed {
                command,
                status,
                stderr,
            } => CliError::CommandFailed {
                command,
                detail: format!("exit status {status}: {}", stderr.trim()),
            },

            CoreError::CommandTimeout {
                command,
                timeout_secs,
            } => CliError::Timeout {
                command,
                seconds: timeout_secs,
            },

            CoreError::ValidationFailed { path, reason } => CliError::CommandFailed {
                command: format!("validate {}", path.display()),
                detail: reason,
            },

            CoreError::SplitBrain { local, peer } => CliError::SplitBrain {
                local: local.to_string(),
                peer: peer.to_string(),
            },

            CoreError::InvalidTransition { state, event } => CliError::InvalidTransition {
                state: state.to_string(),
                event,
            },

            CoreError::Config { message } => CliError::Validation {
                field: "configuration".into(),
                reason: message,
            },

            err @ CoreError::Io { .. } => CliError::Internal(err.to_string()),

            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use vrouter_core::{RedundancyState, ResourceType};

    #[test]
    fn core_errors_map_to_stable_exit_codes() {
        let cases = [
            (
                CoreError::BagCorrupt {
                    resource: ResourceType::DhcpEntries,
                    path: "/x".into(),
                    reason: "eof".into(),
                },
                exit_code::CORRUPT,
            ),
            (
                CoreError::SplitBrain {
                    local: RedundancyState::Master,
                    peer: RedundancyState::Master,
                },
                exit_code::SPLIT_BRAIN,
            ),
            (
                CoreError::CommandTimeout {
                    command: "ip".into(),
                    timeout_secs: 30,
                },
                exit_code::TIMEOUT,
            ),
            (
                CoreError::CommandFailed {
                    command: "haproxy".into(),
                    status: 1,
                    stderr: String::new(),
                },
                exit_code::EXEC,
            ),
            (
                CoreError::InvalidPayload {
                    resource: ResourceType::FirewallRules,
                    reason: "bad".into(),
                },
                exit_code::USAGE,
            ),
        ];
        for (core, code) in cases {
            assert_eq!(CliError::from(core).exit_code(), code);
        }
    }

    #[test]
    fn conflicts_exit_with_conflict_code() {
        let err = CliError::Conflicts {
            resource: "forwardingrules".into(),
            count: 1,
        };
        assert_eq!(err.to_string(), "forwardingrules: 1 conflicting entr(ies) rejected");
        assert_eq!(err.exit_code(), exit_code::CONFLICT);
    }
}
