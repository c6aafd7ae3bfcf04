//! Error taxonomy shared by every jack component.
//!
//! One variant per error kind in spec §7; propagated verbatim to the
//! control-server boundary without masking, per the propagation policy.

use thiserror::Error;

/// Outcome of an orchestrator-triggered rollback, attached to
/// `Error::ApplyFailed` so the client learns whether recovery actually
/// worked.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum RollbackOutcome {
    Restored,
    Partial { warnings: Vec<String> },
    Failed(String),
}

#[derive(Error, Debug)]
pub enum JackError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("no pending changes")]
    NoPending,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("kernel error: {0}")]
    Kernel(String),

    #[error("plugin error: {0}")]
    Plugin(String),

    #[error("apply failed: {kind}")]
    ApplyFailed {
        kind: Box<JackError>,
        rollback: RollbackOutcome,
    },

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, JackError>;

impl JackError {
    /// The error-kind tag as sent to clients in `response.error`'s sibling
    /// field, independent of the human-readable message.
    pub fn kind_name(&self) -> &'static str {
        match self {
            JackError::NotFound(_) => "not-found",
            JackError::Validation(_) => "validation-error",
            JackError::NoPending => "no-pending",
            JackError::Conflict(_) => "conflict",
            JackError::Io(_) => "io-error",
            JackError::Kernel(_) => "kernel-error",
            JackError::Plugin(_) => "plugin-error",
            JackError::ApplyFailed { .. } => "apply-failed",
            JackError::UnknownCommand(_) => "unknown-command",
            JackError::Serialization(_) => "io-error",
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        JackError::Validation(vec![msg.into()])
    }

    pub fn apply_failed(kind: JackError, rollback: RollbackOutcome) -> Self {
        JackError::ApplyFailed {
            kind: Box::new(kind),
            rollback,
        }
    }
}

impl From<anyhow::Error> for JackError {
    fn from(err: anyhow::Error) -> Self {
        JackError::Kernel(err.to_string())
    }
}
