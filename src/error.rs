use crate::assignment::SaStatus;
use crate::config::FieldKind;
use thiserror::Error;

/// Everything dispatch can fail with while handling one message, plus the
/// run-aborting transport class. Unmatched and ambiguous messages are not
/// errors; they are recorded as skip outcomes in the ledger.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("missing required fields: {}", format_fields(.0))]
    MissingRequiredFields(Vec<FieldKind>),

    #[error("assignment not uniquely resolved for practice '{practice}', SA '{name}': {found} found")]
    AssignmentNotUniquelyResolved {
        practice: String,
        name: String,
        found: usize,
    },

    #[error("invalid state for transition: {action} requires {required}, assignment is {status}")]
    InvalidStateForTransition {
        action: &'static str,
        required: SaStatus,
        status: SaStatus,
    },

    #[error("revision mismatch: assignment holds revision '{stored}', email carries '{email}'")]
    RevisionMismatch { stored: String, email: String },

    #[error("transport error: {0}")]
    Transport(String),
}

fn format_fields(fields: &[FieldKind]) -> String {
    fields
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl EngineError {
    /// Only transport failures are allowed to abort a whole run; everything
    /// else is downgraded to a per-message ledger entry.
    pub fn aborts_run(&self) -> bool {
        matches!(self, EngineError::Transport(_))
    }
}
