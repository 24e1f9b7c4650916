use crate::config::FieldKind;
use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentKind {
    Resource,
    Sa,
}

/// Approval flow for SA assignments:
/// `Assigned -> PendingApproval -> Complete`, with a terminal `Rejected`
/// reachable only by out-of-band administrative action. This engine drives
/// the two forward edges and nothing else; there is no auto-expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaStatus {
    Assigned,
    PendingApproval,
    Complete,
    Rejected,
}

impl fmt::Display for SaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SaStatus::Assigned => "Assigned",
            SaStatus::PendingApproval => "PendingApproval",
            SaStatus::Complete => "Complete",
            SaStatus::Rejected => "Rejected",
        };
        f.write_str(s)
    }
}

/// A resource or SA work record. SA assignments are resolved by
/// `(practice, name)`, case-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: String,
    pub kind: AssignmentKind,
    pub practice: String,
    pub name: String,
    pub status: SaStatus,
    /// Attached by the upstream creator; an approval confirmation must carry
    /// exactly this value to apply.
    pub revision_number: String,
    #[serde(default)]
    pub fields: BTreeMap<FieldKind, String>,
    /// Message that created this record, used by the store to deduplicate
    /// retried creates.
    #[serde(default)]
    pub source_message_id: Option<String>,
}

/// `RequestSaApproval` edge: valid only from `Assigned`. Never overwrites
/// any other state.
pub fn request_approval(current: SaStatus) -> Result<SaStatus, EngineError> {
    match current {
        SaStatus::Assigned => Ok(SaStatus::PendingApproval),
        other => Err(EngineError::InvalidStateForTransition {
            action: "RequestSaApproval",
            required: SaStatus::Assigned,
            status: other,
        }),
    }
}

/// `ConfirmSaApproval` edge: valid only from `PendingApproval`, and only
/// when the revision carried by the email equals the stored revision
/// exactly. State is checked before the revision so a stale confirmation
/// against an already-advanced assignment reports the state problem.
pub fn confirm_approval(
    current: SaStatus,
    stored_revision: &str,
    email_revision: &str,
) -> Result<SaStatus, EngineError> {
    if current != SaStatus::PendingApproval {
        return Err(EngineError::InvalidStateForTransition {
            action: "ConfirmSaApproval",
            required: SaStatus::PendingApproval,
            status: current,
        });
    }
    if stored_revision != email_revision {
        return Err(EngineError::RevisionMismatch {
            stored: stored_revision.to_string(),
            email: email_revision.to_string(),
        });
    }
    Ok(SaStatus::Complete)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_advances_assigned_to_pending() {
        assert_eq!(
            request_approval(SaStatus::Assigned).unwrap(),
            SaStatus::PendingApproval
        );
    }

    #[test]
    fn request_never_regresses_completed_assignments() {
        for status in [SaStatus::PendingApproval, SaStatus::Complete, SaStatus::Rejected] {
            match request_approval(status) {
                Err(EngineError::InvalidStateForTransition { status: got, .. }) => {
                    assert_eq!(got, status)
                }
                other => panic!("expected InvalidStateForTransition, got {other:?}"),
            }
        }
    }

    #[test]
    fn confirm_requires_exact_revision_match() {
        assert_eq!(
            confirm_approval(SaStatus::PendingApproval, "3", "3").unwrap(),
            SaStatus::Complete
        );
        match confirm_approval(SaStatus::PendingApproval, "3", "2") {
            Err(EngineError::RevisionMismatch { stored, email }) => {
                assert_eq!(stored, "3");
                assert_eq!(email, "2");
            }
            other => panic!("expected RevisionMismatch, got {other:?}"),
        }
    }

    #[test]
    fn revision_equality_is_exact_not_fuzzy() {
        // "03" and "3" are different revisions.
        assert!(confirm_approval(SaStatus::PendingApproval, "3", "03").is_err());
        assert!(confirm_approval(SaStatus::PendingApproval, "3", " 3").is_err());
    }

    #[test]
    fn confirm_reports_state_before_revision() {
        // Wrong state and wrong revision: the state problem wins.
        match confirm_approval(SaStatus::Complete, "3", "2") {
            Err(EngineError::InvalidStateForTransition { status, .. }) => {
                assert_eq!(status, SaStatus::Complete)
            }
            other => panic!("expected InvalidStateForTransition, got {other:?}"),
        }
    }
}
