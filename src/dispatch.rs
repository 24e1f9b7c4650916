use crate::assignment::{self, AssignmentKind, SaStatus};
use crate::config::{ActionType, EmailRule, FieldKind, RequiredFields};
use crate::error::EngineError;
use crate::extractor::ExtractedFields;
use crate::store::{AssignmentStore, NewAssignment};
use std::fmt;
use std::sync::Arc;

/// What a successful dispatch did, for the ledger and for downstream
/// notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    Created { assignment_id: String },
    Transitioned {
        assignment_id: String,
        from: SaStatus,
        to: SaStatus,
    },
}

impl fmt::Display for DispatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchResult::Created { assignment_id } => {
                write!(f, "created assignment {assignment_id}")
            }
            DispatchResult::Transitioned {
                assignment_id,
                from,
                to,
            } => write!(f, "assignment {assignment_id}: {from} -> {to}"),
        }
    }
}

/// Routes a matched rule's action to one of the four handlers. Pure switch
/// over the closed `ActionType` set; the approval edges delegate to the
/// state machine in `assignment`.
pub struct Dispatcher {
    store: Arc<dyn AssignmentStore>,
    required: RequiredFields,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn AssignmentStore>, required: RequiredFields) -> Self {
        Dispatcher { store, required }
    }

    pub async fn dispatch(
        &self,
        rule: &EmailRule,
        fields: &ExtractedFields,
        message_id: &str,
    ) -> Result<DispatchResult, EngineError> {
        match rule.action {
            ActionType::CreateResourceAssignment => {
                self.create(AssignmentKind::Resource, fields, message_id)
                    .await
            }
            ActionType::CreateSaAssignment => {
                self.create(AssignmentKind::Sa, fields, message_id).await
            }
            ActionType::RequestSaApproval => self.request_approval(fields).await,
            ActionType::ConfirmSaApproval => self.confirm_approval(fields).await,
        }
    }

    async fn create(
        &self,
        kind: AssignmentKind,
        fields: &ExtractedFields,
        message_id: &str,
    ) -> Result<DispatchResult, EngineError> {
        let required = match kind {
            AssignmentKind::Resource => &self.required.resource_assignment,
            AssignmentKind::Sa => &self.required.sa_assignment,
        };
        let missing: Vec<FieldKind> = required
            .iter()
            .copied()
            .filter(|field| !fields.contains_key(field))
            .collect();
        if !missing.is_empty() {
            // Partial assignments are never persisted.
            return Err(EngineError::MissingRequiredFields(missing));
        }

        let practice = fields
            .get(&FieldKind::Practice)
            .or_else(|| fields.get(&FieldKind::ClientName))
            .cloned()
            .unwrap_or_default();
        let name = match kind {
            AssignmentKind::Sa => fields
                .get(&FieldKind::SaName)
                .or_else(|| fields.get(&FieldKind::ProjectNumber))
                .cloned(),
            AssignmentKind::Resource => fields
                .get(&FieldKind::ProjectNumber)
                .or_else(|| fields.get(&FieldKind::ClientName))
                .cloned(),
        }
        .unwrap_or_else(|| message_id.to_string());
        let revision_number = fields
            .get(&FieldKind::RevisionNumber)
            .cloned()
            .unwrap_or_else(|| "1".to_string());

        let created = self
            .store
            .create_assignment(
                NewAssignment {
                    kind,
                    practice,
                    name,
                    revision_number,
                    fields: fields.clone(),
                },
                message_id,
            )
            .await?;
        Ok(DispatchResult::Created {
            assignment_id: created.id,
        })
    }

    /// Resolve `(practice, saName)` to exactly one existing SA assignment.
    async fn resolve(
        &self,
        fields: &ExtractedFields,
    ) -> Result<crate::assignment::Assignment, EngineError> {
        let mut missing = Vec::new();
        if !fields.contains_key(&FieldKind::Practice) {
            missing.push(FieldKind::Practice);
        }
        if !fields.contains_key(&FieldKind::SaName) {
            missing.push(FieldKind::SaName);
        }
        if !missing.is_empty() {
            return Err(EngineError::MissingRequiredFields(missing));
        }
        let practice = &fields[&FieldKind::Practice];
        let name = &fields[&FieldKind::SaName];

        let found = self.store.find_sa_assignments(practice, name).await?;
        if let [assignment] = found.as_slice() {
            Ok(assignment.clone())
        } else {
            Err(EngineError::AssignmentNotUniquelyResolved {
                practice: practice.clone(),
                name: name.clone(),
                found: found.len(),
            })
        }
    }

    async fn request_approval(
        &self,
        fields: &ExtractedFields,
    ) -> Result<DispatchResult, EngineError> {
        let found = self.resolve(fields).await?;
        let to = assignment::request_approval(found.status)?;
        self.swap_status(&found, to, "RequestSaApproval").await
    }

    async fn confirm_approval(
        &self,
        fields: &ExtractedFields,
    ) -> Result<DispatchResult, EngineError> {
        let found = self.resolve(fields).await?;
        let email_revision = fields
            .get(&FieldKind::RevisionNumber)
            .ok_or_else(|| EngineError::MissingRequiredFields(vec![FieldKind::RevisionNumber]))?;
        let to = assignment::confirm_approval(found.status, &found.revision_number, email_revision)?;
        self.swap_status(&found, to, "ConfirmSaApproval").await
    }

    async fn swap_status(
        &self,
        found: &crate::assignment::Assignment,
        to: SaStatus,
        action: &'static str,
    ) -> Result<DispatchResult, EngineError> {
        let from = found.status;
        if self.store.update_status(&found.id, from, to).await? {
            log::info!("{action}: assignment {} moved {from} -> {to}", found.id);
            return Ok(DispatchResult::Transitioned {
                assignment_id: found.id.clone(),
                from,
                to,
            });
        }
        // The status moved between our read and the swap. Re-read so the
        // ledger row reports the state that actually blocked the swap.
        let fresh = self
            .store
            .find_sa_assignments(&found.practice, &found.name)
            .await?;
        match fresh.iter().find(|a| a.id == found.id) {
            Some(current) => Err(EngineError::InvalidStateForTransition {
                action,
                required: from,
                status: current.status,
            }),
            None => Err(EngineError::AssignmentNotUniquelyResolved {
                practice: found.practice.clone(),
                name: found.name.clone(),
                found: 0,
            }),
        }
    }
}
