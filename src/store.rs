use crate::assignment::{Assignment, AssignmentKind, SaStatus};
use crate::config::{Config, EmailRule};
use crate::error::EngineError;
use crate::extractor::ExtractedFields;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// An unread message as handed over by the mailbox collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub from: String,
    pub subject: String,
    pub body: String,
}

/// The monitored shared mailbox. The read flag it keeps is the single source
/// of truth for "already handled"; this engine never caches that state.
#[async_trait]
pub trait Mailbox: Send + Sync {
    async fn list_unread(&self) -> Result<Vec<Message>, EngineError>;
    async fn mark_read(&self, message_id: &str) -> Result<(), EngineError>;
}

/// Read side of the rule configuration. Re-queried at the start of every run
/// so edits made through the authoring interface apply without a restart.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn list_enabled_rules(&self) -> Result<Vec<EmailRule>, EngineError>;
}

/// Payload for a create action after the required-field check passed.
#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub kind: AssignmentKind,
    pub practice: String,
    pub name: String,
    pub revision_number: String,
    pub fields: ExtractedFields,
}

#[async_trait]
pub trait AssignmentStore: Send + Sync {
    /// All SA assignments matching `(practice, name)` case-insensitively.
    /// Dispatch requires exactly one.
    async fn find_sa_assignments(
        &self,
        practice: &str,
        name: &str,
    ) -> Result<Vec<Assignment>, EngineError>;

    /// Create a record, deduplicated by `source_message_id`: retrying the
    /// same message must return the already-created assignment instead of a
    /// duplicate.
    async fn create_assignment(
        &self,
        new: NewAssignment,
        source_message_id: &str,
    ) -> Result<Assignment, EngineError>;

    /// Compare-and-swap on status. `Ok(false)` means the assignment's current
    /// status differed from `from` (or the record disappeared) and nothing
    /// was written.
    async fn update_status(
        &self,
        id: &str,
        from: SaStatus,
        to: SaStatus,
    ) -> Result<bool, EngineError>;
}

/// Rule store backed by the engine's own YAML config file. The file is
/// re-read on every call, so a `list_enabled_rules` at run start picks up
/// edits immediately. Rules that fail validation are logged and skipped
/// rather than aborting the run.
pub struct ConfigRuleStore {
    path: String,
}

impl ConfigRuleStore {
    pub fn new(path: &str) -> Self {
        ConfigRuleStore {
            path: path.to_string(),
        }
    }
}

#[async_trait]
impl RuleStore for ConfigRuleStore {
    async fn list_enabled_rules(&self) -> Result<Vec<EmailRule>, EngineError> {
        let config = Config::from_file(&self.path)
            .map_err(|e| EngineError::Transport(format!("rule config {}: {e}", self.path)))?;
        let mut rules = Vec::new();
        for rule in config.rules {
            if !rule.enabled {
                continue;
            }
            let problems = rule.validate(&config.required_fields);
            if problems.is_empty() {
                rules.push(rule);
            } else {
                log::warn!(
                    "skipping rule '{}' ({}): {}",
                    rule.name,
                    rule.id,
                    problems.join("; ")
                );
            }
        }
        Ok(rules)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredMessage {
    id: String,
    from: String,
    subject: String,
    body: String,
    #[serde(default)]
    read: bool,
}

/// Development/test mailbox backed by a JSON file of messages with a `read`
/// flag. Production deployments substitute the real transport behind the
/// same trait.
pub struct JsonMailbox {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonMailbox {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        JsonMailbox {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<Vec<StoredMessage>, EngineError> {
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| EngineError::Transport(format!("mailbox {}: {e}", self.path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| EngineError::Transport(format!("mailbox {}: {e}", self.path.display())))
    }

    fn save(&self, messages: &[StoredMessage]) -> Result<(), EngineError> {
        let content = serde_json::to_string_pretty(messages)
            .map_err(|e| EngineError::Transport(e.to_string()))?;
        std::fs::write(&self.path, content)
            .map_err(|e| EngineError::Transport(format!("mailbox {}: {e}", self.path.display())))
    }
}

#[async_trait]
impl Mailbox for JsonMailbox {
    async fn list_unread(&self) -> Result<Vec<Message>, EngineError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self
            .load()?
            .into_iter()
            .filter(|m| !m.read)
            .map(|m| Message {
                id: m.id,
                from: m.from,
                subject: m.subject,
                body: m.body,
            })
            .collect())
    }

    async fn mark_read(&self, message_id: &str) -> Result<(), EngineError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut messages = self.load()?;
        match messages.iter_mut().find(|m| m.id == message_id) {
            Some(message) => message.read = true,
            None => {
                return Err(EngineError::Transport(format!(
                    "message {message_id} not found in mailbox"
                )))
            }
        }
        self.save(&messages)
    }
}

/// Assignment store backed by a JSON file. `update_status` is a
/// compare-and-swap under the store lock, and `create_assignment`
/// deduplicates on the creating message id so a retried dispatch is safe.
pub struct JsonAssignmentStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonAssignmentStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        JsonAssignmentStore {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<Vec<Assignment>, EngineError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            EngineError::Transport(format!("assignment store {}: {e}", self.path.display()))
        })?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content).map_err(|e| {
            EngineError::Transport(format!("assignment store {}: {e}", self.path.display()))
        })
    }

    fn save(&self, assignments: &[Assignment]) -> Result<(), EngineError> {
        let content = serde_json::to_string_pretty(assignments)
            .map_err(|e| EngineError::Transport(e.to_string()))?;
        std::fs::write(&self.path, content).map_err(|e| {
            EngineError::Transport(format!("assignment store {}: {e}", self.path.display()))
        })
    }
}

#[async_trait]
impl AssignmentStore for JsonAssignmentStore {
    async fn find_sa_assignments(
        &self,
        practice: &str,
        name: &str,
    ) -> Result<Vec<Assignment>, EngineError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self
            .load()?
            .into_iter()
            .filter(|a| {
                a.kind == AssignmentKind::Sa
                    && a.practice.eq_ignore_ascii_case(practice)
                    && a.name.eq_ignore_ascii_case(name)
            })
            .collect())
    }

    async fn create_assignment(
        &self,
        new: NewAssignment,
        source_message_id: &str,
    ) -> Result<Assignment, EngineError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut assignments = self.load()?;
        if let Some(existing) = assignments
            .iter()
            .find(|a| a.source_message_id.as_deref() == Some(source_message_id))
        {
            log::debug!(
                "message {source_message_id} already created assignment {}; returning it",
                existing.id
            );
            return Ok(existing.clone());
        }
        let assignment = Assignment {
            id: format!("asg-{}", assignments.len() + 1),
            kind: new.kind,
            practice: new.practice,
            name: new.name,
            status: SaStatus::Assigned,
            revision_number: new.revision_number,
            fields: new.fields,
            source_message_id: Some(source_message_id.to_string()),
        };
        assignments.push(assignment.clone());
        self.save(&assignments)?;
        Ok(assignment)
    }

    async fn update_status(
        &self,
        id: &str,
        from: SaStatus,
        to: SaStatus,
    ) -> Result<bool, EngineError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut assignments = self.load()?;
        let Some(assignment) = assignments.iter_mut().find(|a| a.id == id) else {
            return Ok(false);
        };
        if assignment.status != from {
            return Ok(false);
        }
        assignment.status = to;
        self.save(&assignments)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn mailbox_file(messages: &[StoredMessage]) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), serde_json::to_string(messages).unwrap()).unwrap();
        file
    }

    fn stored(id: &str, read: bool) -> StoredMessage {
        StoredMessage {
            id: id.to_string(),
            from: "savant@netsync.com".to_string(),
            subject: "PMO - New Resource Request".to_string(),
            body: "Job Number: 1".to_string(),
            read,
        }
    }

    #[tokio::test]
    async fn mailbox_lists_only_unread_and_persists_mark_read() {
        let file = mailbox_file(&[stored("m1", false), stored("m2", true), stored("m3", false)]);
        let mailbox = JsonMailbox::new(file.path());

        let unread = mailbox.list_unread().await.unwrap();
        assert_eq!(
            unread.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            vec!["m1", "m3"]
        );

        mailbox.mark_read("m1").await.unwrap();
        let unread = mailbox.list_unread().await.unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, "m3");

        // Re-open from the same file: the flag survived.
        let reopened = JsonMailbox::new(file.path());
        assert_eq!(reopened.list_unread().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_mailbox_file_is_a_transport_error() {
        let mailbox = JsonMailbox::new("/nonexistent/mailbox.json");
        match mailbox.list_unread().await {
            Err(EngineError::Transport(_)) => {}
            other => panic!("expected Transport, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn assignment_store_cas_refuses_stale_from_status() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = JsonAssignmentStore::new(file.path());
        let created = store
            .create_assignment(
                NewAssignment {
                    kind: AssignmentKind::Sa,
                    practice: "Security".to_string(),
                    name: "Acme Rollout".to_string(),
                    revision_number: "1".to_string(),
                    fields: BTreeMap::new(),
                },
                "m1",
            )
            .await
            .unwrap();

        assert!(store
            .update_status(&created.id, SaStatus::Assigned, SaStatus::PendingApproval)
            .await
            .unwrap());
        // Second swap from Assigned must fail: status already moved on.
        assert!(!store
            .update_status(&created.id, SaStatus::Assigned, SaStatus::PendingApproval)
            .await
            .unwrap());

        let found = store
            .find_sa_assignments("security", "acme rollout")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].status, SaStatus::PendingApproval);
    }

    #[tokio::test]
    async fn config_rule_store_rereads_and_skips_unusable_rules() {
        use crate::config::{ActionType, Config, EmailRule, KeywordMapping, SenderPattern};

        let mut config = Config::default();
        config.rules[1].enabled = false;
        // Strip the confirm rule's mappings so it fails validation.
        config.rules[3].mappings.clear();
        let file = tempfile::NamedTempFile::new().unwrap();
        config.to_file(file.path().to_str().unwrap()).unwrap();

        let store = ConfigRuleStore::new(file.path().to_str().unwrap());
        let rules = store.list_enabled_rules().await.unwrap();
        // 4 configured: one disabled, one invalid, two live.
        assert_eq!(rules.len(), 2);
        assert!(rules.iter().all(|r| r.enabled));

        // An edit takes effect on the very next read, no restart.
        config.rules.push(EmailRule {
            id: "added-later".to_string(),
            name: "Added later".to_string(),
            sender_pattern: SenderPattern::Any,
            subject_pattern: "Anything".to_string(),
            mappings: vec![
                KeywordMapping {
                    keyword: "Practice".to_string(),
                    field: crate::config::FieldKind::Practice,
                },
                KeywordMapping {
                    keyword: "SA Name".to_string(),
                    field: crate::config::FieldKind::SaName,
                },
            ],
            action: ActionType::RequestSaApproval,
            enabled: true,
        });
        config.to_file(file.path().to_str().unwrap()).unwrap();
        let rules = store.list_enabled_rules().await.unwrap();
        assert_eq!(rules.len(), 3);

        // Unreadable config is a transport error: the run must abort.
        let missing = ConfigRuleStore::new("/nonexistent/assignmail.yaml");
        assert!(matches!(
            missing.list_enabled_rules().await,
            Err(EngineError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn create_is_deduplicated_by_source_message_id() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = JsonAssignmentStore::new(file.path());
        let new = NewAssignment {
            kind: AssignmentKind::Resource,
            practice: "Acme Co".to_string(),
            name: "55213".to_string(),
            revision_number: "1".to_string(),
            fields: BTreeMap::new(),
        };
        let first = store.create_assignment(new.clone(), "m1").await.unwrap();
        let second = store.create_assignment(new, "m1").await.unwrap();
        assert_eq!(first.id, second.id);

        let all: Vec<Assignment> =
            serde_json::from_str(&std::fs::read_to_string(file.path()).unwrap()).unwrap();
        assert_eq!(all.len(), 1);
    }
}
