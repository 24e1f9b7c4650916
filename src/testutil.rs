//! In-memory fake collaborators shared by the unit tests.

use crate::assignment::{Assignment, AssignmentKind, SaStatus};
use crate::config::{ActionType, EmailRule, FieldKind, KeywordMapping, SenderPattern};
use crate::error::EngineError;
use crate::ledger::{Ledger, ProcessingOutcome};
use crate::store::{AssignmentStore, Mailbox, Message, NewAssignment, RuleStore};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

pub fn message(id: &str, from: &str, subject: &str, body: &str) -> Message {
    Message {
        id: id.to_string(),
        from: from.to_string(),
        subject: subject.to_string(),
        body: body.to_string(),
    }
}

pub fn make_rule(
    id: &str,
    sender: SenderPattern,
    subject: &str,
    mappings: Vec<(&str, FieldKind)>,
    action: ActionType,
) -> EmailRule {
    EmailRule {
        id: id.to_string(),
        name: id.to_string(),
        sender_pattern: sender,
        subject_pattern: subject.to_string(),
        mappings: mappings
            .into_iter()
            .map(|(keyword, field)| KeywordMapping {
                keyword: keyword.to_string(),
                field,
            })
            .collect(),
        action,
        enabled: true,
    }
}

#[derive(Default)]
pub struct MemoryMailbox {
    messages: Mutex<Vec<(Message, bool)>>,
    pub fail_list: AtomicBool,
    pub fail_mark_read: AtomicBool,
}

impl MemoryMailbox {
    pub fn new(messages: Vec<Message>) -> Self {
        MemoryMailbox {
            messages: Mutex::new(messages.into_iter().map(|m| (m, false)).collect()),
            fail_list: AtomicBool::new(false),
            fail_mark_read: AtomicBool::new(false),
        }
    }

    pub fn unread_ids(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, read)| !read)
            .map(|(m, _)| m.id.clone())
            .collect()
    }

    pub fn read_ids(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, read)| *read)
            .map(|(m, _)| m.id.clone())
            .collect()
    }
}

#[async_trait]
impl Mailbox for MemoryMailbox {
    async fn list_unread(&self) -> Result<Vec<Message>, EngineError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(EngineError::Transport("mailbox unreachable".to_string()));
        }
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, read)| !read)
            .map(|(m, _)| m.clone())
            .collect())
    }

    async fn mark_read(&self, message_id: &str) -> Result<(), EngineError> {
        if self.fail_mark_read.load(Ordering::SeqCst) {
            return Err(EngineError::Transport("mark-read failed".to_string()));
        }
        let mut messages = self.messages.lock().unwrap();
        match messages.iter_mut().find(|(m, _)| m.id == message_id) {
            Some((_, read)) => {
                *read = true;
                Ok(())
            }
            None => Err(EngineError::Transport(format!(
                "message {message_id} not found"
            ))),
        }
    }
}

pub struct StaticRuleStore {
    rules: Mutex<Vec<EmailRule>>,
    pub fail: AtomicBool,
}

impl StaticRuleStore {
    pub fn new(rules: Vec<EmailRule>) -> Self {
        StaticRuleStore {
            rules: Mutex::new(rules),
            fail: AtomicBool::new(false),
        }
    }

    /// Swap the rule set, as the authoring UI would between runs.
    pub fn set_rules(&self, rules: Vec<EmailRule>) {
        *self.rules.lock().unwrap() = rules;
    }
}

#[async_trait]
impl RuleStore for StaticRuleStore {
    async fn list_enabled_rules(&self) -> Result<Vec<EmailRule>, EngineError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::Transport("rule store unreachable".to_string()));
        }
        Ok(self
            .rules
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.enabled)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryAssignmentStore {
    inner: Mutex<Vec<Assignment>>,
    pub fail: AtomicBool,
}

impl MemoryAssignmentStore {
    pub fn seed_sa(&self, practice: &str, name: &str, status: SaStatus, revision: &str) -> String {
        let mut inner = self.inner.lock().unwrap();
        let id = format!("asg-{}", inner.len() + 1);
        inner.push(Assignment {
            id: id.clone(),
            kind: AssignmentKind::Sa,
            practice: practice.to_string(),
            name: name.to_string(),
            status,
            revision_number: revision.to_string(),
            fields: BTreeMap::new(),
            source_message_id: None,
        });
        id
    }

    pub fn all(&self) -> Vec<Assignment> {
        self.inner.lock().unwrap().clone()
    }

    pub fn status_of(&self, id: &str) -> SaStatus {
        self.inner
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .map(|a| a.status)
            .expect("assignment present")
    }

    pub fn revision_of(&self, id: &str) -> String {
        self.inner
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .map(|a| a.revision_number.clone())
            .expect("assignment present")
    }
}

#[async_trait]
impl AssignmentStore for MemoryAssignmentStore {
    async fn find_sa_assignments(
        &self,
        practice: &str,
        name: &str,
    ) -> Result<Vec<Assignment>, EngineError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::Transport(
                "assignment store unreachable".to_string(),
            ));
        }
        Ok(self
            .inner
            .lock()
            .unwrap()
            .iter()
            .filter(|a| {
                a.kind == AssignmentKind::Sa
                    && a.practice.eq_ignore_ascii_case(practice)
                    && a.name.eq_ignore_ascii_case(name)
            })
            .cloned()
            .collect())
    }

    async fn create_assignment(
        &self,
        new: NewAssignment,
        source_message_id: &str,
    ) -> Result<Assignment, EngineError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::Transport(
                "assignment store unreachable".to_string(),
            ));
        }
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner
            .iter()
            .find(|a| a.source_message_id.as_deref() == Some(source_message_id))
        {
            return Ok(existing.clone());
        }
        let assignment = Assignment {
            id: format!("asg-{}", inner.len() + 1),
            kind: new.kind,
            practice: new.practice,
            name: new.name,
            status: SaStatus::Assigned,
            revision_number: new.revision_number,
            fields: new.fields,
            source_message_id: Some(source_message_id.to_string()),
        };
        inner.push(assignment.clone());
        Ok(assignment)
    }

    async fn update_status(
        &self,
        id: &str,
        from: SaStatus,
        to: SaStatus,
    ) -> Result<bool, EngineError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(assignment) = inner.iter_mut().find(|a| a.id == id) else {
            return Ok(false);
        };
        if assignment.status != from {
            return Ok(false);
        }
        assignment.status = to;
        Ok(true)
    }
}

#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<Vec<ProcessingOutcome>>,
}

impl MemoryLedger {
    pub fn entries(&self) -> Vec<ProcessingOutcome> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn append(&self, outcome: &ProcessingOutcome) -> Result<(), EngineError> {
        self.entries.lock().unwrap().push(outcome.clone());
        Ok(())
    }
}
