use crate::error::EngineError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeResult {
    Processed,
    SkippedNoMatch,
    SkippedAmbiguous,
    Failed,
}

/// One per-message audit row. Outcomes are an append-only trail for
/// troubleshooting, never a dedup key: a message that failed and stayed
/// unread gets a fresh row on every retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingOutcome {
    pub message_id: String,
    pub rule_id: Option<String>,
    pub result: OutcomeResult,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

impl ProcessingOutcome {
    pub fn new(
        message_id: &str,
        rule_id: Option<&str>,
        result: OutcomeResult,
        detail: impl Into<String>,
    ) -> Self {
        ProcessingOutcome {
            message_id: message_id.to_string(),
            rule_id: rule_id.map(str::to_string),
            result,
            detail: detail.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Append-only outcome sink. Reading it back is an operator concern outside
/// this engine's write path.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn append(&self, outcome: &ProcessingOutcome) -> Result<(), EngineError>;
}

/// JSON-lines ledger file, one outcome per line.
pub struct JsonlLedger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlLedger {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        JsonlLedger {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl Ledger for JsonlLedger {
    async fn append(&self, outcome: &ProcessingOutcome) -> Result<(), EngineError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let line = serde_json::to_string(outcome)
            .map_err(|e| EngineError::Transport(e.to_string()))?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                EngineError::Transport(format!("ledger {}: {e}", self.path.display()))
            })?;
        writeln!(file, "{line}")
            .map_err(|e| EngineError::Transport(format!("ledger {}: {e}", self.path.display())))
    }
}
