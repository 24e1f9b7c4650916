use crate::config::RequiredFields;
use crate::dispatch::Dispatcher;
use crate::error::EngineError;
use crate::extractor::FieldExtractor;
use crate::ledger::{Ledger, OutcomeResult, ProcessingOutcome};
use crate::matcher::{self, MatchOutcome};
use crate::store::{AssignmentStore, Mailbox, Message, RuleStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Counts for one processing pass, returned to the scheduler and to the
/// manual "run now" trigger.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub processed: usize,
    pub skipped_no_match: usize,
    pub skipped_ambiguous: usize,
    pub failed: usize,
    /// True when another run already held the lock and this one did nothing.
    pub overlap: bool,
}

impl RunSummary {
    fn begin() -> Self {
        let now = Utc::now();
        RunSummary {
            started: now,
            finished: now,
            processed: 0,
            skipped_no_match: 0,
            skipped_ambiguous: 0,
            failed: 0,
            overlap: false,
        }
    }

    fn skipped_overlap() -> Self {
        RunSummary {
            overlap: true,
            ..RunSummary::begin()
        }
    }

    pub fn total(&self) -> usize {
        self.processed + self.skipped_no_match + self.skipped_ambiguous + self.failed
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.overlap {
            return write!(f, "run skipped: another run is in progress");
        }
        write!(
            f,
            "run complete: {} processed, {} skipped (no match), {} skipped (ambiguous), {} failed",
            self.processed, self.skipped_no_match, self.skipped_ambiguous, self.failed
        )
    }
}

/// One-pass coordinator: fetch unread, then per message
/// match -> extract -> dispatch -> ledger -> mark-read. A message is marked
/// read only after its action applied; anything that fails stays unread and
/// is retried on the next scheduled run.
pub struct Engine {
    mailbox: Arc<dyn Mailbox>,
    rule_store: Arc<dyn RuleStore>,
    dispatcher: Dispatcher,
    ledger: Arc<dyn Ledger>,
    // In-memory only: a lock abandoned by a crashed process must never block
    // future runs.
    run_lock: tokio::sync::Mutex<()>,
}

impl Engine {
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        rule_store: Arc<dyn RuleStore>,
        assignment_store: Arc<dyn AssignmentStore>,
        ledger: Arc<dyn Ledger>,
        required_fields: RequiredFields,
    ) -> Self {
        Engine {
            mailbox,
            rule_store,
            dispatcher: Dispatcher::new(assignment_store, required_fields),
            ledger,
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Run one processing pass. Never runs concurrently with itself:
    /// triggering while a run is active is a safe no-op. Only transport
    /// failures while loading rules or listing unread abort the pass.
    pub async fn run_once(&self) -> Result<RunSummary, EngineError> {
        let _guard = match self.run_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                log::info!("run already in progress, skipping this trigger");
                return Ok(RunSummary::skipped_overlap());
            }
        };

        // Fresh rule set every pass; rules edited since the last run apply
        // immediately.
        let rules = self.rule_store.list_enabled_rules().await?;
        let unread = self.mailbox.list_unread().await?;
        log::info!(
            "processing {} unread message(s) against {} enabled rule(s)",
            unread.len(),
            rules.len()
        );

        // Compile each rule's extraction patterns once for the whole pass.
        let extractors: HashMap<&str, FieldExtractor> = rules
            .iter()
            .map(|rule| (rule.id.as_str(), FieldExtractor::new(&rule.mappings)))
            .collect();

        let mut summary = RunSummary::begin();
        for message in &unread {
            let outcome = self.process_message(message, &rules, &extractors).await;
            match outcome.result {
                OutcomeResult::Processed => summary.processed += 1,
                OutcomeResult::SkippedNoMatch => summary.skipped_no_match += 1,
                OutcomeResult::SkippedAmbiguous => summary.skipped_ambiguous += 1,
                OutcomeResult::Failed => summary.failed += 1,
            }
            // The ledger is audit-only; losing a row never blocks the run.
            if let Err(e) = self.ledger.append(&outcome).await {
                log::error!("ledger append failed for message {}: {e}", message.id);
            }
        }
        summary.finished = Utc::now();
        log::info!("{summary}");
        Ok(summary)
    }

    /// Handle one message in isolation. Every failure is downgraded to a
    /// ledger row; nothing here can abort the surrounding run.
    async fn process_message(
        &self,
        message: &Message,
        rules: &[crate::config::EmailRule],
        extractors: &HashMap<&str, FieldExtractor>,
    ) -> ProcessingOutcome {
        match matcher::match_message(message, rules) {
            MatchOutcome::NoMatch => {
                log::debug!("message {}: no enabled rule matched", message.id);
                ProcessingOutcome::new(
                    &message.id,
                    None,
                    OutcomeResult::SkippedNoMatch,
                    "no enabled rule matched",
                )
            }
            MatchOutcome::Ambiguous(matched) => {
                let names: Vec<&str> = matched.iter().map(|r| r.name.as_str()).collect();
                log::warn!(
                    "message {}: {} rules matched ({}); leaving unread",
                    message.id,
                    matched.len(),
                    names.join(", ")
                );
                ProcessingOutcome::new(
                    &message.id,
                    None,
                    OutcomeResult::SkippedAmbiguous,
                    format!("{} rules matched: {}", matched.len(), names.join(", ")),
                )
            }
            MatchOutcome::Unique(rule) => {
                let fields = extractors
                    .get(rule.id.as_str())
                    .map(|extractor| extractor.extract(&message.body))
                    .unwrap_or_default();
                log::debug!(
                    "message {}: rule '{}' extracted {} field(s)",
                    message.id,
                    rule.name,
                    fields.len()
                );
                match self.dispatcher.dispatch(rule, &fields, &message.id).await {
                    Ok(result) => match self.mailbox.mark_read(&message.id).await {
                        Ok(()) => ProcessingOutcome::new(
                            &message.id,
                            Some(&rule.id),
                            OutcomeResult::Processed,
                            result.to_string(),
                        ),
                        Err(e) => {
                            // The action applied but the message stays
                            // unread; the next run's retry is deduplicated
                            // at the assignment store.
                            log::error!(
                                "message {}: action applied but mark-read failed: {e}",
                                message.id
                            );
                            ProcessingOutcome::new(
                                &message.id,
                                Some(&rule.id),
                                OutcomeResult::Failed,
                                format!("applied ({result}) but mark-read failed: {e}"),
                            )
                        }
                    },
                    Err(e) => {
                        log::warn!(
                            "message {}: rule '{}' dispatch failed: {e}",
                            message.id,
                            rule.name
                        );
                        ProcessingOutcome::new(
                            &message.id,
                            Some(&rule.id),
                            OutcomeResult::Failed,
                            e.to_string(),
                        )
                    }
                }
            }
        }
    }
}

/// Interval scheduler around `run_once`. Returns as soon as `shutdown` is
/// notified, even mid-wait; an operator's ctrl-c never has to sit out the
/// rest of a poll interval. A run aborted by a transport failure is logged
/// and retried from the same unread set on the next tick.
pub async fn run_scheduled(engine: &Engine, interval: Duration, shutdown: &Notify) {
    let mut tick = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = tick.tick() => {
                if let Err(e) = engine.run_once().await {
                    log::error!("run aborted: {e}");
                }
            }
            _ = shutdown.notified() => {
                log::info!("shutting down");
                return;
            }
        }
    }
}
