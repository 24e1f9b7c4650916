pub mod assignment;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod ledger;
pub mod matcher;
pub mod store;

#[cfg(test)]
mod testutil;

pub use assignment::{Assignment, AssignmentKind, SaStatus};
pub use config::{ActionType, Config, EmailRule, FieldKind, KeywordMapping, SenderPattern};
pub use dispatch::{DispatchResult, Dispatcher};
pub use engine::{Engine, RunSummary};
pub use error::EngineError;
pub use extractor::{ExtractedFields, FieldExtractor};
pub use ledger::{Ledger, OutcomeResult, ProcessingOutcome};
pub use store::{AssignmentStore, Mailbox, Message, RuleStore};
