use crate::config::{FieldKind, KeywordMapping};
use regex::Regex;
use std::collections::BTreeMap;

/// Fields pulled out of one message body. Absent keys are omitted, never
/// populated with placeholder values; absence drives required-field checks
/// downstream.
pub type ExtractedFields = BTreeMap<FieldKind, String>;

/// Pre-compiled extraction patterns for one rule's keyword mappings,
/// built once per run and reused across every message the rule matches.
/// An unusable keyword is logged and dropped at compile time; its field is
/// simply never populated.
pub struct FieldExtractor {
    patterns: Vec<(FieldKind, Regex)>,
}

impl FieldExtractor {
    pub fn new(mappings: &[KeywordMapping]) -> Self {
        let mut patterns = Vec::with_capacity(mappings.len());
        for mapping in mappings {
            let pattern = format!(
                r"(?i)\b{}\s*[:\-]\s*([^\r\n]+)",
                regex::escape(&mapping.keyword)
            );
            match Regex::new(&pattern) {
                Ok(re) => patterns.push((mapping.field, re)),
                Err(e) => log::warn!("unusable keyword '{}': {e}", mapping.keyword),
            }
        }
        FieldExtractor { patterns }
    }

    /// Scan `body` for each mapped keyword followed by a separator (`:` or
    /// `-`) and capture the rest of that line, trimmed. If several mappings
    /// target the same field, the first one in mapping order that finds a
    /// value wins. Extraction never fails; a malformed body just yields an
    /// empty map.
    pub fn extract(&self, body: &str) -> ExtractedFields {
        let mut fields = ExtractedFields::new();
        for (field, re) in &self.patterns {
            if fields.contains_key(field) {
                continue;
            }
            if let Some(caps) = re.captures(body) {
                let value = caps[1].trim();
                if !value.is_empty() {
                    fields.insert(*field, value.to_string());
                }
            }
        }
        fields
    }
}
