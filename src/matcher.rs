use crate::config::EmailRule;
use crate::store::Message;

/// Result of matching one message against the enabled rule set.
#[derive(Debug)]
pub enum MatchOutcome<'a> {
    /// No enabled rule matched; the message stays unread (it may match a
    /// rule added later).
    NoMatch,
    Unique(&'a EmailRule),
    /// More than one enabled rule matched. No action is taken: safety over
    /// throughput.
    Ambiguous(Vec<&'a EmailRule>),
}

/// Pure match over sender and subject. Disabled rules are excluded before
/// the predicates run.
pub fn match_message<'a>(message: &Message, rules: &'a [EmailRule]) -> MatchOutcome<'a> {
    let matched: Vec<&EmailRule> = rules
        .iter()
        .filter(|rule| rule.enabled && rule_matches(rule, message))
        .collect();
    match matched.len() {
        0 => MatchOutcome::NoMatch,
        1 => MatchOutcome::Unique(matched[0]),
        _ => MatchOutcome::Ambiguous(matched),
    }
}

fn rule_matches(rule: &EmailRule, message: &Message) -> bool {
    if !rule.sender_pattern.matches(&message.from) {
        return false;
    }
    // Case-insensitive substring; an empty pattern matches every subject.
    message
        .subject
        .to_lowercase()
        .contains(&rule.subject_pattern.to_lowercase())
}
