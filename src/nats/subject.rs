// Subject template expansion and validation.
//
// Pure functions over the subject string; no shared state.

use crate::signal::Signal;
use std::collections::HashMap;

/// Expands template placeholders in a subject string.
///
/// A single left-to-right pass: `${signal}` is substituted first, then
/// every `${attr:key}` occurrence for every key present in `attrs`.
/// Placeholders with no matching attribute are left verbatim.
pub fn expand_subject(template: &str, signal: Signal, attrs: &HashMap<String, String>) -> String {
    let mut result = template.replace("${signal}", signal.as_str());
    for (key, value) in attrs {
        let placeholder = format!("${{attr:{key}}}");
        result = result.replace(&placeholder, value);
    }
    result
}

/// Whether a subject contains the NATS wildcard characters `*` or `>`.
///
/// Wildcard subjects are legal for subscription only; publishing to one
/// is always an error.
pub fn contains_wildcard(subject: &str) -> bool {
    subject.chars().any(|c| c == '*' || c == '>')
}

/// Validates the subject character set.
///
/// Valid subjects are non-empty and limited to alphanumerics, dots,
/// dashes, underscores, and the wildcard characters.
pub fn is_valid_subject(subject: &str) -> bool {
    !subject.is_empty()
        && subject
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '*' | '>'))
}
