//! Tagged-field extraction from model replies.
//!
//! Replies are asked to carry their fields in HTML-ish tags
//! (`<key>value</key>`). Parsing never panics on malformed text; a failed
//! parse yields a correction message suitable for sending straight back to
//! the model as a user turn.

use crate::error::ParseError;
use std::collections::HashMap;

/// Extract every `<key>…</key>` span for each requested key.
///
/// Matching is non-greedy and spans newlines; values are trimmed. Presence
/// is decided by the tag pair, so an empty `<key></key>` yields an empty
/// value. Keys with no match are absent from the result.
pub fn extract_tags(text: &str, keys: &[&str]) -> HashMap<String, Vec<String>> {
    let mut found = HashMap::new();
    for key in keys {
        let pattern = format!("(?s)<{k}>(.*?)</{k}>", k = regex::escape(key));
        let Ok(re) = regex::Regex::new(&pattern) else {
            continue;
        };
        let values: Vec<String> = re
            .captures_iter(text)
            .filter_map(|cap| cap.get(1))
            .map(|m| m.as_str().trim().to_string())
            .collect();
        if !values.is_empty() {
            found.insert(key.to_string(), values);
        }
    }
    found
}

/// The outcome of one structured-parse attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOutcome {
    /// The extracted fields, one value per key.
    pub fields: HashMap<String, String>,
    /// Whether every required key was present exactly once (or merged).
    pub valid: bool,
    /// Correction text describing what was wrong, empty when valid.
    pub correction: String,
}

/// Parse `required` and `optional` tagged fields out of `text`.
///
/// A missing required key or (without `merge_multiple`) a repeated key marks
/// the outcome invalid and appends a line to the correction message. Repeated
/// values merge with newlines when `merge_multiple` is set; otherwise the
/// first value is kept alongside the complaint.
pub fn parse_tags(
    text: &str,
    required: &[&str],
    optional: &[&str],
    merge_multiple: bool,
) -> ParseOutcome {
    let all_keys: Vec<&str> = required.iter().chain(optional).copied().collect();
    let mut found = extract_tags(text, &all_keys);

    let mut fields = HashMap::new();
    let mut complaints = Vec::new();

    for key in &all_keys {
        let Some(values) = found.remove(*key) else {
            if required.contains(key) {
                complaints.push(format!("Missing the key <{key}> in the answer."));
            }
            continue;
        };
        if values.len() > 1 && !merge_multiple {
            complaints.push(format!(
                "Found multiple instances of the key {key}. You should have only one of them."
            ));
            // Keep the first value so downstream code can still inspect it.
            fields.insert(key.to_string(), values[0].clone());
        } else {
            fields.insert(key.to_string(), values.join("\n"));
        }
    }

    ParseOutcome {
        fields,
        valid: complaints.is_empty(),
        correction: complaints.join("\n"),
    }
}

/// Like [`parse_tags`], but an invalid outcome becomes a [`ParseError`]
/// carrying the correction message.
pub fn parse_tags_strict(
    text: &str,
    required: &[&str],
    optional: &[&str],
    merge_multiple: bool,
) -> Result<HashMap<String, String>, ParseError> {
    let outcome = parse_tags(text, required, optional, merge_multiple);
    if outcome.valid {
        Ok(outcome.fields)
    } else {
        Err(ParseError(outcome.correction))
    }
}
