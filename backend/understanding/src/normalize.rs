//! Response normalization.
//!
//! Turns whatever the analysis service returned into an [`AnalysisRecord`].
//! Coercion rules, one per field kind:
//!
//! - text fields must be JSON strings, anything else becomes `""`
//! - list fields must be JSON arrays; non-string entries are dropped and the
//!   remaining order is kept
//! - the name falls back to [`PLACEHOLDER_NAME`] when missing or empty
//! - the plain-language summary falls back from `plainLanguage` to `summary`
//!
//! A response is [`Normalization::Unrecognized`] when the name is the
//! placeholder, there are no instructions, and the summary is empty. This is a
//! heuristic: a real label with a placeholder-identical name and nothing else
//! would be misclassified.

use std::borrow::Cow;

use nutrilens_core::{AnalysisRecord, PLACEHOLDER_NAME, RawResponse};
use serde_json::{Map, Value};

/// Outcome of normalizing one raw response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalization {
    Recognized(AnalysisRecord),
    /// The service returned nothing usable; show the raw response instead.
    Unrecognized,
}

impl Normalization {
    pub fn record(&self) -> Option<&AnalysisRecord> {
        match self {
            Self::Recognized(record) => Some(record),
            Self::Unrecognized => None,
        }
    }
}

/// Normalize a raw response. Never fails.
pub fn normalize(raw: &RawResponse) -> Normalization {
    let empty = Map::new();
    let text = text_object(raw);
    let fields = text.as_deref().unwrap_or(&empty);

    let record = AnalysisRecord {
        name: name_field(fields),
        generic_name: text_field(fields, "genericName"),
        dosage: text_field(fields, "dosage"),
        frequency: text_field(fields, "frequency"),
        instructions: list_field(fields, "instructions"),
        warnings: list_field(fields, "warnings"),
        side_effects: list_field(fields, "sideEffects"),
        plain_language_summary: summary_field(fields),
    };

    if record.has_placeholder_name()
        && record.instructions.is_empty()
        && record.plain_language_summary.is_empty()
    {
        Normalization::Unrecognized
    } else {
        Normalization::Recognized(record)
    }
}

/// The `text` object of a response.
///
/// LLM-backed services often send the object as a JSON string, sometimes
/// inside a ```json fence; such strings are parsed. Free prose yields `None`.
fn text_object(raw: &RawResponse) -> Option<Cow<'_, Map<String, Value>>> {
    match raw.get("text")? {
        Value::Object(map) => Some(Cow::Borrowed(map)),
        Value::String(s) => match serde_json::from_str::<Value>(strip_code_fence(s)) {
            Ok(Value::Object(map)) => Some(Cow::Owned(map)),
            _ => None,
        },
        _ => None,
    }
}

fn strip_code_fence(s: &str) -> &str {
    let s = s.trim();
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn text_field(fields: &Map<String, Value>, key: &str) -> String {
    fields
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn list_field(fields: &Map<String, Value>, key: &str) -> Vec<String> {
    fields
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn name_field(fields: &Map<String, Value>) -> String {
    let name = text_field(fields, "medicationName");
    if name.is_empty() {
        PLACEHOLDER_NAME.to_string()
    } else {
        name
    }
}

fn summary_field(fields: &Map<String, Value>) -> String {
    let plain = text_field(fields, "plainLanguage");
    if plain.is_empty() {
        text_field(fields, "summary")
    } else {
        plain
    }
}
