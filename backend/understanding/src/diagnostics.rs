use nutrilens_core::RawResponse;
use serde_json::Value;

/// What to show when a response could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub headline: String,
    pub detail: String,
    /// The raw response, pretty-printed.
    pub raw_pretty: String,
}

impl Diagnostic {
    pub fn for_unrecognized(raw: &RawResponse) -> Self {
        Self {
            headline: "Analysis Diagnostics".to_string(),
            detail: explain(raw),
            raw_pretty: pretty_raw(raw),
        }
    }
}

pub fn pretty_raw(raw: &RawResponse) -> String {
    serde_json::to_string_pretty(raw).unwrap_or_else(|_| raw.to_string())
}

fn explain(raw: &RawResponse) -> String {
    let base = "The AI response did not include parsed medication fields.";
    let hint = match raw {
        Value::Object(map) if map.is_empty() => "The response was an empty object.".to_string(),
        Value::Object(map) => match map.get("text") {
            Some(Value::String(_)) => {
                "The service returned free text instead of structured fields.".to_string()
            }
            Some(Value::Object(_)) => {
                "No medication name, instructions or summary were found.".to_string()
            }
            Some(_) => "The `text` field has an unexpected type.".to_string(),
            None => {
                let keys: Vec<&str> = map.keys().map(String::as_str).collect();
                format!("No `text` field; top-level keys: {}.", keys.join(", "))
            }
        },
        _ => "The response is not a JSON object.".to_string(),
    };
    format!("{base} {hint}")
}
