//! Log Redaction Layer
//!
//! Scrubs bearer tokens, API keys in query strings, and inlined base64 image
//! data from strings before they are logged.

use regex::Regex;
use std::sync::LazyLock;

static BEARER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Bearer\s+[a-zA-Z0-9\-\._~+/]+=*").unwrap());
static QUERY_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([?&](?:api_?key|key|token)=)[^&\s]+").unwrap());
static GOOGLE_KEY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"AIza[0-9A-Za-z\-_]{35}").unwrap());
static DATA_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"data:([a-z]+/[a-z0-9.+\-]+);base64,([A-Za-z0-9+/]+=*)").unwrap());

/// Redacts sensitive patterns in a string.
pub fn redact_sensitive_data(input: &str) -> String {
    let redacted = BEARER_RE.replace_all(input, "Bearer [REDACTED_TOKEN]");
    let redacted = QUERY_KEY_RE.replace_all(&redacted, "${1}[REDACTED]");
    let redacted = GOOGLE_KEY_RE.replace_all(&redacted, "[REDACTED_KEY]");
    let redacted = DATA_URL_RE.replace_all(&redacted, |caps: &regex::Captures| {
        format!("data:{};base64,[{} chars]", &caps[1], caps[2].len())
    });
    redacted.into_owned()
}
