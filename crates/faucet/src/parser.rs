//! Extraction of JSON payloads from wallet tool output
//!
//! The wallet tool mixes banners and progress lines with its JSON answer, so
//! the first line that opens an object or array and decodes cleanly wins.

use crate::error::{FaucetError, FaucetResult};
use serde_json::{json, Value};

/// Parse captured wallet output.
///
/// Returns the first decodable JSON line, or `{"output": <trimmed text>}` when
/// the output carries no JSON. Blank output is a `MalformedResponse`.
pub fn parse_response(raw: &str) -> FaucetResult<Value> {
    for line in raw.lines() {
        let trimmed = line.trim_start();
        if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
            continue;
        }
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            return Ok(value);
        }
    }

    let text = raw.trim();
    if text.is_empty() {
        return Err(FaucetError::MalformedResponse(
            "wallet produced no output".to_string(),
        ));
    }

    Ok(json!({ "output": text }))
}

/// The message of an `{"error": ...}` payload, if that is what the wallet sent
pub fn wallet_error(value: &Value) -> Option<String> {
    match value.get("error")? {
        Value::String(msg) => Some(msg.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
