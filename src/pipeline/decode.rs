//! Tolerant JSON extraction from model output.
//!
//! Small vision models wrap their JSON in prose, code fences, or cut it off
//! mid-string when they hit the token limit. Decoding therefore works on the
//! widest brace-delimited slice of the raw text and, when that fails to
//! parse, retries with a short ordered list of closing suffixes that mend the
//! most common truncation shapes (open string, open array of strings, open
//! nested object).

use crate::error::ItemError;
use serde_json::Value;

/// Suffixes appended in order to a candidate that fails to parse. Ordering
/// matters: earlier entries close fewer constructs, so the first success is
/// the least-invasive repair.
const REPAIR_SUFFIXES: [&str; 6] = ["}", "\"}", "\"]}", "\"}]}", "}}", "\"}}"];

/// Extract the first JSON object from raw model output.
///
/// Returns [`ItemError::NoJsonFound`] when no `{` exists at all, and
/// [`ItemError::Unparseable`] when the candidate cannot be parsed even after
/// every repair suffix. Repairs never run on input that parsed cleanly.
pub fn decode_response(raw: &str) -> Result<Value, ItemError> {
    let start = raw.find('{').ok_or(ItemError::NoJsonFound)?;
    let candidate = match raw.rfind('}') {
        Some(end) if end > start => &raw[start..=end],
        _ => &raw[start..],
    };

    let first_err = match serde_json::from_str::<Value>(candidate) {
        Ok(v) => return Ok(v),
        Err(e) => e,
    };

    for suffix in REPAIR_SUFFIXES {
        let mended = format!("{candidate}{suffix}");
        if let Ok(v) = serde_json::from_str::<Value>(&mended) {
            return Ok(v);
        }
    }

    Err(ItemError::Unparseable {
        detail: first_err.to_string(),
        candidate: candidate.to_string(),
    })
}
