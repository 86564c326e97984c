//! Error types for the scribe-vision library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ScribeError`] — **Fatal**: the run cannot proceed at all (bad input
//!   path, invalid configuration, output directory not writable). Returned as
//!   `Err(ScribeError)` from the top-level `analyze*` functions.
//!
//! * [`ItemError`] — **Non-fatal**: a single screenshot failed (inference
//!   server glitch, unparseable model output, missing required field) but the
//!   rest of the batch is fine. Collected into
//!   [`crate::record::BatchResult`] so callers can inspect partial success
//!   rather than losing the whole batch to one bad item.
//!
//! [`ItemError`] also encodes the retry taxonomy: transport, decode, and
//! validation failures are retryable within an item's attempt budget; file
//! I/O failures and cancellation are not.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the scribe-vision library.
///
/// Item-level failures use [`ItemError`] and are aggregated in
/// [`crate::record::BatchResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum ScribeError {
    /// Input image was not found at the given path.
    #[error("image file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Builder validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Could not create the HTTP client for the inference service.
    #[error("failed to build inference client: {0}")]
    ClientBuildFailed(String),

    /// A single-image run exhausted its attempts. Batch runs collect these
    /// in [`crate::record::BatchResult`] instead.
    #[error("analysis failed: {0}")]
    Analysis(#[from] ItemError),

    /// Unexpected internal error (task panic, runtime failure).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single analyzed item.
///
/// The variants group into the four spec'd classes: transport (`Server`,
/// `Connection`, `EmptyResponse`), decode (`NoJsonFound`, `Unparseable`),
/// validation (`MissingRequiredField`) and I/O (`Io`). The first three
/// classes are retried up to the per-item budget; I/O failures and
/// cancellation terminate the item immediately.
#[derive(Debug, Clone, Error)]
pub enum ItemError {
    // ── Transport ─────────────────────────────────────────────────────────
    /// The inference server answered with a non-2xx status.
    #[error("inference server returned status {status}: {body}")]
    Server { status: u16, body: String },

    /// Could not reach the inference server (connection refused, timeout).
    #[error("inference server connection error: {0}")]
    Connection(String),

    /// The server answered 2xx but the completion text was empty.
    #[error("inference server returned an empty completion")]
    EmptyResponse,

    // ── Decode ────────────────────────────────────────────────────────────
    /// The completion contains no `{` at all.
    #[error("no JSON object found in model response")]
    NoJsonFound,

    /// The candidate slice failed to parse even after all repair suffixes.
    ///
    /// `candidate` carries the raw slice for diagnostics; it is logged, not
    /// displayed, to keep error lines readable.
    #[error("failed to parse model JSON: {detail}")]
    Unparseable { detail: String, candidate: String },

    // ── Validation ────────────────────────────────────────────────────────
    /// A structurally valid decode is still unusable without this field.
    #[error("required field '{field}' is missing or empty")]
    MissingRequiredField { field: &'static str },

    // ── I/O ───────────────────────────────────────────────────────────────
    /// File read/write failed for this item. Fatal for the item only.
    #[error("i/o error: {0}")]
    Io(String),

    /// The batch was cancelled before this attempt started.
    #[error("analysis cancelled")]
    Cancelled,
}

impl ItemError {
    /// Whether the per-item retry loop may attempt again after this error.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ItemError::Io(_) | ItemError::Cancelled)
    }
}

impl From<std::io::Error> for ItemError {
    fn from(e: std::io::Error) -> Self {
        ItemError::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_and_decode_errors_are_retryable() {
        assert!(ItemError::Server {
            status: 503,
            body: "overloaded".into()
        }
        .is_retryable());
        assert!(ItemError::Connection("refused".into()).is_retryable());
        assert!(ItemError::EmptyResponse.is_retryable());
        assert!(ItemError::NoJsonFound.is_retryable());
        assert!(ItemError::Unparseable {
            detail: "EOF".into(),
            candidate: "{".into()
        }
        .is_retryable());
        assert!(ItemError::MissingRequiredField {
            field: "short_description"
        }
        .is_retryable());
    }

    #[test]
    fn io_and_cancel_are_terminal() {
        assert!(!ItemError::Io("disk full".into()).is_retryable());
        assert!(!ItemError::Cancelled.is_retryable());
    }

    #[test]
    fn server_error_display() {
        let e = ItemError::Server {
            status: 500,
            body: "model not loaded".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("500"));
        assert!(msg.contains("model not loaded"));
    }

    #[test]
    fn missing_field_display() {
        let e = ItemError::MissingRequiredField {
            field: "detailed_analysis",
        };
        assert!(e.to_string().contains("detailed_analysis"));
    }
}
