//! Text extraction: the local OCR collaborator boundary.
//!
//! The pipeline treats OCR as a black box with a three-field output
//! contract: the full recognized text, a prompt-safe bounded version, and a
//! short list of salient snippets. Behind the boundary sits the `tesseract`
//! binary invoked as a subprocess; any failure — missing binary, non-zero
//! exit, timeout — degrades to an empty [`OcrText`] rather than failing the
//! item, since the vision model can still analyze the pixels alone.
//!
//! The tool writes its result next to a temp-dir output base; the `TempDir`
//! guard removes the artifact on every exit path, including panics.

use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::debug;

/// Upper bound, in bytes, of the OCR text interpolated into a prompt.
const PROMPT_TEXT_BUDGET: usize = 4000;

/// Maximum number of salient snippets kept.
const MAX_SNIPPETS: usize = 30;

/// Longest snippet worth keeping, in characters.
const MAX_SNIPPET_CHARS: usize = 50;

/// How long the external tool may run before being abandoned.
const OCR_TIMEOUT: Duration = Duration::from_secs(10);

/// Output contract of the text extractor.
#[derive(Debug, Clone, Default)]
pub struct OcrText {
    /// Full recognized text, kept verbatim when non-empty.
    pub raw_text: String,
    /// `raw_text` bounded to a fixed budget for prompt inclusion.
    pub prompt_text: String,
    /// Short, salient fragments: file names, window titles, UI labels.
    pub snippets: Vec<String>,
}

impl OcrText {
    pub fn is_empty(&self) -> bool {
        self.raw_text.is_empty()
    }

    /// Build the three-field contract from raw recognized text.
    fn from_raw(raw: String) -> Self {
        let cleaned: String = raw
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        let prompt_text = truncate_at_char_boundary(&cleaned, PROMPT_TEXT_BUDGET);
        let snippets = cleaned
            .lines()
            .filter(|l| l.chars().count() >= 3 && l.chars().count() <= MAX_SNIPPET_CHARS)
            .take(MAX_SNIPPETS)
            .map(String::from)
            .collect();

        Self {
            raw_text: cleaned,
            prompt_text,
            snippets,
        }
    }
}

fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

/// Run the external OCR tool against `image`. Never fails: any problem
/// yields an empty [`OcrText`].
pub async fn extract_text(image: &Path, language: &str) -> OcrText {
    match try_extract(image, language).await {
        Some(ocr) => ocr,
        None => {
            debug!("OCR unavailable or failed for {}", image.display());
            OcrText::default()
        }
    }
}

async fn try_extract(image: &Path, language: &str) -> Option<OcrText> {
    // Dropping the TempDir removes the tool's output file on every path out
    // of this function.
    let tmp = TempDir::new().ok()?;
    let out_base = tmp.path().join("ocr");
    let out_file = tmp.path().join("ocr.txt");

    let child = Command::new("tesseract")
        .arg(image)
        .arg(&out_base)
        .args(["--psm", "6", "-l", language])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .ok()?;

    let status = tokio::time::timeout(OCR_TIMEOUT, child.wait_with_output())
        .await
        .ok()?
        .ok()?;
    if !status.status.success() {
        return None;
    }

    let text = tokio::fs::read_to_string(&out_file).await.ok()?;
    if text.trim().is_empty() {
        return None;
    }
    debug!("OCR extracted {} bytes from {}", text.len(), image.display());
    Some(OcrText::from_raw(text))
}
