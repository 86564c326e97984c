//! Top-level analysis entry points and the per-item pipeline.
//!
//! [`analyze_image`] handles one screenshot; [`analyze_batch`] runs many with
//! bounded concurrency via [`crate::batch`]. Both funnel into
//! [`process_item`], which owns the full per-item sequence: encode the image,
//! run local OCR, then a bounded retry loop of prompt → inference → decode →
//! validate, and finally merge metadata and persist the record next to the
//! screenshot.
//!
//! Persistence is atomic: the record is written to a temp file in the target
//! directory and renamed into place, so a crash mid-write never leaves a
//! half-written `.json` that a later incomplete-scan would trust.

use crate::batch;
use crate::config::AnalysisConfig;
use crate::error::{ItemError, ScribeError};
use crate::pipeline::client::InferenceClient;
use crate::pipeline::decode::decode_response;
use crate::pipeline::merge::merge_metadata;
use crate::pipeline::ocr::{extract_text, OcrText};
use crate::pipeline::preprocess::encode_image;
use crate::pipeline::validate::validate;
use crate::prompts::render_prompt;
use crate::record::{AnalysisRequest, BatchResult, CanonicalRecord, ExistingMetadata};
use crate::session::SessionContext;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Analyze a single screenshot and persist its sibling record.
///
/// Carried-over metadata is read from an existing sibling `.json` when one is
/// present, so re-analysis keeps the original capture-time facts.
pub async fn analyze_image(
    image_path: impl AsRef<Path>,
    config: &AnalysisConfig,
) -> Result<CanonicalRecord, ScribeError> {
    let image_path = image_path.as_ref();
    if tokio::fs::metadata(image_path).await.is_err() {
        return Err(ScribeError::FileNotFound {
            path: image_path.to_path_buf(),
        });
    }

    let mut request = AnalysisRequest::new(image_path);
    if let Some(existing) = load_existing_metadata(image_path).await {
        request = request.with_existing(existing);
    }

    let client = InferenceClient::new(config)?;
    let session = SessionContext::from_env();
    let record = process_item(&client, &session, request, config).await?;
    Ok(record)
}

/// Analyze a list of screenshots with bounded concurrency.
pub async fn analyze_batch(
    requests: Vec<AnalysisRequest>,
    config: &AnalysisConfig,
) -> Result<BatchResult, ScribeError> {
    batch::run_batch(requests, config).await
}

/// Read carried-over metadata from an existing sibling record, if any.
pub async fn load_existing_metadata(image_path: &Path) -> Option<ExistingMetadata> {
    let sibling = record_path(image_path);
    let bytes = tokio::fs::read(&sibling).await.ok()?;
    let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let existing = ExistingMetadata::from_record_value(&value);
    if existing.is_empty() {
        None
    } else {
        Some(existing)
    }
}

/// Where the record for a screenshot lives: same directory, same stem,
/// `.json` extension.
pub fn record_path(image_path: &Path) -> PathBuf {
    image_path.with_extension("json")
}

/// The full per-item pipeline. Item-scoped failures come back as
/// [`ItemError`] so batch runs can aggregate them.
pub(crate) async fn process_item(
    client: &InferenceClient,
    session: &SessionContext,
    request: AnalysisRequest,
    config: &AnalysisConfig,
) -> Result<CanonicalRecord, ItemError> {
    let image_path = request.image_path.as_path();
    debug!(path = %image_path.display(), "processing item");

    let image_b64 = encode_image(image_path, config.max_edge).await?;
    let ocr = if config.ocr_enabled {
        extract_text(image_path, &config.ocr_language).await
    } else {
        OcrText::default()
    };

    let mut last_err = ItemError::EmptyResponse;
    for attempt in 0..=config.max_retries {
        if config.cancel.load(Ordering::SeqCst) {
            return Err(ItemError::Cancelled);
        }
        if attempt > 0 {
            let delay = backoff_delay_ms(config.retry_backoff_ms, attempt);
            warn!(
                path = %image_path.display(),
                attempt,
                max = config.max_retries,
                delay_ms = delay,
                "retrying after {last_err}"
            );
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let prompt = render_prompt(session, &ocr, attempt > 0);
        let outcome = async {
            let raw = client.generate(config, &prompt, &image_b64).await?;
            let decoded = decode_response(&raw)?;
            validate(&decoded)
        }
        .await;

        match outcome {
            Ok(mut record) => {
                merge_metadata(&mut record, request.existing.as_ref(), session, &ocr);
                persist_record(image_path, &record).await?;
                info!(
                    path = %image_path.display(),
                    category = %record.category,
                    score = record.overall_activity_score,
                    "record saved"
                );
                return Ok(record);
            }
            Err(err) if err.is_retryable() => last_err = err,
            Err(err) => return Err(err),
        }
    }

    Err(last_err)
}

/// Delay before retry `attempt` (1-based): base doubles each attempt. The
/// exponent is capped so an extreme retry budget saturates instead of
/// overflowing the shift.
fn backoff_delay_ms(base_ms: u64, attempt: u32) -> u64 {
    let exponent = attempt.saturating_sub(1).min(63);
    base_ms.saturating_mul(1u64 << exponent)
}

/// Write the record atomically next to its screenshot.
async fn persist_record(image_path: &Path, record: &CanonicalRecord) -> Result<(), ItemError> {
    let final_path = record_path(image_path);
    let tmp_path = final_path.with_extension("json.tmp");

    let body = serde_json::to_vec_pretty(record)
        .map_err(|e| ItemError::Io(format!("serialize record: {e}")))?;
    tokio::fs::write(&tmp_path, &body).await?;
    if let Err(e) = tokio::fs::rename(&tmp_path, &final_path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }
    Ok(())
}
