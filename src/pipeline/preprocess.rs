//! Image preprocessing: bounded-resolution re-encode + base64 for transport.
//!
//! Screenshots come off modern displays at 3000+ px wide; a vision model
//! reads them just as well around 1280 px on the long edge, and the upload is
//! a fraction of the size. JPEG is chosen over PNG here — screenshots are the
//! one case where mild lossy compression barely hurts model accuracy, and
//! the base64 payload shrinks 3–5×.
//!
//! Preprocessing failure is non-fatal by contract: if the image cannot be
//! decoded or re-encoded, the original file bytes are sent unmodified. The
//! whole transform happens in memory, so there is no temporary artifact to
//! clean up.

use crate::error::ItemError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::imageops::FilterType;
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, warn};

/// Load, bound, and base64-encode an image for the inference request.
///
/// Decoding and resizing are CPU-bound, so the work runs on the blocking
/// pool. Only the file read can fail; every image-processing problem falls
/// back to encoding the original bytes.
pub async fn encode_image(path: &Path, max_edge: u32) -> Result<String, ItemError> {
    let bytes = tokio::fs::read(path).await?;
    let path_display = path.display().to_string();

    tokio::task::spawn_blocking(move || {
        match reencode_bounded(&bytes, max_edge) {
            Ok(jpeg) => {
                debug!(
                    "preprocessed {path_display}: {} → {} bytes",
                    bytes.len(),
                    jpeg.len()
                );
                STANDARD.encode(jpeg)
            }
            Err(e) => {
                warn!("preprocess failed for {path_display}, sending original: {e}");
                STANDARD.encode(&bytes)
            }
        }
    })
    .await
    .map_err(|e| ItemError::Io(format!("preprocess task panicked: {e}")))
}

/// Decode, cap the long edge at `max_edge`, and re-encode as JPEG.
fn reencode_bounded(bytes: &[u8], max_edge: u32) -> Result<Vec<u8>, image::ImageError> {
    let img = image::load_from_memory(bytes)?;

    let (w, h) = (img.width(), img.height());
    let img = if w.max(h) > max_edge {
        img.resize(max_edge, max_edge, FilterType::Triangle)
    } else {
        img
    };

    // JPEG has no alpha channel; flatten before encoding.
    let rgb = image::DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)?;
    Ok(buf)
}
