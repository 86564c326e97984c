//! # scribe-vision
//!
//! Turn desktop screenshots into structured activity records using a local
//! Vision Language Model (VLM).
//!
//! ## Why this crate?
//!
//! A screenshot is a dense, messy signal: window chrome, half-covered panes,
//! tiny status text. Classic heuristics (window titles, process names) miss
//! what is actually on screen. Instead this crate sends the image — plus a
//! locally OCR'd text layer — to a small local VLM and asks for a strict JSON
//! analysis, then repairs, validates, and normalizes whatever comes back so
//! downstream consumers only ever see one canonical record shape.
//!
//! ## Pipeline Overview
//!
//! ```text
//! screenshot.png
//!  │
//!  ├─ 1. Encode    downscale to ≤1280 px, JPEG, base64 (spawn_blocking)
//!  ├─ 2. OCR       local tesseract pass, best-effort (never fails the item)
//!  ├─ 3. Prompt    session context + OCR text + strict output contract
//!  ├─ 4. VLM       /api/generate on a local Ollama-compatible server
//!  ├─ 5. Decode    widest `{…}` slice + truncation-repair suffixes
//!  ├─ 6. Validate  clamp scores, closed-set labels, derive dedupe signature
//!  ├─ 7. Merge     carried-over timestamp/location/system facts + viz block
//!  └─ 8. Persist   atomic write of the sibling `screenshot.json`
//! ```
//!
//! Batches run steps 1-8 per item under a bounded worker pool with per-item
//! retries, and report aggregate success/failure counts.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scribe_vision::{analyze_image, AnalysisConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AnalysisConfig::default(); // localhost:11434, qwen3-vl:2b
//!     let record = analyze_image("shot.png", &config).await?;
//!     println!("{} ({})", record.short_description, record.category);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `scribe-vision` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! scribe-vision = { version = "0.4", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod batch;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{analyze_batch, analyze_image, load_existing_metadata, record_path};
pub use config::{AnalysisConfig, AnalysisConfigBuilder};
pub use error::{ItemError, ScribeError};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use record::{AnalysisRequest, BatchResult, CanonicalRecord, ExistingMetadata, ItemFailure};
pub use session::SessionContext;
