//! Progress-callback trait for per-item batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] to receive
//! real-time events as the orchestrator processes each screenshot.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a channel, a WebSocket, a database record, or a terminal
//! progress bar without the library knowing anything about how the host
//! application communicates. The trait is `Send + Sync` because items are
//! processed concurrently; implementations must protect their own shared
//! mutable state.

use std::path::Path;
use std::sync::Arc;

/// Called by the orchestrator as it claims and finishes items.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `on_item_complete` and `on_item_error` may be called
/// concurrently from different workers.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before any item is claimed.
    fn on_batch_start(&self, total_items: usize) {
        let _ = total_items;
    }

    /// Called when a worker claims an item, just before its pipeline runs.
    fn on_item_start(&self, index: usize, total: usize, path: &Path) {
        let _ = (index, total, path);
    }

    /// Called when an item's record has been validated, merged, and persisted.
    fn on_item_complete(&self, index: usize, total: usize, path: &Path) {
        let _ = (index, total, path);
    }

    /// Called when an item fails after its retry budget is exhausted.
    fn on_item_error(&self, index: usize, total: usize, path: &Path, error: &str) {
        let _ = (index, total, path, error);
    }

    /// Called once after every claimed item has terminated.
    fn on_batch_complete(&self, total: usize, success: usize) {
        let _ = (total, success);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnalysisConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
