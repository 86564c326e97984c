//! The canonical activity record and batch reporting types.
//!
//! [`CanonicalRecord`] is the only representation ever persisted. Its
//! invariants are enforced by [`crate::pipeline::validate`], never here:
//! every score lies in its declared range, labels come from their closed
//! sets, string arrays are trimmed, empty-filtered and capped, and the dedupe
//! signature is non-empty. Keeping the struct itself dumb means any code path
//! that produces one has gone through the single normalizer.
//!
//! Carried-over capture-time facts (`timestamp`, `location`,
//! `system_metadata`) are stored as raw [`serde_json::Value`] so re-analysis
//! round-trips them losslessly.

use crate::error::ItemError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// How many entries any string array in the record may hold.
pub const MAX_ARRAY_ENTRIES: usize = 80;

/// One unit of work for the orchestrator: an image plus whatever metadata a
/// previous analysis already persisted for it.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub image_path: PathBuf,
    pub existing: Option<ExistingMetadata>,
}

impl AnalysisRequest {
    pub fn new(image_path: impl Into<PathBuf>) -> Self {
        Self {
            image_path: image_path.into(),
            existing: None,
        }
    }

    pub fn with_existing(mut self, existing: ExistingMetadata) -> Self {
        self.existing = Some(existing);
        self
    }
}

/// Capture-time facts carried over from a previously persisted record.
///
/// Re-running analysis must never fabricate new capture-time facts, so these
/// take precedence over freshly synthesized values in the merge step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExistingMetadata {
    pub timestamp: Option<Value>,
    pub location: Option<Value>,
    pub system_metadata: Option<Value>,
}

impl ExistingMetadata {
    /// Extract the carried-over sections from a previously persisted record.
    pub fn from_record_value(v: &Value) -> Self {
        Self {
            timestamp: v.get("timestamp").cloned(),
            location: v.get("location").cloned(),
            system_metadata: v.get("system_metadata").cloned(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.timestamp.is_none() && self.location.is_none() && self.system_metadata.is_none()
    }
}

// ── Canonical record ─────────────────────────────────────────────────────

/// Per-dimension activity scores, each in [0, 100].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub focus_score: f64,
    pub productivity_score: f64,
    pub distraction_risk: f64,
}

/// What was visibly on screen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub apps_visible: Vec<String>,
    pub active_app_guess: String,
    pub key_windows_or_panels: Vec<String>,
    pub web_domains_visible: Vec<String>,
    pub text_snippets: Vec<String>,
    pub raw_text_content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkContext {
    pub work_type: String,
    pub project_or_doc: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeContext {
    pub language: String,
    pub tools_or_frameworks: Vec<String>,
    pub files_or_modules: Vec<String>,
    pub repo_or_project: String,
    pub errors_or_logs_visible: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningContext {
    pub learning_topic: String,
    pub source_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommunicationContext {
    pub communication_type: String,
    pub platform_guess: String,
    pub meeting_indicator: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntertainmentContext {
    pub entertainment_type: String,
    pub platform_guess: String,
}

/// Interpreted activity context. Every substructure is always present so
/// consumers never branch on missing groups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityContext {
    pub intent_guess: String,
    pub topic_or_game_or_media: String,
    pub work_context: WorkContext,
    pub code_context: CodeContext,
    pub learning_context: LearningContext,
    pub communication_context: CommunicationContext,
    pub entertainment_context: EntertainmentContext,
}

/// Presentation hints derived from category + productivity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Visualization {
    pub color_code: String,
    pub emoji: String,
    pub priority_level: String,
    pub display_badge: String,
}

/// One-line summaries for dashboards and voice surfaces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub one_liner: String,
    pub voice_friendly: String,
}

/// The persisted analysis record. See the module docs for invariants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub overall_activity_score: f64,
    pub category: String,
    pub workspace_type: String,
    pub short_description: String,
    pub detailed_analysis: String,
    pub scores: Scores,
    pub evidence: Evidence,
    pub context: ActivityContext,
    pub actions_observed: Vec<String>,
    pub privacy_notes: Vec<String>,
    pub summary_tags: Vec<String>,
    pub dedupe_signature: String,
    pub confidence: f64,

    // Filled in by the metadata merger; absent only on a record that has not
    // been merged yet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visualization: Option<Visualization>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,
}

// ── Batch reporting ──────────────────────────────────────────────────────

/// A single failed item in the batch report.
#[derive(Debug, Clone)]
pub struct ItemFailure {
    pub path: PathBuf,
    pub error: ItemError,
}

/// Aggregate outcome of a batch run. Always reported in full: every item
/// contributes exactly one success or one entry in `errors`.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub success: usize,
    pub failed: usize,
    pub errors: Vec<ItemFailure>,
}

impl BatchResult {
    pub fn total(&self) -> usize {
        self.success + self.failed
    }
}
