//! Metadata merge: the final enrichment step before a record is persisted.
//!
//! A validated record knows only what the model saw. This step folds in the
//! rest: capture-time facts (carried over from a previous record when one
//! exists, synthesized from the capture session otherwise), locally extracted
//! OCR text, and the derived presentation block. The merge is pure and
//! idempotent, so re-running it over an already merged record changes
//! nothing.

use crate::pipeline::ocr::OcrText;
use crate::record::{CanonicalRecord, ExistingMetadata, Summary, Visualization};
use crate::session::SessionContext;

/// Hex color per category, used by downstream dashboards.
const CATEGORY_COLORS: [(&str, &str); 20] = [
    ("coding", "#4CAF50"),
    ("work", "#2196F3"),
    ("study", "#9C27B0"),
    ("reading", "#00BCD4"),
    ("writing", "#3F51B5"),
    ("browsing", "#FF9800"),
    ("planning", "#795548"),
    ("communication", "#E91E63"),
    ("meeting", "#F44336"),
    ("social", "#EC407A"),
    ("gaming", "#8BC34A"),
    ("entertainment", "#FFEB3B"),
    ("creative", "#FF5722"),
    ("shopping", "#FFC107"),
    ("finance", "#607D8B"),
    ("tools", "#9E9E9E"),
    ("system", "#78909C"),
    ("file-management", "#8D6E63"),
    ("idle", "#BDBDBD"),
    ("unknown", "#757575"),
];

const CATEGORY_EMOJIS: [(&str, &str); 20] = [
    ("coding", "💻"),
    ("work", "💼"),
    ("study", "📚"),
    ("reading", "📖"),
    ("writing", "✍️"),
    ("browsing", "🌐"),
    ("planning", "📋"),
    ("communication", "💬"),
    ("meeting", "🎥"),
    ("social", "👥"),
    ("gaming", "🎮"),
    ("entertainment", "🎬"),
    ("creative", "🎨"),
    ("shopping", "🛒"),
    ("finance", "💰"),
    ("tools", "🔧"),
    ("system", "⚙️"),
    ("file-management", "📁"),
    ("idle", "💤"),
    ("unknown", "❓"),
];

fn lookup(table: &[(&str, &str)], key: &str, fallback: &str) -> String {
    table
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| (*v).to_string())
        .unwrap_or_else(|| fallback.to_string())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Presentation hints derived from the classification.
pub fn build_visualization(
    category: &str,
    productivity_score: f64,
    code_language: &str,
) -> Visualization {
    let emoji = lookup(&CATEGORY_EMOJIS, category, "❓");
    let priority_level = if productivity_score > 70.0 {
        "high"
    } else if productivity_score > 40.0 {
        "normal"
    } else {
        "low"
    };
    let display_badge = if code_language.is_empty() {
        format!("{emoji} {}", capitalize(category))
    } else {
        format!("{emoji} {} - {code_language}", capitalize(category))
    };
    Visualization {
        color_code: lookup(&CATEGORY_COLORS, category, "#757575"),
        emoji,
        priority_level: priority_level.to_string(),
        display_badge,
    }
}

/// Dashboard and voice one-liners.
pub fn build_summary(category: &str, short_description: &str) -> Summary {
    let state = if category == "idle" {
        "currently idle".to_string()
    } else {
        format!("engaged in {category}")
    };
    Summary {
        one_liner: short_description.to_string(),
        voice_friendly: format!("You are {state}. {short_description}"),
    }
}

/// Fold capture-time facts, OCR output, and derived presentation into a
/// validated record.
///
/// Carried-over metadata always wins over freshly synthesized values, so
/// re-analysis never rewrites when or where a screenshot was taken. OCR text
/// overwrites the model's `raw_text_content` whenever any was extracted (the
/// local engine reads small text far better than the vision model), while
/// `text_snippets` are only backfilled when the model produced none.
pub fn merge_metadata(
    record: &mut CanonicalRecord,
    existing: Option<&ExistingMetadata>,
    session: &SessionContext,
    ocr: &OcrText,
) {
    record.timestamp = existing
        .and_then(|m| m.timestamp.clone())
        .or_else(|| Some(session.timestamp_value()));
    record.location = existing
        .and_then(|m| m.location.clone())
        .or_else(|| session.location_value());
    record.system_metadata = existing
        .and_then(|m| m.system_metadata.clone())
        .or_else(|| Some(session.system_metadata_value()));

    if !ocr.raw_text.is_empty() {
        record.evidence.raw_text_content = ocr.raw_text.clone();
    }
    if record.evidence.text_snippets.is_empty() && !ocr.snippets.is_empty() {
        record.evidence.text_snippets = ocr.snippets.clone();
    }

    record.visualization = Some(build_visualization(
        &record.category,
        record.scores.productivity_score,
        &record.context.code_context.language,
    ));
    record.summary = Some(build_summary(&record.category, &record.short_description));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validated_record() -> CanonicalRecord {
        CanonicalRecord {
            category: "coding".into(),
            workspace_type: "focused".into(),
            short_description: "Editing a Rust module".into(),
            detailed_analysis: "An editor with a terminal split.".into(),
            dedupe_signature: "sig".into(),
            ..Default::default()
        }
    }

    #[test]
    fn visualization_tables_and_priority() {
        let v = build_visualization("coding", 85.0, "Rust");
        assert_eq!(v.color_code, "#4CAF50");
        assert_eq!(v.emoji, "💻");
        assert_eq!(v.priority_level, "high");
        assert_eq!(v.display_badge, "💻 Coding - Rust");

        let v = build_visualization("browsing", 55.0, "");
        assert_eq!(v.priority_level, "normal");
        assert_eq!(v.display_badge, "🌐 Browsing");

        let v = build_visualization("idle", 10.0, "");
        assert_eq!(v.priority_level, "low");

        // boundary values are not "above"
        assert_eq!(build_visualization("work", 70.0, "").priority_level, "normal");
        assert_eq!(build_visualization("work", 40.0, "").priority_level, "low");

        let v = build_visualization("something-else", 0.0, "");
        assert_eq!(v.color_code, "#757575");
        assert_eq!(v.emoji, "❓");
    }

    #[test]
    fn summary_voice_phrasing() {
        let s = build_summary("coding", "Editing a Rust module");
        assert_eq!(s.one_liner, "Editing a Rust module");
        assert_eq!(s.voice_friendly, "You are engaged in coding. Editing a Rust module");

        let s = build_summary("idle", "Screen saver active");
        assert_eq!(s.voice_friendly, "You are currently idle. Screen saver active");
    }

    #[test]
    fn existing_metadata_wins_over_session() {
        let mut r = validated_record();
        let existing = ExistingMetadata {
            timestamp: Some(json!({"iso": "2026-01-01T00:00:00Z"})),
            location: Some(json!({"latitude": 1.0, "longitude": 2.0})),
            system_metadata: Some(json!({"active_app": "Old"})),
        };
        let session = SessionContext::default();
        merge_metadata(&mut r, Some(&existing), &session, &OcrText::default());
        assert_eq!(r.timestamp.unwrap()["iso"], "2026-01-01T00:00:00Z");
        assert_eq!(r.location.unwrap()["latitude"], 1.0);
        assert_eq!(r.system_metadata.unwrap()["active_app"], "Old");
    }

    #[test]
    fn session_fills_gaps_when_no_existing() {
        let mut r = validated_record();
        let session = SessionContext::default();
        merge_metadata(&mut r, None, &session, &OcrText::default());
        assert!(r.timestamp.is_some());
        assert!(r.system_metadata.is_some());
        // no coordinates in a default session, so no location block
        assert!(r.location.is_none());
        assert!(r.visualization.is_some());
        assert!(r.summary.is_some());
    }

    #[test]
    fn ocr_overwrites_raw_text_and_backfills_snippets() {
        let mut r = validated_record();
        r.evidence.raw_text_content = "model guess".into();
        let ocr = OcrText {
            raw_text: "fn main() {}".into(),
            prompt_text: "fn main() {}".into(),
            snippets: vec!["fn main() {}".into()],
        };
        merge_metadata(&mut r, None, &SessionContext::default(), &ocr);
        assert_eq!(r.evidence.raw_text_content, "fn main() {}");
        assert_eq!(r.evidence.text_snippets, vec!["fn main() {}"]);

        // model snippets are kept when present
        let mut r = validated_record();
        r.evidence.text_snippets = vec!["model snippet".into()];
        merge_metadata(&mut r, None, &SessionContext::default(), &ocr);
        assert_eq!(r.evidence.text_snippets, vec!["model snippet"]);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut r = validated_record();
        let session = SessionContext::default();
        let ocr = OcrText::default();
        merge_metadata(&mut r, None, &session, &ocr);
        let once = r.clone();
        // second run must not pick up session facts over the merged ones
        let existing = ExistingMetadata::from_record_value(&serde_json::to_value(&once).unwrap());
        merge_metadata(&mut r, Some(&existing), &session, &ocr);
        assert_eq!(r, once);
    }
}
