//! Cross-stage pipeline tests: decode → validate → merge on realistic model
//! output, plus persistence of the resulting record.

use scribe_vision::pipeline::decode::decode_response;
use scribe_vision::pipeline::merge::merge_metadata;
use scribe_vision::pipeline::ocr::OcrText;
use scribe_vision::pipeline::validate::validate;
use scribe_vision::prompts::{render_prompt, CATEGORY_LABELS, WORKSPACE_LABELS};
use scribe_vision::{CanonicalRecord, SessionContext};

fn ocr_fixture() -> OcrText {
    OcrText {
        raw_text: "function foo() {".to_string(),
        prompt_text: "function foo() {".to_string(),
        snippets: vec!["function foo() {".to_string()],
    }
}

/// A sparse but plausible completion: required strings and scores present,
/// evidence and context entirely absent.
const SPARSE_RESPONSE: &str = r#"{"category":"coding","short_description":"Writing code","detailed_analysis":"User is editing a function.","scores":{"focus_score":85,"productivity_score":90,"distraction_risk":5},"confidence":0.8}"#;

#[test]
fn sparse_response_normalizes_end_to_end() {
    let decoded = decode_response(SPARSE_RESPONSE).unwrap();
    let mut record = validate(&decoded).unwrap();

    assert_eq!(record.category, "coding");
    assert_eq!(record.short_description, "Writing code");
    assert_eq!(record.detailed_analysis, "User is editing a function.");
    assert_eq!(record.scores.focus_score, 85.0);
    assert_eq!(record.confidence, 0.8);

    // absent groups materialize as complete defaults
    assert!(record.evidence.apps_visible.is_empty());
    assert_eq!(record.evidence.active_app_guess, "");
    assert_eq!(record.context.code_context.language, "");
    assert!(!record.context.communication_context.meeting_indicator);
    assert_eq!(record.workspace_type, "unknown");

    let session = SessionContext::default();
    merge_metadata(&mut record, None, &session, &ocr_fixture());

    // OCR text flows into evidence, the model having provided none
    assert_eq!(record.evidence.raw_text_content, "function foo() {");
    assert_eq!(record.evidence.text_snippets, vec!["function foo() {"]);

    let viz = record.visualization.as_ref().unwrap();
    assert_eq!(viz.color_code, "#4CAF50");
    assert_eq!(viz.priority_level, "high");
    let summary = record.summary.as_ref().unwrap();
    assert_eq!(summary.one_liner, "Writing code");
}

#[test]
fn noisy_truncated_response_still_yields_a_record() {
    // prose wrapper plus output cut mid-string, as small models produce
    let raw = "Here is my analysis:\n\
        {\"category\":\"browsing\",\"workspace_type\":\"casual\",\
        \"short_description\":\"Reading news\",\
        \"detailed_analysis\":\"A browser window with an article";
    let decoded = decode_response(raw).unwrap();
    let record = validate(&decoded).unwrap();
    assert_eq!(record.category, "browsing");
    assert_eq!(record.detailed_analysis, "A browser window with an article");
}

#[test]
fn every_validated_record_respects_ranges_and_label_sets() {
    // adversarial inputs never escape the declared invariants
    let inputs = vec![
        serde_json::json!({
            "short_description": "s", "detailed_analysis": "d",
            "overall_activity_score": 9999,
            "category": "CODING|typescript, react",
            "workspace_type": ["not", "a", "string"],
            "scores": {"focus_score": -1e9, "productivity_score": f64::MAX, "distraction_risk": null},
            "confidence": -3,
        }),
        serde_json::json!({
            "short_description": "s", "detailed_analysis": "d",
            "category": 12, "workspace_type": "LEISURE",
            "scores": "none",
        }),
    ];
    for input in inputs {
        let r = validate(&input).unwrap();
        assert!((0.0..=100.0).contains(&r.overall_activity_score));
        assert!((0.0..=100.0).contains(&r.scores.focus_score));
        assert!((0.0..=100.0).contains(&r.scores.productivity_score));
        assert!((0.0..=100.0).contains(&r.scores.distraction_risk));
        assert!((0.0..=1.0).contains(&r.confidence));
        assert!(CATEGORY_LABELS.contains(&r.category.as_str()));
        assert!(WORKSPACE_LABELS.contains(&r.workspace_type.as_str()));
        assert!(!r.dedupe_signature.is_empty());
    }
}

#[test]
fn dedupe_signature_is_stable_across_decode_paths() {
    // the same content arriving clean and arriving truncated must dedupe
    let clean = r#"{"category":"coding","workspace_type":"focused",
        "short_description":"a","detailed_analysis":"b",
        "evidence":{"apps_visible":["Zed"],"web_domains_visible":["docs.rs"]}}"#;
    let truncated = r#"noise {"category":"coding","workspace_type":"focused",
        "short_description":"a","detailed_analysis":"different prose entirely",
        "evidence":{"apps_visible":["Zed"],"web_domains_visible":["docs.rs"]},
        "privacy_notes":["cut off mid-arr"#;

    let a = validate(&decode_response(clean).unwrap()).unwrap();
    let b = validate(&decode_response(truncated).unwrap()).unwrap();
    assert_eq!(a.dedupe_signature, b.dedupe_signature);
}

#[test]
fn retry_prompt_carries_ocr_and_preamble() {
    let session = SessionContext::default();
    let ocr = ocr_fixture();
    let first = render_prompt(&session, &ocr, false);
    let retry = render_prompt(&session, &ocr, true);

    assert!(first.contains("function foo() {"));
    assert!(!first.contains("PREVIOUS OUTPUT WAS INVALID"));
    assert!(retry.contains("PREVIOUS OUTPUT WAS INVALID"));
    assert!(retry.ends_with(&first));
}

#[test]
fn merged_record_round_trips_and_rehydrates_metadata() {
    let decoded = decode_response(SPARSE_RESPONSE).unwrap();
    let mut record = validate(&decoded).unwrap();
    merge_metadata(
        &mut record,
        None,
        &SessionContext::default(),
        &ocr_fixture(),
    );

    let persisted = serde_json::to_string_pretty(&record).unwrap();
    let reread: CanonicalRecord = serde_json::from_str(&persisted).unwrap();
    assert_eq!(reread, record);

    // a redo of this screenshot would carry these sections over unchanged
    let value: serde_json::Value = serde_json::from_str(&persisted).unwrap();
    let existing = scribe_vision::ExistingMetadata::from_record_value(&value);
    assert!(existing.timestamp.is_some());
    assert!(existing.system_metadata.is_some());
}
