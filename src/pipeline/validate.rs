//! Schema enforcement and normalization for decoded model output.
//!
//! This is the single place a [`CanonicalRecord`] is ever constructed from
//! untrusted input. The normalizer is total wherever a safe default exists:
//! out-of-range numbers clamp, wrong-typed values coerce, unknown labels fall
//! back to `"unknown"`, and missing groups materialize as empty defaults. The
//! only hard failures are an input that is not a JSON object and an empty
//! `short_description` or `detailed_analysis`, because a record without a
//! description carries no information worth persisting.

use crate::error::ItemError;
use crate::prompts::{CATEGORY_LABELS, FALLBACK_LABEL, WORKSPACE_LABELS};
use crate::record::{
    ActivityContext, CanonicalRecord, CodeContext, CommunicationContext, EntertainmentContext,
    Evidence, LearningContext, Scores, WorkContext, MAX_ARRAY_ENTRIES,
};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

/// Clamp a JSON value into `[min, max]`, mapping anything non-numeric
/// (including NaN) to `min`.
fn clamp_score(v: &Value, min: f64, max: f64) -> f64 {
    match v.as_f64() {
        Some(n) if n.is_finite() => n.clamp(min, max),
        _ => min,
    }
}

/// Trimmed string, or empty for any non-string value.
fn safe_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_string(),
        _ => String::new(),
    }
}

/// Truthiness in the loose sense the models tend to produce: numbers,
/// non-empty strings and containers all count as true.
fn safe_bool(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
        Value::Null => false,
    }
}

/// String entries only, trimmed, empties dropped, capped at
/// [`MAX_ARRAY_ENTRIES`]. Non-arrays normalize to empty.
fn safe_string_array(v: &Value) -> Vec<String> {
    let Value::Array(items) = v else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|x| x.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(MAX_ARRAY_ENTRIES)
        .map(str::to_string)
        .collect()
}

/// Reduce a free-form label to a single lowercase token: separators become
/// spaces, whitespace collapses, and only the first token survives. Tokens
/// longer than 60 chars are treated as noise.
fn normalize_label(v: &Value, fallback: &str) -> String {
    let Value::String(s) = v else {
        return fallback.to_string();
    };
    let lowered = s.trim().to_lowercase();
    if lowered.is_empty() {
        return fallback.to_string();
    }
    let cleaned: String = lowered
        .chars()
        .map(|c| if c == '|' || c == ',' { ' ' } else { c })
        .collect();
    match cleaned.split_whitespace().next() {
        Some(token) if token.len() <= 60 => token.to_string(),
        _ => fallback.to_string(),
    }
}

/// Normalize a label and check it against a closed set.
fn pick_label(v: &Value, allowed: &[&str]) -> String {
    let token = normalize_label(v, FALLBACK_LABEL);
    if allowed.contains(&token.as_str()) {
        token
    } else {
        FALLBACK_LABEL.to_string()
    }
}

fn obj(v: &Value, key: &str) -> Value {
    match v.get(key) {
        Some(x @ Value::Object(_)) => x.clone(),
        _ => Value::Object(Map::new()),
    }
}

fn field<'a>(v: &'a Value, key: &str) -> &'a Value {
    v.get(key).unwrap_or(&Value::Null)
}

/// Stable content signature over the identity-bearing fields. Arrays are
/// truncated so a long tail of minor windows does not break dedupe.
fn derive_signature(record: &CanonicalRecord) -> String {
    let head = |v: &[String]| -> Vec<String> { v.iter().take(12).cloned().collect() };
    let basis = json!({
        "category": record.category,
        "workspace_type": record.workspace_type,
        "apps_visible": head(&record.evidence.apps_visible),
        "web_domains_visible": head(&record.evidence.web_domains_visible),
        "key_windows_or_panels": head(&record.evidence.key_windows_or_panels),
    });
    let mut hasher = Sha256::new();
    hasher.update(basis.to_string().as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Normalize a model-supplied `system_metadata` group. The merge step
/// replaces this with sampled facts when any exist, so only the fields the
/// model is asked to echo are kept.
fn normalize_system_metadata(v: &Value) -> Value {
    let group = obj(v, "system_metadata");
    let battery = obj(&group, "battery");
    json!({
        "active_app": safe_string(field(&group, "active_app")),
        "opened_apps": safe_string_array(field(&group, "opened_apps")),
        "battery": {
            "percentage": field(&battery, "percentage").as_f64().unwrap_or(0.0),
            "isPlugged": safe_bool(field(&battery, "isPlugged")),
            "battery_status": safe_string(field(&battery, "battery_status")),
        },
    })
}

/// Validate and normalize one decoded response into a [`CanonicalRecord`].
pub fn validate(decoded: &Value) -> Result<CanonicalRecord, ItemError> {
    if !decoded.is_object() {
        return Err(ItemError::Unparseable {
            detail: "response is not a JSON object".to_string(),
            candidate: decoded.to_string(),
        });
    }

    let scores_v = obj(decoded, "scores");
    let evidence_v = obj(decoded, "evidence");
    let context_v = obj(decoded, "context");
    let work_v = obj(&context_v, "work_context");
    let code_v = obj(&context_v, "code_context");
    let learning_v = obj(&context_v, "learning_context");
    let comm_v = obj(&context_v, "communication_context");
    let ent_v = obj(&context_v, "entertainment_context");

    let mut record = CanonicalRecord {
        overall_activity_score: clamp_score(field(decoded, "overall_activity_score"), 0.0, 100.0),
        category: pick_label(field(decoded, "category"), &CATEGORY_LABELS),
        workspace_type: pick_label(field(decoded, "workspace_type"), &WORKSPACE_LABELS),
        short_description: safe_string(field(decoded, "short_description")),
        detailed_analysis: safe_string(field(decoded, "detailed_analysis")),
        scores: Scores {
            focus_score: clamp_score(field(&scores_v, "focus_score"), 0.0, 100.0),
            productivity_score: clamp_score(field(&scores_v, "productivity_score"), 0.0, 100.0),
            distraction_risk: clamp_score(field(&scores_v, "distraction_risk"), 0.0, 100.0),
        },
        evidence: Evidence {
            apps_visible: safe_string_array(field(&evidence_v, "apps_visible")),
            active_app_guess: safe_string(field(&evidence_v, "active_app_guess")),
            key_windows_or_panels: safe_string_array(field(&evidence_v, "key_windows_or_panels")),
            web_domains_visible: safe_string_array(field(&evidence_v, "web_domains_visible")),
            text_snippets: safe_string_array(field(&evidence_v, "text_snippets")),
            raw_text_content: safe_string(field(&evidence_v, "raw_text_content")),
        },
        context: ActivityContext {
            intent_guess: safe_string(field(&context_v, "intent_guess")),
            topic_or_game_or_media: safe_string(field(&context_v, "topic_or_game_or_media")),
            work_context: WorkContext {
                work_type: safe_string(field(&work_v, "work_type")),
                project_or_doc: safe_string(field(&work_v, "project_or_doc")),
            },
            code_context: CodeContext {
                language: safe_string(field(&code_v, "language")),
                tools_or_frameworks: safe_string_array(field(&code_v, "tools_or_frameworks")),
                files_or_modules: safe_string_array(field(&code_v, "files_or_modules")),
                repo_or_project: safe_string(field(&code_v, "repo_or_project")),
                errors_or_logs_visible: safe_bool(field(&code_v, "errors_or_logs_visible")),
            },
            learning_context: LearningContext {
                learning_topic: safe_string(field(&learning_v, "learning_topic")),
                source_type: safe_string(field(&learning_v, "source_type")),
            },
            communication_context: CommunicationContext {
                communication_type: safe_string(field(&comm_v, "communication_type")),
                platform_guess: safe_string(field(&comm_v, "platform_guess")),
                meeting_indicator: safe_bool(field(&comm_v, "meeting_indicator")),
            },
            entertainment_context: EntertainmentContext {
                entertainment_type: safe_string(field(&ent_v, "entertainment_type")),
                platform_guess: safe_string(field(&ent_v, "platform_guess")),
            },
        },
        actions_observed: safe_string_array(field(decoded, "actions_observed")),
        privacy_notes: safe_string_array(field(decoded, "privacy_notes")),
        summary_tags: safe_string_array(field(decoded, "summary_tags")),
        dedupe_signature: safe_string(field(decoded, "dedupe_signature")),
        confidence: clamp_score(field(decoded, "confidence"), 0.0, 1.0),
        ..Default::default()
    };

    if record.dedupe_signature.is_empty() {
        record.dedupe_signature = derive_signature(&record);
    }

    if record.short_description.is_empty() {
        return Err(ItemError::MissingRequiredField {
            field: "short_description",
        });
    }
    if record.detailed_analysis.is_empty() {
        return Err(ItemError::MissingRequiredField {
            field: "detailed_analysis",
        });
    }

    record.system_metadata = Some(normalize_system_metadata(decoded));

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> Value {
        json!({
            "short_description": "Editing Rust source",
            "detailed_analysis": "A code editor fills the screen.",
        })
    }

    #[test]
    fn minimal_input_normalizes_to_defaults() {
        let r = validate(&minimal()).unwrap();
        assert_eq!(r.category, "unknown");
        assert_eq!(r.workspace_type, "unknown");
        assert_eq!(r.overall_activity_score, 0.0);
        assert!(r.evidence.apps_visible.is_empty());
        assert!(!r.dedupe_signature.is_empty());
        assert_eq!(r.confidence, 0.0);
    }

    #[test]
    fn scores_clamp_and_coerce() {
        let mut v = minimal();
        v["overall_activity_score"] = json!(250);
        v["scores"] = json!({"focus_score": -10, "productivity_score": "high", "distraction_risk": 55});
        v["confidence"] = json!(3.5);
        let r = validate(&v).unwrap();
        assert_eq!(r.overall_activity_score, 100.0);
        assert_eq!(r.scores.focus_score, 0.0);
        assert_eq!(r.scores.productivity_score, 0.0);
        assert_eq!(r.scores.distraction_risk, 55.0);
        assert_eq!(r.confidence, 1.0);
    }

    #[test]
    fn labels_normalize_to_closed_sets() {
        let mut v = minimal();
        v["category"] = json!("  Coding | Rust  ");
        v["workspace_type"] = json!("FOCUSED,deep");
        let r = validate(&v).unwrap();
        assert_eq!(r.category, "coding");
        assert_eq!(r.workspace_type, "focused");

        v["category"] = json!("doomscrolling");
        let r = validate(&v).unwrap();
        assert_eq!(r.category, "unknown");

        v["category"] = json!(42);
        let r = validate(&v).unwrap();
        assert_eq!(r.category, "unknown");
    }

    #[test]
    fn string_arrays_trim_filter_and_cap() {
        let mut v = minimal();
        let mut many: Vec<Value> = (0..100).map(|i| json!(format!("app{i}"))).collect();
        many.push(json!("  spaced  "));
        many.push(json!(""));
        many.push(json!(7));
        v["evidence"] = json!({"apps_visible": many});
        let r = validate(&v).unwrap();
        assert_eq!(r.evidence.apps_visible.len(), MAX_ARRAY_ENTRIES);
        assert_eq!(r.evidence.apps_visible[0], "app0");
    }

    #[test]
    fn non_object_groups_become_defaults() {
        let mut v = minimal();
        v["scores"] = json!("not an object");
        v["context"] = json!(["also wrong"]);
        let r = validate(&v).unwrap();
        assert_eq!(r.scores, Scores::default());
        assert_eq!(r.context.code_context.language, "");
    }

    #[test]
    fn loose_booleans() {
        let mut v = minimal();
        v["context"] = json!({"code_context": {"errors_or_logs_visible": "yes"}});
        let r = validate(&v).unwrap();
        assert!(r.context.code_context.errors_or_logs_visible);

        v["context"]["code_context"]["errors_or_logs_visible"] = json!(0);
        let r = validate(&v).unwrap();
        assert!(!r.context.code_context.errors_or_logs_visible);
    }

    #[test]
    fn missing_descriptions_are_hard_failures() {
        let err = validate(&json!({"detailed_analysis": "x"})).unwrap_err();
        assert!(matches!(
            err,
            ItemError::MissingRequiredField { field: "short_description" }
        ));
        let err = validate(&json!({"short_description": "x", "detailed_analysis": "   "}))
            .unwrap_err();
        assert!(matches!(
            err,
            ItemError::MissingRequiredField { field: "detailed_analysis" }
        ));
    }

    #[test]
    fn model_signature_wins_when_present() {
        let mut v = minimal();
        v["dedupe_signature"] = json!("  custom-sig  ");
        let r = validate(&v).unwrap();
        assert_eq!(r.dedupe_signature, "custom-sig");
    }

    #[test]
    fn derived_signature_is_stable_and_ignores_volatile_fields() {
        let mut a = minimal();
        a["category"] = json!("coding");
        a["evidence"] = json!({"apps_visible": ["Zed", "Terminal"]});
        let mut b = a.clone();
        b["detailed_analysis"] = json!("Completely different prose.");
        b["confidence"] = json!(0.9);
        let ra = validate(&a).unwrap();
        let rb = validate(&b).unwrap();
        assert_eq!(ra.dedupe_signature, rb.dedupe_signature);

        let mut c = a.clone();
        c["evidence"]["apps_visible"] = json!(["Zed", "Safari"]);
        let rc = validate(&c).unwrap();
        assert_ne!(ra.dedupe_signature, rc.dedupe_signature);
    }

    #[test]
    fn system_metadata_echo_is_normalized() {
        let mut v = minimal();
        v["system_metadata"] = json!({
            "active_app": "  Zed ",
            "opened_apps": ["Zed", 3, ""],
            "battery": {"percentage": 87, "isPlugged": 1, "battery_status": "charging"},
        });
        let r = validate(&v).unwrap();
        let m = r.system_metadata.unwrap();
        assert_eq!(m["active_app"], "Zed");
        assert_eq!(m["opened_apps"], json!(["Zed"]));
        assert_eq!(m["battery"]["percentage"], 87.0);
        assert_eq!(m["battery"]["isPlugged"], true);
    }

    #[test]
    fn non_object_response_is_rejected() {
        assert!(validate(&json!([1, 2, 3])).is_err());
        assert!(validate(&json!("text")).is_err());
    }
}
