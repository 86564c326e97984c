//! Prompt construction for the vision model.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — the closed label sets live in one place
//!    and feed both the rendered prompt and the validator, so the two can
//!    never drift apart.
//!
//! 2. **Testability** — unit tests can render and inspect prompts directly
//!    without a running inference server.
//!
//! Rendering is deterministic: the same session snapshot, OCR text, and
//! retry flag always produce the same string.

use crate::pipeline::ocr::OcrText;
use crate::session::SessionContext;
use std::fmt::Write;

/// The closed activity-category label set. Anything the model returns
/// outside this list normalizes to the final entry, "unknown".
pub const CATEGORY_LABELS: [&str; 20] = [
    "work",
    "coding",
    "study",
    "reading",
    "writing",
    "browsing",
    "planning",
    "communication",
    "meeting",
    "social",
    "gaming",
    "entertainment",
    "creative",
    "shopping",
    "finance",
    "tools",
    "system",
    "file-management",
    "idle",
    "unknown",
];

/// The closed workspace-type label set.
pub const WORKSPACE_LABELS: [&str; 8] = [
    "focused",
    "mixed",
    "casual",
    "social",
    "leisure",
    "productive",
    "idle",
    "unknown",
];

/// Fallback label for anything outside a closed set.
pub const FALLBACK_LABEL: &str = "unknown";

/// Corrective preamble prepended when a previous attempt produced output
/// that failed to decode or validate.
pub const RETRY_PREAMBLE: &str = "PREVIOUS OUTPUT WAS INVALID.\n\
Return ONLY JSON.\n\
No markdown.\n\
No extra text.\n\
Use a single category label only.";

/// Render the full analysis prompt for one screenshot.
///
/// Layout, in order: optional retry preamble, task instruction, system
/// context, optional OCR text, strict rules, closed label enumerations,
/// scoring guidelines, required output shape.
pub fn render_prompt(session: &SessionContext, ocr: &OcrText, is_retry: bool) -> String {
    let mut p = String::with_capacity(4096);

    if is_retry {
        p.push_str(RETRY_PREAMBLE);
        p.push_str("\n\n");
    }

    p.push_str("You are a generic desktop activity tracking assistant.\n\n");
    p.push_str(
        "Analyze the desktop screenshot and return ONLY VALID JSON (no markdown, no extra text).\n\n",
    );

    write_system_context(&mut p, session);

    if !ocr.prompt_text.is_empty() {
        p.push_str("\nLocally extracted text (OCR, may contain recognition noise):\n\"\"\"\n");
        p.push_str(&ocr.prompt_text);
        p.push_str("\n\"\"\"\n");
    }

    p.push_str(
        r#"
Goal:
Give a high-signal summary of what the user is doing on their laptop based on the screenshot and provided system context.

Strict rules:
1) Extract STRICTLY VISIBLE context from screenshot, but you can use system context for better accuracy (e.g., if you see a code editor and system says "VS Code" is active).
2) Do NOT guess. Do NOT hallucinate.
3) If text is not clearly readable, do not infer it unless system context supports it.
4) If you are unsure about an app or site, omit it.
5) Do not invent filenames, code, chats, or people.
6) Treat privacy seriously. Do not reveal secrets. If sensitive data is visible, mention it generically (e.g., "personal info visible").

TEXT EXTRACTION RULES:
- Extract KEY text snippets that help understand the context (15-30 snippets)
- Focus on: file names, function names, app names, window titles, key UI labels, URLs, error messages
- Keep snippets SHORT and meaningful (under 50 characters each)
- Properly escape all quotes and special characters in JSON strings
- Do NOT extract full code blocks or long text passages (OCR handles that separately)

Activity categories:
Use ONE short label only:
"#,
    );
    for label in CATEGORY_LABELS {
        let _ = writeln!(p, "- \"{label}\"");
    }

    p.push_str("\nWorkspace types:\nUse ONE label only:\n");
    for label in WORKSPACE_LABELS {
        let _ = writeln!(p, "- \"{label}\"");
    }

    p.push_str(
        r#"
Scoring (based only on visible evidence):
- overall_activity_score: How engaged the user appears (0-100)
- focus_score: How concentrated the context appears (0-100)
- productivity_score: How much the context suggests useful progress toward goals (0-100)
- distraction_risk: How likely the context suggests drifting away from intended task (0-100)

Guidelines:
- Deep work visible (coding, writing, studying, designing): productivity_score 70-100
- Meetings / communication: productivity_score 40-80 depending on context
- Browsing/exploring: productivity_score 20-70 depending on intent and clarity
- Movies / gaming / entertainment: productivity_score 0-45
- Idle / desktop / nothing open: overall_activity_score < 35 and productivity_score < 30

Return JSON with this structure:
{
  "overall_activity_score": number,
  "category": string,
  "workspace_type": string,
  "short_description": string,
  "detailed_analysis": string,
  "scores": {
    "focus_score": number,
    "productivity_score": number,
    "distraction_risk": number
  },
  "evidence": {
    "apps_visible": string[],
    "active_app_guess": string,
    "key_windows_or_panels": string[],
    "web_domains_visible": string[],
    "text_snippets": string[]
  },
  "context": {
    "intent_guess": string,
    "topic_or_game_or_media": string,
    "work_context": {
      "work_type": string,
      "project_or_doc": string
    },
    "code_context": {
      "language": string,
      "tools_or_frameworks": string[],
      "files_or_modules": string[],
      "repo_or_project": string,
      "errors_or_logs_visible": boolean
    },
    "learning_context": {
      "learning_topic": string,
      "source_type": string
    },
    "communication_context": {
      "communication_type": string,
      "platform_guess": string,
      "meeting_indicator": boolean
    },
    "entertainment_context": {
      "entertainment_type": string,
      "platform_guess": string
    }
  },
  "actions_observed": string[],
  "privacy_notes": string[],
  "summary_tags": string[],
  "dedupe_signature": string,
  "confidence": number
}

Important:
- "category" must be exactly ONE label from the list.
- Be direct, brutally honest, and minimal.
- confidence: 0 to 1, based on how clearly visible the context is.
- CRITICAL: Ensure ALL strings in JSON are properly escaped (use \" for quotes, \\ for backslashes)
- CRITICAL: Keep text_snippets SHORT (max 50 chars each) to ensure valid JSON
- CRITICAL: Return ONLY valid JSON - no markdown, no extra text, no truncated strings"#,
    );

    p
}

fn write_system_context(p: &mut String, s: &SessionContext) {
    let _ = writeln!(p, "Context from system:");
    let _ = writeln!(p, "- Active Application: {}", s.active_app);
    let _ = writeln!(
        p,
        "- All Running Applications: {}",
        if s.opened_apps.is_empty() {
            "Unknown".to_string()
        } else {
            s.opened_apps.join(", ")
        }
    );
    let _ = writeln!(
        p,
        "- Battery/Power: {} ({}%, Plugged in: {})",
        s.battery_status, s.battery_percent, s.is_plugged
    );
    let _ = writeln!(p, "- Volume: {}%", s.volume);
    let _ = writeln!(p, "- RAM: {}GB used / {}GB total", s.ram_used, s.ram_total);
    let _ = writeln!(
        p,
        "- Storage: {}GB used / {}GB total",
        s.storage_used, s.storage_total
    );
    let _ = writeln!(p, "- CPU: {}%", s.cpu_used);
    let _ = writeln!(
        p,
        "- Network: {} ({})",
        s.network_type,
        if s.network_connected { "connected" } else { "disconnected" }
    );
    let _ = writeln!(
        p,
        "- Display Brightness: {}%",
        if s.brightness >= 0 {
            s.brightness.to_string()
        } else {
            "unknown".to_string()
        }
    );
    let _ = writeln!(p, "- Input Idle: {} seconds", s.idle_seconds);
    let _ = writeln!(p, "- Time: {} ({})", s.time_of_day, s.day_of_week);
}
