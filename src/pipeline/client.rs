//! Inference client: one request/response call against the local server.
//!
//! The wire contract is Ollama's `/api/generate`: model name, rendered
//! prompt, base64 image, `stream: false`, a JSON output-format hint, a
//! keep-alive duration so the model stays resident between items, and
//! deterministic decode options. The response wrapper carries the completion
//! in `response` (or `thinking` for models that separate reasoning from
//! output).
//!
//! Every failure maps to one of three retryable [`ItemError`] variants:
//! non-2xx status → `Server`, transport problems (including the configured
//! timeout) → `Connection`, a 2xx with no completion text → `EmptyResponse`.
//! Nothing is silently swallowed — the caller owns the retry policy.

use crate::config::AnalysisConfig;
use crate::error::{ItemError, ScribeError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: [&'a str; 1],
    stream: bool,
    format: &'a str,
    keep_alive: &'a str,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
    num_ctx: u32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    thinking: String,
}

/// Thin client over the inference endpoint. Cheap to clone; the underlying
/// connection pool is shared.
#[derive(Clone)]
pub struct InferenceClient {
    http: reqwest::Client,
    endpoint: String,
}

impl InferenceClient {
    /// Build a client with the configured per-call timeout baked in.
    pub fn new(config: &AnalysisConfig) -> Result<Self, ScribeError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ScribeError::ClientBuildFailed(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: config.endpoint(),
        })
    }

    /// Send one prompt + image and return the raw completion text.
    pub async fn generate(
        &self,
        config: &AnalysisConfig,
        prompt: &str,
        image_b64: &str,
    ) -> Result<String, ItemError> {
        let body = GenerateRequest {
            model: &config.model,
            prompt,
            images: [image_b64],
            stream: false,
            format: "json",
            keep_alive: &config.keep_alive,
            options: GenerateOptions {
                temperature: config.temperature,
                top_p: config.top_p,
                num_ctx: config.num_ctx,
                num_predict: config.num_predict,
            },
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| ItemError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ItemError::Server {
                status: status.as_u16(),
                body: truncate(&body, 500),
            });
        }

        let wrapper: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ItemError::Connection(format!("malformed server wrapper: {e}")))?;

        let content = if !wrapper.response.is_empty() {
            wrapper.response
        } else {
            wrapper.thinking
        };
        if content.is_empty() {
            return Err(ItemError::EmptyResponse);
        }

        debug!("completion received: {} bytes", content.len());
        Ok(content)
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_wire_shape() {
        let config = AnalysisConfig::default();
        let body = GenerateRequest {
            model: &config.model,
            prompt: "describe",
            images: ["aGVsbG8="],
            stream: false,
            format: "json",
            keep_alive: &config.keep_alive,
            options: GenerateOptions {
                temperature: config.temperature,
                top_p: config.top_p,
                num_ctx: config.num_ctx,
                num_predict: config.num_predict,
            },
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["model"], "qwen3-vl:2b");
        assert_eq!(v["stream"], false);
        assert_eq!(v["format"], "json");
        assert_eq!(v["keep_alive"], "10m");
        assert_eq!(v["options"]["temperature"], 0.0);
        assert_eq!(v["options"]["num_predict"], 3072);
        assert_eq!(v["images"][0], "aGVsbG8=");
    }

    #[test]
    fn wrapper_prefers_response_over_thinking() {
        let w: GenerateResponse =
            serde_json::from_str(r#"{"response":"{\"a\":1}","thinking":"hmm"}"#).unwrap();
        assert_eq!(w.response, "{\"a\":1}");
        let w: GenerateResponse = serde_json::from_str(r#"{"thinking":"only thoughts"}"#).unwrap();
        assert!(w.response.is_empty());
        assert_eq!(w.thinking, "only thoughts");
    }

    #[tokio::test]
    async fn unreachable_server_is_connection_error() {
        let config = AnalysisConfig::builder()
            .host("127.0.0.1")
            .port(1) // nothing listens here
            .request_timeout_secs(2)
            .build()
            .unwrap();
        let client = InferenceClient::new(&config).unwrap();
        let err = client.generate(&config, "p", "aW1n").await.unwrap_err();
        assert!(matches!(err, ItemError::Connection(_)));
    }

    #[test]
    fn truncate_marks_elision() {
        assert_eq!(truncate("short", 10), "short");
        let t = truncate(&"x".repeat(600), 500);
        assert!(t.ends_with('…'));
    }
}
