//! Configuration types for screenshot analysis.
//!
//! All analysis behaviour is controlled through [`AnalysisConfig`], built via
//! its [`AnalysisConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs across workers and to diff two runs to understand
//! why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A fifteen-field constructor is unreadable and breaks on every new field.
//! The builder pattern lets callers set only what they care about and rely on
//! well-documented defaults for the rest.

use crate::error::ScribeError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Configuration for a screenshot-analysis run.
///
/// Built via [`AnalysisConfig::builder()`] or using
/// [`AnalysisConfig::default()`].
///
/// # Example
/// ```rust
/// use scribe_vision::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .model("qwen3-vl:2b")
///     .concurrency(2)
///     .max_retries(2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Vision model identifier on the inference server. Default: "qwen3-vl:2b".
    pub model: String,

    /// Inference server host. Default: "localhost".
    pub host: String,

    /// Inference server port. Default: 11434 (Ollama).
    pub port: u16,

    /// Sampling temperature. Default: 0.0.
    ///
    /// Zero makes the model deterministic and faithful to what is on screen,
    /// which is exactly what a structured-extraction task wants.
    pub temperature: f32,

    /// Nucleus-sampling cutoff. Default: 0.9.
    pub top_p: f32,

    /// Context window requested from the server. Default: 8192.
    pub num_ctx: u32,

    /// Maximum tokens the model may generate per screenshot. Default: 3072.
    ///
    /// Setting this too low truncates the JSON mid-string — the repair
    /// heuristics in [`crate::pipeline::decode`] recover the common cases,
    /// but a sane budget avoids needing them in the first place.
    pub num_predict: u32,

    /// Keep-alive hint sent to the server so the model stays resident in
    /// VRAM between items. Default: "10m".
    pub keep_alive: String,

    /// Extra attempts per item after the first one fails. Default: 2.
    ///
    /// Retries cover transient server errors and malformed completions; a
    /// retried request carries a corrective preamble telling the model its
    /// previous output was invalid.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    ///
    /// Doubles after each attempt: 500 ms → 1 s → 2 s. Backing off avoids
    /// hammering a local server that is busy loading or swapping the model.
    pub retry_backoff_ms: u64,

    /// Number of items analyzed concurrently. Default: 2. Clamped to the item
    /// count at run time.
    ///
    /// A local inference server usually serializes GPU work anyway; modest
    /// concurrency overlaps preprocessing and OCR with inference without
    /// queueing dozens of requests.
    pub concurrency: usize,

    /// Per-inference-call timeout in seconds. Default: 90.
    ///
    /// Without it an unresponsive server stalls one worker's queue slot
    /// indefinitely.
    pub request_timeout_secs: u64,

    /// Longest edge of the transport image in pixels. Default: 1280.
    ///
    /// Screenshots are downscaled to this bound before base64 encoding;
    /// anything larger mostly adds upload bytes without improving what the
    /// model can read.
    pub max_edge: u32,

    /// Whether to run the local OCR collaborator. Default: true.
    pub ocr_enabled: bool,

    /// OCR language passed to the external tool. Default: "eng".
    pub ocr_language: String,

    /// Optional progress callback fired per item termination.
    pub progress_callback: Option<ProgressCallback>,

    /// Cooperative cancellation flag, checked at the top of each per-item
    /// retry loop and before claiming the next item. Clone the `Arc` and set
    /// it to true to stop the batch.
    pub cancel: Arc<AtomicBool>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model: "qwen3-vl:2b".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            temperature: 0.0,
            top_p: 0.9,
            num_ctx: 8192,
            num_predict: 3072,
            keep_alive: "10m".to_string(),
            max_retries: 2,
            retry_backoff_ms: 500,
            concurrency: 2,
            request_timeout_secs: 90,
            max_edge: 1280,
            ocr_enabled: true,
            ocr_language: "eng".to_string(),
            progress_callback: None,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("model", &self.model)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("num_ctx", &self.num_ctx)
            .field("num_predict", &self.num_predict)
            .field("keep_alive", &self.keep_alive)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("concurrency", &self.concurrency)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_edge", &self.max_edge)
            .field("ocr_enabled", &self.ocr_enabled)
            .field("ocr_language", &self.ocr_language)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn callback>"),
            )
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }

    /// The generate endpoint URL derived from host + port.
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}/api/generate", self.host, self.port)
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn top_p(mut self, p: f32) -> Self {
        self.config.top_p = p.clamp(0.0, 1.0);
        self
    }

    pub fn num_ctx(mut self, n: u32) -> Self {
        self.config.num_ctx = n;
        self
    }

    pub fn num_predict(mut self, n: u32) -> Self {
        self.config.num_predict = n;
        self
    }

    pub fn keep_alive(mut self, v: impl Into<String>) -> Self {
        self.config.keep_alive = v.into();
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn max_edge(mut self, px: u32) -> Self {
        self.config.max_edge = px.max(100);
        self
    }

    pub fn ocr_enabled(mut self, v: bool) -> Self {
        self.config.ocr_enabled = v;
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.config.cancel = flag;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, ScribeError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(ScribeError::InvalidConfig("model must not be empty".into()));
        }
        if c.concurrency == 0 {
            return Err(ScribeError::InvalidConfig("concurrency must be ≥ 1".into()));
        }
        if c.request_timeout_secs == 0 {
            return Err(ScribeError::InvalidConfig(
                "request timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}
