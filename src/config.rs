//! Configuration types.
//!
//! Two structs with two lifetimes:
//!
//! * [`ApiConfig`] is user data. It lives inside the persisted
//!   [`crate::record::AppState`] and is edited through the record store.
//! * [`PipelineConfig`] is process configuration for one
//!   [`crate::process::InvoiceProcessor`], built via its
//!   [`PipelineConfigBuilder`] and never persisted.

use crate::error::InvoiceError;
use crate::progress::ProcessingObserver;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Model endpoint settings, stored in the snapshot.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    /// OpenAI-compatible base URL, e.g. `http://localhost:1234/v1`.
    pub base_url: String,

    /// Vision model identifier.
    pub model: String,

    /// Maximum completion tokens. Default: 4096.
    ///
    /// A multi-page invoice with dozens of line items easily exceeds 1 000
    /// output tokens; truncated replies fail JSON parsing.
    pub max_tokens: u32,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Bearer credential forwarded to the endpoint (through the proxy when one
    /// is configured).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:1234/v1".to_string(),
            model: "qwen/qwen3-vl-8b".to_string(),
            max_tokens: 4096,
            temperature: 0.1,
            api_key: None,
        }
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ApiConfig {
    /// Check that the base URL is an absolute http(s) URL and the sampling
    /// parameters are in range.
    pub fn validate(&self) -> Result<(), InvoiceError> {
        let url = reqwest::Url::parse(&self.base_url).map_err(|e| {
            InvoiceError::InvalidConfig(format!("baseUrl '{}' is not a URL: {e}", self.base_url))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(InvoiceError::InvalidConfig(format!(
                "baseUrl must be http or https, got '{}'",
                url.scheme()
            )));
        }
        if self.max_tokens == 0 {
            return Err(InvoiceError::InvalidConfig("maxTokens must be ≥ 1".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(InvoiceError::InvalidConfig(format!(
                "temperature must be 0.0–2.0, got {}",
                self.temperature
            )));
        }
        Ok(())
    }

    /// `{baseUrl}/chat/completions`, tolerating a trailing slash.
    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Per-processor settings.
///
/// # Example
/// ```rust
/// use invoice_extract::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .scale(1.5)
///     .concurrency(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_retries, 0);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Render scale relative to the PDF's 72-dpi page size. Range 0.5–4.0. Default: 2.0.
    ///
    /// 2× keeps small print legible to the model while a letter-size page
    /// stays around 1 224 × 1 584 px.
    pub scale: f32,

    /// Maximum number of files in flight in [`crate::process::InvoiceProcessor::process_files`].
    /// Default: 4.
    pub concurrency: usize,

    /// Extra attempts for a retryable model-call failure. Default: 0.
    ///
    /// Model endpoints bill per request, so a failed call is not repeated
    /// unless the caller asks for it.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Optional lifecycle observer.
    pub observer: Option<Arc<dyn ProcessingObserver>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scale: 2.0,
            concurrency: 4,
            max_retries: 0,
            retry_backoff_ms: 500,
            observer: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("scale", &self.scale)
            .field("concurrency", &self.concurrency)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field(
                "observer",
                &self.observer.as_ref().map(|_| "<dyn ProcessingObserver>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn scale(mut self, scale: f32) -> Self {
        self.config.scale = scale;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
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

    pub fn observer(mut self, observer: Arc<dyn ProcessingObserver>) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, InvoiceError> {
        let c = &self.config;
        if !(0.5..=4.0).contains(&c.scale) {
            return Err(InvoiceError::InvalidConfig(format!(
                "scale must be 0.5–4.0, got {}",
                c.scale
            )));
        }
        if c.concurrency == 0 {
            return Err(InvoiceError::InvalidConfig("concurrency must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}
