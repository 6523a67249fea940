//! Configuration types for the minute-book pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built
//! via its [`PipelineConfigBuilder`]. One struct is shared by every stage
//! handler so a run can be reproduced from a single value.

use crate::error::PipelineError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Configuration for the minute-book pipeline.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_minutebook::{AggregationPolicy, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .bucket("minute-books-prod")
///     .quorum_token_budget(4096)
///     .aggregation(AggregationPolicy::Strict)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Bucket name used in provenance links. Default: "minute-books".
    pub bucket: String,

    /// Base URL of provenance links. Default: "https://storage.cloud.google.com".
    ///
    /// Links take the form `<base>/<bucket>/output/pdf/<name>_page_<n>.pdf`.
    pub provenance_base_url: String,

    /// LLM model identifier. If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for extraction and recognition calls. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per call. Default: 1024.
    pub max_tokens: usize,

    /// Maximum rendered page dimension for vision recognition. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Token budget of one director-election window. Default: 1024.
    pub director_token_budget: usize,

    /// Token budget of one quorum window. Default: 3072.
    ///
    /// Quorum rules often run across a page break, so this window is wider.
    pub quorum_token_budget: usize,

    /// Number of section parsers run at once for one document. Default: 6.
    pub section_concurrency: usize,

    /// Number of pages recognized at once by [`crate::runtime::LocalPipeline`]. Default: 10.
    pub page_concurrency: usize,

    /// What to do when some section parsers fail. Default: [`AggregationPolicy::BestEffort`].
    pub aggregation: AggregationPolicy,

    /// How page completion is detected. Default: [`CompletionStrategy::Countdown`].
    pub completion: CompletionStrategy,

    /// Delete `input/<name>.pdf` after a successful split. Default: true.
    pub delete_input_after_split: bool,

    /// Observer for per-page and per-section events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bucket: "minute-books".to_string(),
            provenance_base_url: "https://storage.cloud.google.com".to_string(),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.2,
            max_tokens: 1024,
            max_rendered_pixels: 2000,
            director_token_budget: 1024,
            quorum_token_budget: 3072,
            section_concurrency: 6,
            page_concurrency: 10,
            aggregation: AggregationPolicy::default(),
            completion: CompletionStrategy::default(),
            delete_input_after_split: true,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("bucket", &self.bucket)
            .field("provenance_base_url", &self.provenance_base_url)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("director_token_budget", &self.director_token_budget)
            .field("quorum_token_budget", &self.quorum_token_budget)
            .field("section_concurrency", &self.section_concurrency)
            .field("page_concurrency", &self.page_concurrency)
            .field("aggregation", &self.aggregation)
            .field("completion", &self.completion)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
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
    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.bucket = bucket.into();
        self
    }

    pub fn provenance_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.provenance_base_url = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn director_token_budget(mut self, n: usize) -> Self {
        self.config.director_token_budget = n;
        self
    }

    pub fn quorum_token_budget(mut self, n: usize) -> Self {
        self.config.quorum_token_budget = n;
        self
    }

    pub fn section_concurrency(mut self, n: usize) -> Self {
        self.config.section_concurrency = n.max(1);
        self
    }

    pub fn page_concurrency(mut self, n: usize) -> Self {
        self.config.page_concurrency = n.max(1);
        self
    }

    pub fn aggregation(mut self, policy: AggregationPolicy) -> Self {
        self.config.aggregation = policy;
        self
    }

    pub fn completion(mut self, strategy: CompletionStrategy) -> Self {
        self.config.completion = strategy;
        self
    }

    pub fn delete_input_after_split(mut self, v: bool) -> Self {
        self.config.delete_input_after_split = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.director_token_budget == 0 || c.quorum_token_budget == 0 {
            return Err(PipelineError::InvalidConfig(
                "Token budgets must be ≥ 1".into(),
            ));
        }
        if c.bucket.is_empty() {
            return Err(PipelineError::InvalidConfig("Bucket name is empty".into()));
        }
        if !(c.provenance_base_url.starts_with("http://")
            || c.provenance_base_url.starts_with("https://"))
        {
            return Err(PipelineError::InvalidConfig(format!(
                "Provenance base URL must be http(s), got '{}'",
                c.provenance_base_url
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// What the aggregator does when some section parsers fail.
///
/// | Policy | Failed parser |
/// |--------|---------------|
/// | `BestEffort` | final output holds the sections that succeeded (default) |
/// | `Strict` | no final output; [`PipelineError::PartialSectionFailure`] |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AggregationPolicy {
    Strict,
    #[default]
    BestEffort,
}

/// How a page processor decides that its document is fully recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CompletionStrategy {
    /// List recognized-text objects and compare with `total_pages`.
    /// Concurrent pages can all see the full count and all fire.
    Recount,
    /// Compare-and-swap a per-document set of completed pages; fires once.
    #[default]
    Countdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_section_budgets() {
        let c = PipelineConfig::default();
        assert_eq!(c.director_token_budget, 1024);
        assert_eq!(c.quorum_token_budget, 3072);
        assert_eq!(c.aggregation, AggregationPolicy::BestEffort);
        assert_eq!(c.completion, CompletionStrategy::Countdown);
    }

    #[test]
    fn builder_rejects_zero_budget() {
        let err = PipelineConfig::builder()
            .quorum_token_budget(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_non_http_base() {
        assert!(PipelineConfig::builder()
            .provenance_base_url("gs://bucket")
            .build()
            .is_err());
    }

    #[test]
    fn builder_clamps_concurrency() {
        let c = PipelineConfig::builder()
            .section_concurrency(0)
            .page_concurrency(0)
            .build()
            .unwrap();
        assert_eq!(c.section_concurrency, 1);
        assert_eq!(c.page_concurrency, 1);
    }
}
