//! Error types for the edgequake-minutebook library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PipelineError`]: **Fatal** for the handler that returns it: the
//!   split, the page, or the parser cannot proceed. The event-delivery
//!   layer is expected to redeliver the triggering event; nothing here
//!   retries internally.
//!
//! * [`SectionFailure`]: **Non-fatal** for the document: one section
//!   parser failed but its siblings finished. Stored inside
//!   [`crate::aggregate::AggregationReport`] so callers can see which
//!   sections are missing from the final output.
//!
//! A "Not Found" answer from an oracle is not an error at all; it is
//! handled by [`crate::oracle::Question::interpret`].

use thiserror::Error;

/// All fatal errors returned by the edgequake-minutebook library.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The uploaded document could not be split into pages.
    #[error("Input '{key}' is not a readable document: {detail}")]
    InputFormat { key: String, detail: String },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    // ── Oracle errors ─────────────────────────────────────────────────────
    /// The recognition service failed on one page.
    #[error("Recognition failed for page {page} ('{key}'): {detail}")]
    Recognition {
        key: String,
        page: u32,
        detail: String,
    },

    /// An oracle answer was not valid structured output for its schema.
    #[error("Section '{section}': unparseable oracle answer: {detail}")]
    ExtractionParse { section: String, detail: String },

    /// The extraction oracle call itself failed.
    #[error("Extraction oracle error: {0}")]
    Oracle(String),

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Substrate errors ──────────────────────────────────────────────────
    /// A page-store read, write, list or delete failed.
    #[error("Storage error on '{key}': {detail}")]
    Storage { key: String, detail: String },

    /// Publishing to the event bus failed.
    #[error("Failed to publish to topic '{topic}': {detail}")]
    Bus { topic: String, detail: String },

    /// An event payload could not be decoded.
    #[error("Malformed event on topic '{topic}': {detail}")]
    Event { topic: String, detail: String },

    // ── Section errors ────────────────────────────────────────────────────
    /// At least one section parser failed and the policy is strict.
    #[error("{}/{total} section parsers failed for '{prefix}': {}", .failed.len(), .failed.join(", "))]
    PartialSectionFailure {
        prefix: String,
        failed: Vec<String>,
        total: usize,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub(crate) fn storage(key: impl Into<String>, detail: impl ToString) -> Self {
        PipelineError::Storage {
            key: key.into(),
            detail: detail.to_string(),
        }
    }
}

/// A non-fatal failure of a single section parser.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[error("Section '{section}' failed: {detail}")]
pub struct SectionFailure {
    pub section: String,
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_failure_display() {
        let e = PipelineError::PartialSectionFailure {
            prefix: "output/txt/acme".into(),
            failed: vec!["quorum_rules".into()],
            total: 3,
        };
        let msg = e.to_string();
        assert!(msg.contains("1/3"), "got: {msg}");
        assert!(msg.contains("quorum_rules"), "got: {msg}");
    }

    #[test]
    fn recognition_display_names_page() {
        let e = PipelineError::Recognition {
            key: "output/pdf/acme_page_4.pdf".into(),
            page: 4,
            detail: "503".into(),
        };
        assert!(e.to_string().contains("page 4"));
    }

    #[test]
    fn section_failure_display() {
        let f = SectionFailure {
            section: "directors".into(),
            detail: "oracle timeout".into(),
        };
        assert!(f.to_string().contains("directors"));
        assert!(f.to_string().contains("oracle timeout"));
    }
}
