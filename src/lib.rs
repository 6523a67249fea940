//! # edgequake-minutebook
//!
//! Recover directors, quorum rules and share restrictions, with page-level
//! provenance, from scanned corporate minute books.
//!
//! ## Why this crate?
//!
//! A minute book is hundreds of scanned pages where the facts a lawyer
//! needs (who sat on the board and when, what makes a quorum, how shares
//! may be transferred) are scattered across registers, by-laws and
//! resolutions. This crate splits the book into pages, recognizes each
//! page with a vision model, then runs independent section parsers that
//! gather just enough context around each trigger phrase to ask an LLM a
//! focused question, and link every answer back to the page it came from.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input/<name>.pdf
//!  │
//!  ├─ 1. Split      one PDF per page, one page-ready event each
//!  ├─ 2. Recognize  classify → OCR or form parsing → output/txt/…
//!  ├─ 3. Complete   exactly one document-ready when every page has text
//!  ├─ 4. Parse      section parsers in parallel over the page snapshot
//!  └─ 5. Aggregate  temp/<name>_<section>.json → output/final/<name>.json
//! ```
//!
//! Every stage is a handler driven by an event; all durable state is in a
//! [`PageStore`]. [`LocalPipeline`] wires the handlers together in one
//! process.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_minutebook::{FsStore, LocalPipeline, PageStore, PipelineConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let store = Arc::new(FsStore::new("./minutebook-data"));
//!     store.put("input/acme.pdf", std::fs::read("acme.pdf")?).await?;
//!
//!     let pipeline = LocalPipeline::from_config(store.clone(), PipelineConfig::default())?;
//!     let summary = pipeline.run("input/acme.pdf").await?;
//!     for report in &summary.reports {
//!         eprintln!("{:?} ({} sections)", report.final_key, report.sections.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `minutebook` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-minutebook = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod keys;
pub mod oracle;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod runtime;
pub mod sections;
pub mod store;
pub mod tokens;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use aggregate::{AggregationReport, Aggregator};
pub use config::{AggregationPolicy, CompletionStrategy, PipelineConfig, PipelineConfigBuilder};
pub use engine::{SectionEngine, SectionRun};
pub use error::{PipelineError, SectionFailure};
pub use events::{ChannelBus, DocumentReady, Envelope, EventBus, PageReady};
pub use oracle::{
    ExtractionOracle, LlmExtractionOracle, RecognitionOracle, VisionRecognitionOracle,
};
pub use pipeline::completion::{CompletionTracker, CountdownTracker, RecountTracker};
pub use pipeline::processor::PageProcessor;
pub use pipeline::splitter::{PageSplitter, PdfiumSplitter, Splitter};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use runtime::{LocalPipeline, RunSummary};
pub use sections::{Page, SectionOutput, SectionParser};
pub use store::{FsStore, MemoryStore, PageStore};
