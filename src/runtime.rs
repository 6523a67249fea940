//! LocalPipeline: every stage wired in one process through a [`ChannelBus`].
//!
//! Stands in for the deployed topology (object-store notification →
//! splitter, `split-pages` → page processors, `parse-minute-book` →
//! engine + aggregator) so a document can be processed end to end on one
//! machine, and so the stages can be tested together.
//!
//! ## Event loop
//!
//! Published envelopes are drained with `try_recv` and dispatched into a
//! `JoinSet`; the loop then waits on the next finished task. Every task
//! publishes before it completes, so when the set is empty and the channel
//! is drained the run is over.

use crate::aggregate::{AggregationReport, Aggregator};
use crate::config::PipelineConfig;
use crate::engine::SectionEngine;
use crate::error::PipelineError;
use crate::events::{ChannelBus, DocumentReady, PageReady, PARSE_TOPIC, SPLIT_PAGES_TOPIC};
use crate::oracle::{self, ExtractionOracle, LlmExtractionOracle, RecognitionOracle, VisionRecognitionOracle};
use crate::pipeline::completion;
use crate::pipeline::processor::PageProcessor;
use crate::pipeline::splitter::{PageSplitter, PdfiumSplitter, Splitter};
use crate::store::PageStore;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// What a full local run produced.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub total_pages: u32,
    pub recognized_pages: u32,
    /// `(page, error)` for every page that failed recognition.
    pub page_failures: Vec<(u32, String)>,
    /// One report per distinct document-ready event handled.
    pub reports: Vec<AggregationReport>,
    /// Document-ready events that arrived again and were skipped.
    pub duplicate_events: usize,
}

enum TaskOutcome {
    Page(u32),
    PageFailed(u32, String),
    Document(Option<AggregationReport>),
}

pub struct LocalPipeline {
    store: Arc<dyn PageStore>,
    splitter: Arc<dyn PageSplitter>,
    recognizer: Arc<dyn RecognitionOracle>,
    extractor: Arc<dyn ExtractionOracle>,
    config: PipelineConfig,
}

impl LocalPipeline {
    pub fn new(
        store: Arc<dyn PageStore>,
        splitter: Arc<dyn PageSplitter>,
        recognizer: Arc<dyn RecognitionOracle>,
        extractor: Arc<dyn ExtractionOracle>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            splitter,
            recognizer,
            extractor,
            config,
        }
    }

    /// pdfium splitting plus LLM-backed recognition and extraction, with
    /// the provider resolved from `config` and the environment.
    pub fn from_config(
        store: Arc<dyn PageStore>,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        let provider = oracle::resolve_provider(&config)?;
        info!(
            "LLM provider resolved (model: {})",
            config.model.as_deref().unwrap_or("provider default")
        );
        let recognizer = Arc::new(VisionRecognitionOracle::new(Arc::clone(&provider), &config));
        let extractor = Arc::new(LlmExtractionOracle::new(provider, &config));
        Ok(Self::new(store, Arc::new(PdfiumSplitter), recognizer, extractor, config))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn splitter_stage(&self, bus: Arc<ChannelBus>) -> Splitter {
        let stage = Splitter::new(Arc::clone(&self.store), bus, Arc::clone(&self.splitter))
            .with_progress(self.config.progress_callback.clone());
        if self.config.delete_input_after_split {
            stage
        } else {
            stage.keep_input()
        }
    }

    fn processor_stage(&self, bus: Arc<ChannelBus>) -> PageProcessor {
        let tracker = completion::tracker_for(self.config.completion, Arc::clone(&self.store));
        PageProcessor::new(
            Arc::clone(&self.store),
            bus,
            Arc::clone(&self.recognizer),
            tracker,
        )
        .with_progress(self.config.progress_callback.clone())
    }

    fn engine(&self) -> SectionEngine {
        SectionEngine::new(
            Arc::clone(&self.store),
            Arc::clone(&self.extractor),
            &self.config,
        )
    }

    fn aggregator(&self) -> Aggregator {
        Aggregator::new(Arc::clone(&self.store), &self.config)
    }

    // ── Single stages ────────────────────────────────────────────────────

    /// Run only the splitter on `input_key`.
    pub async fn split(&self, input_key: &str) -> Result<Vec<PageReady>, PipelineError> {
        let (bus, _rx) = ChannelBus::new();
        self.splitter_stage(Arc::new(bus)).handle(input_key).await
    }

    /// Run only the page processor on one page-ready event.
    pub async fn recognize(&self, event: &PageReady) -> Result<Option<DocumentReady>, PipelineError> {
        let (bus, _rx) = ChannelBus::new();
        self.processor_stage(Arc::new(bus)).handle(event).await
    }

    /// Run the engine and aggregator for a document-ready `prefix`.
    ///
    /// `Ok(None)` when the prefix has no recognized pages.
    pub async fn parse(&self, prefix: &str) -> Result<Option<AggregationReport>, PipelineError> {
        parse_document(&self.engine(), &self.aggregator(), prefix).await
    }

    // ── Full run ─────────────────────────────────────────────────────────

    /// Split `input_key` and drive every resulting event to completion.
    ///
    /// Page failures are collected in the summary; the document then never
    /// completes. Engine and aggregation errors end the run.
    pub async fn run(&self, input_key: &str) -> Result<RunSummary, PipelineError> {
        let (bus, mut rx) = ChannelBus::new();
        let bus = Arc::new(bus);

        let pages = self.splitter_stage(Arc::clone(&bus)).handle(input_key).await?;
        let mut summary = RunSummary {
            total_pages: pages.len() as u32,
            ..Default::default()
        };

        let processor = Arc::new(self.processor_stage(Arc::clone(&bus)));
        let engine = Arc::new(self.engine());
        let aggregator = Arc::new(self.aggregator());
        let permits = Arc::new(Semaphore::new(self.config.page_concurrency.max(1)));
        let mut handled: HashSet<String> = HashSet::new();
        let mut tasks: JoinSet<Result<TaskOutcome, PipelineError>> = JoinSet::new();

        loop {
            while let Ok(envelope) = rx.try_recv() {
                match envelope.topic.as_str() {
                    SPLIT_PAGES_TOPIC => {
                        let event: PageReady = envelope.decode()?;
                        let processor = Arc::clone(&processor);
                        let permits = Arc::clone(&permits);
                        tasks.spawn(async move {
                            let _permit = permits
                                .acquire_owned()
                                .await
                                .map_err(|e| PipelineError::Internal(e.to_string()))?;
                            Ok(match processor.handle(&event).await {
                                Ok(_) => TaskOutcome::Page(event.page),
                                Err(e) => TaskOutcome::PageFailed(event.page, e.to_string()),
                            })
                        });
                    }
                    PARSE_TOPIC => {
                        let event: DocumentReady = envelope.decode()?;
                        if !handled.insert(event.prefix.clone()) {
                            debug!("Duplicate document-ready for {}", event.prefix);
                            summary.duplicate_events += 1;
                            continue;
                        }
                        let engine = Arc::clone(&engine);
                        let aggregator = Arc::clone(&aggregator);
                        tasks.spawn(async move {
                            parse_document(&engine, &aggregator, &event.prefix)
                                .await
                                .map(TaskOutcome::Document)
                        });
                    }
                    other => warn!("Ignoring envelope on unknown topic '{}'", other),
                }
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            match joined.map_err(|e| PipelineError::Internal(format!("task panicked: {e}")))?? {
                TaskOutcome::Page(_) => summary.recognized_pages += 1,
                TaskOutcome::PageFailed(page, error) => summary.page_failures.push((page, error)),
                TaskOutcome::Document(Some(report)) => summary.reports.push(report),
                TaskOutcome::Document(None) => {}
            }
        }

        info!(
            "Run finished: {}/{} pages recognized, {} documents aggregated",
            summary.recognized_pages,
            summary.total_pages,
            summary.reports.len()
        );
        Ok(summary)
    }
}

/// Document-ready handler: engine pass, then aggregation.
async fn parse_document(
    engine: &SectionEngine,
    aggregator: &Aggregator,
    prefix: &str,
) -> Result<Option<AggregationReport>, PipelineError> {
    let run = engine.run(prefix).await?;
    if run.pages == 0 {
        return Ok(None);
    }
    aggregator.finish(&run).await.map(Some)
}
