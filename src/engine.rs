//! SectionEngine: load a document's page snapshot once, then fan out to
//! every section parser and wait for all of them.
//!
//! ## Why a snapshot?
//!
//! All parsers read the same immutable `Vec<Page>`, sorted by page index,
//! so windowing and last-page detection agree across sections. Each run
//! starts from a fresh read of the store, which makes a duplicate
//! document-ready event a harmless re-run.
//!
//! ## Failure isolation
//!
//! Parsers run concurrently (bounded by `section_concurrency`). A parser
//! that fails is recorded as a [`SectionFailure`]; its siblings still
//! finish and write their outputs.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, SectionFailure};
use crate::keys;
use crate::oracle::ExtractionOracle;
use crate::progress::ProgressCallback;
use crate::sections::{self, Page, SectionParser};
use crate::store::{self, PageStore};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// What one engine pass did for a document.
#[derive(Debug, Clone)]
pub struct SectionRun {
    pub name: String,
    /// Pages in the snapshot; zero means nothing was parsed.
    pub pages: usize,
    /// Every registered section, in registration order.
    pub sections: Vec<&'static str>,
    /// Sections whose output was written to `temp/`.
    pub written: Vec<&'static str>,
    pub failures: Vec<SectionFailure>,
}

pub struct SectionEngine {
    store: Arc<dyn PageStore>,
    oracle: Arc<dyn ExtractionOracle>,
    parsers: Vec<Arc<dyn SectionParser>>,
    bucket: String,
    provenance_base_url: String,
    concurrency: usize,
    progress: Option<ProgressCallback>,
}

impl SectionEngine {
    /// Engine running the default parsers.
    pub fn new(
        store: Arc<dyn PageStore>,
        oracle: Arc<dyn ExtractionOracle>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            store,
            oracle,
            parsers: sections::default_parsers(config),
            bucket: config.bucket.clone(),
            provenance_base_url: config.provenance_base_url.clone(),
            concurrency: config.section_concurrency.max(1),
            progress: config.progress_callback.clone(),
        }
    }

    /// Replace the registered parsers.
    pub fn with_parsers(mut self, parsers: Vec<Arc<dyn SectionParser>>) -> Self {
        self.parsers = parsers;
        self
    }

    pub fn section_names(&self) -> Vec<&'static str> {
        self.parsers.iter().map(|p| p.name()).collect()
    }

    /// Read every recognized page of document `name`, sorted by index.
    pub async fn load_snapshot(&self, name: &str) -> Result<Vec<Page>, PipelineError> {
        let listed = self.store.list(&keys::page_text_listing(name)).await?;

        let mut by_index: BTreeMap<u32, String> = BTreeMap::new();
        for key in listed {
            match keys::page_index(&key) {
                Some(index) if keys::is_page_of(&key, name) => {
                    by_index.insert(index, key);
                }
                _ => debug!("Ignoring {} for {}", key, name),
            }
        }

        let count = by_index.len() as u32;
        let mut pages = Vec::with_capacity(by_index.len());
        for (index, key) in by_index {
            let text = store::get_text(self.store.as_ref(), &key).await?;
            let url = keys::provenance_url(&self.provenance_base_url, &self.bucket, &key)
                .ok_or_else(|| {
                    PipelineError::InvalidConfig(format!(
                        "cannot build a provenance URL from '{}'",
                        self.provenance_base_url
                    ))
                })?;
            pages.push(Page::new(index, key, url, text, index == count));
        }
        Ok(pages)
    }

    /// Parse the document behind a document-ready `prefix` and write each
    /// successful section to `temp/<name>_<section>.json`.
    pub async fn run(&self, prefix: &str) -> Result<SectionRun, PipelineError> {
        let name = keys::document_name_from_prefix(prefix)
            .ok_or_else(|| PipelineError::Event {
                topic: crate::events::PARSE_TOPIC.to_string(),
                detail: format!("'{}' is not a text prefix", prefix),
            })?
            .to_string();

        let start = Instant::now();
        let pages = self.load_snapshot(&name).await?;
        let mut run = SectionRun {
            name: name.clone(),
            pages: pages.len(),
            sections: self.section_names(),
            written: Vec::new(),
            failures: Vec::new(),
        };
        if pages.is_empty() {
            warn!("{}: no recognized pages, skipping parse", name);
            return Ok(run);
        }
        info!("{}: parsing {} pages with {} sections", name, pages.len(), self.parsers.len());

        let pages = &pages;
        let name = &name;
        let pending: Vec<BoxFuture<'_, (&'static str, Result<(), PipelineError>)>> = self
            .parsers
            .iter()
            .cloned()
            .map(|parser| {
                async move {
                    let section = parser.name();
                    let result = self.parse_one(parser.as_ref(), name, pages).await;
                    if let Some(ref cb) = self.progress {
                        match &result {
                            Ok(()) => cb.on_section_complete(section),
                            Err(e) => cb.on_section_error(section, &e.to_string()),
                        }
                    }
                    (section, result)
                }
                .boxed()
            })
            .collect();
        let outcomes: Vec<(&'static str, Result<(), PipelineError>)> = stream::iter(pending)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for (section, result) in outcomes {
            match result {
                Ok(()) => run.written.push(section),
                Err(e) => {
                    warn!("{}: section {} failed: {}", name, section, e);
                    run.failures.push(SectionFailure {
                        section: section.to_string(),
                        detail: e.to_string(),
                    });
                }
            }
        }
        let registered = run.sections.clone();
        let order = |s: &str| registered.iter().position(|x| *x == s);
        run.written.sort_by_key(|s| order(s));
        run.failures.sort_by_key(|f| order(&f.section));

        info!(
            "{}: {}/{} sections in {}ms",
            name,
            run.written.len(),
            run.sections.len(),
            start.elapsed().as_millis()
        );
        Ok(run)
    }

    async fn parse_one(
        &self,
        parser: &dyn SectionParser,
        name: &str,
        pages: &[Page],
    ) -> Result<(), PipelineError> {
        let output = parser.parse(pages, self.oracle.as_ref()).await?;
        let bytes = output
            .to_pretty_json()
            .map_err(|e| PipelineError::Internal(format!("serialising {}: {}", output.section, e)))?;
        self.store
            .put(&keys::section_key(name, output.section), bytes)
            .await
    }
}
