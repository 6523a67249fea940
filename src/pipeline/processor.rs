//! PageProcessor: recognize one split page and gate document completion.

use crate::error::PipelineError;
use crate::events::{self, DocumentReady, EventBus, PageReady, PARSE_TOPIC};
use crate::keys;
use crate::oracle::{best_label, RecognitionMode, RecognitionOracle};
use crate::pipeline::completion::CompletionTracker;
use crate::progress::ProgressCallback;
use crate::store::{self, PageStore};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Handler for page-ready events.
pub struct PageProcessor {
    store: Arc<dyn PageStore>,
    bus: Arc<dyn EventBus>,
    recognizer: Arc<dyn RecognitionOracle>,
    tracker: Arc<dyn CompletionTracker>,
    progress: Option<ProgressCallback>,
}

impl PageProcessor {
    pub fn new(
        store: Arc<dyn PageStore>,
        bus: Arc<dyn EventBus>,
        recognizer: Arc<dyn RecognitionOracle>,
        tracker: Arc<dyn CompletionTracker>,
    ) -> Self {
        Self {
            store,
            bus,
            recognizer,
            tracker,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Recognize the page and, if it completes its document, publish and
    /// return the document-ready event.
    ///
    /// On a recognition failure nothing is written for the page, so the
    /// document cannot complete until the event is redelivered.
    pub async fn handle(&self, event: &PageReady) -> Result<Option<DocumentReady>, PipelineError> {
        match self.process(event).await {
            Ok(ready) => Ok(ready),
            Err(e) => {
                warn!("Page {} ({}) failed: {}", event.page, event.file, e);
                if let Some(ref cb) = self.progress {
                    cb.on_page_error(event.page, event.total_pages, &e.to_string());
                }
                Err(e)
            }
        }
    }

    async fn process(&self, event: &PageReady) -> Result<Option<DocumentReady>, PipelineError> {
        let name = keys::document_name_from_page_key(&event.file).ok_or_else(|| {
            PipelineError::Event {
                topic: events::SPLIT_PAGES_TOPIC.to_string(),
                detail: format!("'{}' is not a page key", event.file),
            }
        })?;

        let page_pdf = store::get_required(self.store.as_ref(), &event.file).await?;

        let classes = self
            .recognizer
            .classify(&page_pdf)
            .await
            .map_err(|e| recognition_error(event, e))?;
        let label = best_label(&classes);

        let text = match RecognitionMode::for_label(label) {
            Some(mode) => {
                debug!("Page {}: '{}' → {:?}", event.page, label.unwrap_or_default(), mode);
                self.recognizer
                    .recognize(&page_pdf, mode)
                    .await
                    .map_err(|e| recognition_error(event, e))?
                    .into_page_text()
            }
            None => {
                debug!("Page {}: label {:?} needs no recognition", event.page, label);
                String::new()
            }
        };

        let text_key = keys::text_key_for_pdf(&event.file);
        let text_len = text.len();
        self.store.put(&text_key, text.into_bytes()).await?;
        info!("Page {}/{}: {} chars → {}", event.page, event.total_pages, text_len, text_key);

        if let Some(ref cb) = self.progress {
            cb.on_page_recognized(event.page, event.total_pages, text_len);
        }

        if !self.tracker.record(&name, event.page, event.total_pages).await? {
            return Ok(None);
        }

        let ready = DocumentReady {
            prefix: keys::text_prefix(&name),
        };
        if let Err(e) = events::publish(self.bus.as_ref(), PARSE_TOPIC, &ready).await {
            if let Err(release) = self.tracker.release(&name).await {
                warn!("{}: could not release completion: {}", name, release);
            }
            return Err(e);
        }
        info!("{}: document ready", name);
        Ok(Some(ready))
    }
}

/// Attach the page's key and index to a recognizer failure.
fn recognition_error(event: &PageReady, err: PipelineError) -> PipelineError {
    let detail = match err {
        PipelineError::Recognition { detail, .. } => detail,
        other => other.to_string(),
    };
    PipelineError::Recognition {
        key: event.file.clone(),
        page: event.page,
        detail,
    }
}
