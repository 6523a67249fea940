//! Splitter: one uploaded document in, one page object + page-ready event
//! per page out.
//!
//! Fan-out is all-or-nothing. Every page is split and stored before the
//! first event is published, so a malformed document yields no events.
//! A successful split first clears whatever an earlier upload of the same
//! name left behind (pages, texts, completion state).

use crate::error::PipelineError;
use crate::events::{self, EventBus, PageReady, SPLIT_PAGES_TOPIC};
use crate::keys;
use crate::pipeline::{completion, render};
use crate::progress::ProgressCallback;
use crate::store::{self, PageStore};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Cuts a whole document into standalone single-page documents.
#[async_trait]
pub trait PageSplitter: Send + Sync {
    /// Pages in document order. An unreadable document is an
    /// [`PipelineError::InputFormat`].
    async fn split(&self, key: &str, document: Vec<u8>) -> Result<Vec<Vec<u8>>, PipelineError>;
}

/// [`PageSplitter`] for PDFs, backed by pdfium.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfiumSplitter;

#[async_trait]
impl PageSplitter for PdfiumSplitter {
    async fn split(&self, key: &str, document: Vec<u8>) -> Result<Vec<Vec<u8>>, PipelineError> {
        render::split_pages(key, document).await
    }
}

/// Handler for document uploads under `input/`.
pub struct Splitter {
    store: Arc<dyn PageStore>,
    bus: Arc<dyn EventBus>,
    splitter: Arc<dyn PageSplitter>,
    delete_input: bool,
    progress: Option<ProgressCallback>,
}

impl Splitter {
    pub fn new(
        store: Arc<dyn PageStore>,
        bus: Arc<dyn EventBus>,
        splitter: Arc<dyn PageSplitter>,
    ) -> Self {
        Self {
            store,
            bus,
            splitter,
            delete_input: true,
            progress: None,
        }
    }

    /// Keep the upload after a successful split.
    pub fn keep_input(mut self) -> Self {
        self.delete_input = false;
        self
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Split `input_key` and publish one [`PageReady`] per page.
    ///
    /// Returns the published events in page order.
    pub async fn handle(&self, input_key: &str) -> Result<Vec<PageReady>, PipelineError> {
        let name = keys::document_name(input_key).ok_or_else(|| PipelineError::InputFormat {
            key: input_key.to_string(),
            detail: "not a PDF under input/".into(),
        })?;

        let document = store::get_required(self.store.as_ref(), input_key).await?;
        let pages = self.splitter.split(input_key, document).await?;
        if pages.is_empty() {
            return Err(PipelineError::InputFormat {
                key: input_key.to_string(),
                detail: "document has no pages".into(),
            });
        }

        let total_pages = u32::try_from(pages.len())
            .map_err(|_| PipelineError::Internal(format!("{} has too many pages", input_key)))?;

        completion::reset_document(self.store.as_ref(), name).await?;

        let mut ready = Vec::with_capacity(pages.len());
        for (page, bytes) in (1..=total_pages).zip(pages) {
            let file = keys::page_pdf_key(name, page);
            self.store.put(&file, bytes).await?;
            ready.push(PageReady {
                file,
                page,
                total_pages,
            });
        }
        info!("{}: stored {} pages", name, total_pages);

        for event in &ready {
            events::publish(self.bus.as_ref(), SPLIT_PAGES_TOPIC, event).await?;
        }

        if let Some(ref cb) = self.progress {
            cb.on_document_split(name, total_pages);
        }

        if self.delete_input {
            if let Err(e) = self.store.delete(input_key).await {
                warn!("Could not delete {} after split: {}", input_key, e);
            }
        }

        Ok(ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ChannelBus, Envelope};
    use crate::store::MemoryStore;

    /// Splits on form feeds; a document without `%` is malformed.
    struct FormFeedSplitter;

    #[async_trait]
    impl PageSplitter for FormFeedSplitter {
        async fn split(&self, key: &str, document: Vec<u8>) -> Result<Vec<Vec<u8>>, PipelineError> {
            if !document.starts_with(b"%") {
                return Err(PipelineError::InputFormat {
                    key: key.to_string(),
                    detail: "bad header".into(),
                });
            }
            Ok(document[1..]
                .split(|b| *b == 0x0c)
                .map(<[u8]>::to_vec)
                .collect())
        }
    }

    fn setup() -> (
        Arc<MemoryStore>,
        Splitter,
        tokio::sync::mpsc::UnboundedReceiver<Envelope>,
    ) {
        let store = Arc::new(MemoryStore::new());
        let (bus, rx) = ChannelBus::new();
        let splitter = Splitter::new(store.clone(), Arc::new(bus), Arc::new(FormFeedSplitter));
        (store, splitter, rx)
    }

    #[tokio::test]
    async fn emits_one_event_per_page() {
        let (store, splitter, mut rx) = setup();
        store
            .put("input/acme.pdf", b"%one\x0ctwo\x0cthree".to_vec())
            .await
            .unwrap();

        let ready = splitter.handle("input/acme.pdf").await.unwrap();
        assert_eq!(ready.len(), 3);

        let mut pages = Vec::new();
        while let Ok(env) = rx.try_recv() {
            assert_eq!(env.topic, SPLIT_PAGES_TOPIC);
            let event: PageReady = env.decode().unwrap();
            assert_eq!(event.total_pages, 3);
            pages.push(event.page);
        }
        assert_eq!(pages, vec![1, 2, 3]);

        assert_eq!(
            store.get("output/pdf/acme_page_2.pdf").await.unwrap().unwrap(),
            b"two"
        );
        assert!(store.get("input/acme.pdf").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_document_emits_nothing() {
        let (store, splitter, mut rx) = setup();
        store.put("input/bad.pdf", b"garbage".to_vec()).await.unwrap();

        let err = splitter.handle("input/bad.pdf").await.unwrap_err();
        assert!(matches!(err, PipelineError::InputFormat { .. }));
        assert!(rx.try_recv().is_err());
        assert!(store.list(keys::PDF_DIR).await.unwrap().is_empty());
        // The upload stays for inspection.
        assert!(store.get("input/bad.pdf").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn reupload_replaces_previous_pages() {
        let (store, splitter, _rx) = setup();
        store.put("input/acme.pdf", b"%a\x0cb\x0cc".to_vec()).await.unwrap();
        splitter.handle("input/acme.pdf").await.unwrap();
        store.put(&keys::page_text_key("acme", 3), b"old".to_vec()).await.unwrap();
        store.put(&keys::completion_key("acme"), b"{}".to_vec()).await.unwrap();

        store.put("input/acme.pdf", b"%x\x0cy".to_vec()).await.unwrap();
        let ready = splitter.handle("input/acme.pdf").await.unwrap();
        assert_eq!(ready.len(), 2);
        assert_eq!(
            store.list(keys::PDF_DIR).await.unwrap(),
            vec!["output/pdf/acme_page_1.pdf", "output/pdf/acme_page_2.pdf"]
        );
        assert!(store.list(keys::TXT_DIR).await.unwrap().is_empty());
        assert!(store.get(&keys::completion_key("acme")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_reupload_keeps_previous_pages() {
        let (store, splitter, _rx) = setup();
        store.put("input/acme.pdf", b"%a".to_vec()).await.unwrap();
        splitter.handle("input/acme.pdf").await.unwrap();

        store.put("input/acme.pdf", b"garbage".to_vec()).await.unwrap();
        assert!(splitter.handle("input/acme.pdf").await.is_err());
        assert!(store.get("output/pdf/acme_page_1.pdf").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn rejects_non_input_keys() {
        let (_store, splitter, _rx) = setup();
        let err = splitter.handle("output/pdf/x.pdf").await.unwrap_err();
        assert!(matches!(err, PipelineError::InputFormat { .. }));
    }
}
