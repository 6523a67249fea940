//! Event payloads and the bus that carries them between stages.
//!
//! Delivery is at-least-once: every consumer must tolerate duplicates.
//! Payloads are small JSON documents so they survive any transport.

use crate::error::PipelineError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// Topic carrying one [`PageReady`] per split page.
pub const SPLIT_PAGES_TOPIC: &str = "split-pages";

/// Topic carrying [`DocumentReady`] once all pages are recognized.
pub const PARSE_TOPIC: &str = "parse-minute-book";

/// One split page is stored and waiting for recognition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageReady {
    /// Key of the split page PDF (`output/pdf/<name>_page_<n>.pdf`).
    pub file: String,
    /// 1-based page index.
    pub page: u32,
    pub total_pages: u32,
}

/// Every page of a document has recognized text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentReady {
    /// Text prefix, `output/txt/<name>`.
    pub prefix: String,
}

/// A message as it travels on the bus.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn encode<T: Serialize>(topic: &str, event: &T) -> Result<Self, PipelineError> {
        let payload = serde_json::to_vec(event).map_err(|e| PipelineError::Event {
            topic: topic.to_string(),
            detail: e.to_string(),
        })?;
        Ok(Self {
            topic: topic.to_string(),
            payload,
        })
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, PipelineError> {
        serde_json::from_slice(&self.payload).map_err(|e| PipelineError::Event {
            topic: self.topic.clone(),
            detail: e.to_string(),
        })
    }
}

/// Publish side of a pub/sub channel.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, envelope: Envelope) -> Result<(), PipelineError>;
}

/// Serialise `event` and publish it on `topic`.
pub async fn publish<T: Serialize + Sync>(
    bus: &dyn EventBus,
    topic: &str,
    event: &T,
) -> Result<(), PipelineError> {
    bus.publish(Envelope::encode(topic, event)?).await
}

/// In-process bus backed by an unbounded tokio channel.
#[derive(Clone)]
pub struct ChannelBus {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl ChannelBus {
    /// Create a bus and the receiver that drains it.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventBus for ChannelBus {
    async fn publish(&self, envelope: Envelope) -> Result<(), PipelineError> {
        debug!("publish {} ({} bytes)", envelope.topic, envelope.payload.len());
        let topic = envelope.topic.clone();
        self.tx.send(envelope).map_err(|e| PipelineError::Bus {
            topic,
            detail: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_ready_wire_format() {
        let event = PageReady {
            file: "output/pdf/acme_page_2.pdf".into(),
            page: 2,
            total_pages: 5,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"file": "output/pdf/acme_page_2.pdf", "page": 2, "total_pages": 5})
        );
    }

    #[test]
    fn decode_rejects_wrong_shape() {
        let env = Envelope {
            topic: PARSE_TOPIC.into(),
            payload: br#"{"file": 3}"#.to_vec(),
        };
        let err = env.decode::<DocumentReady>().unwrap_err();
        assert!(matches!(err, PipelineError::Event { .. }));
    }

    #[tokio::test]
    async fn channel_bus_delivers_in_order() {
        let (bus, mut rx) = ChannelBus::new();
        publish(&bus, PARSE_TOPIC, &DocumentReady { prefix: "output/txt/a".into() })
            .await
            .unwrap();
        publish(&bus, PARSE_TOPIC, &DocumentReady { prefix: "output/txt/b".into() })
            .await
            .unwrap();

        let first: DocumentReady = rx.recv().await.unwrap().decode().unwrap();
        let second: DocumentReady = rx.recv().await.unwrap().decode().unwrap();
        assert_eq!(first.prefix, "output/txt/a");
        assert_eq!(second.prefix, "output/txt/b");
    }
}
