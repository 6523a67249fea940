//! Object storage for pages, recognized text, section outputs and state.
//!
//! Every durable state transition in the pipeline is a single-object write,
//! so the trait needs no transactions. The one coordination primitive is
//! [`PageStore::compare_and_swap`], used by
//! [`crate::pipeline::completion::CountdownTracker`].

mod fs;
mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

use crate::error::PipelineError;
use async_trait::async_trait;

/// Durable key-value object store addressed by path-like keys.
#[async_trait]
pub trait PageStore: Send + Sync {
    /// Read an object; `Ok(None)` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PipelineError>;

    /// Create or overwrite an object.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), PipelineError>;

    /// All keys starting with `prefix`, sorted ascending.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, PipelineError>;

    /// Delete an object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), PipelineError>;

    /// Write `new` only if the current value equals `expected`
    /// (`None` = key absent). Returns whether the write happened.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: Vec<u8>,
    ) -> Result<bool, PipelineError>;
}

/// Read an object that must exist.
pub async fn get_required(store: &dyn PageStore, key: &str) -> Result<Vec<u8>, PipelineError> {
    store
        .get(key)
        .await?
        .ok_or_else(|| PipelineError::storage(key, "object not found"))
}

/// Read a UTF-8 text object, expanding literal `\n` escapes.
pub async fn get_text(store: &dyn PageStore, key: &str) -> Result<String, PipelineError> {
    let bytes = get_required(store, key).await?;
    Ok(String::from_utf8_lossy(&bytes).replace("\\n", "\n"))
}
