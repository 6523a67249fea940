use super::PageStore;
use crate::error::PipelineError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// In-process store. Keys are kept ordered so `list` is a range scan.
#[derive(Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects (all prefixes).
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl PageStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PipelineError> {
        Ok(self.objects.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), PipelineError> {
        self.objects.write().await.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, PipelineError> {
        let objects = self.objects.read().await;
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<(), PipelineError> {
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: Vec<u8>,
    ) -> Result<bool, PipelineError> {
        let mut objects = self.objects.write().await;
        if objects.get(key).map(Vec::as_slice) != expected {
            return Ok(false);
        }
        objects.insert(key.to_string(), new);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_is_prefix_scoped_and_sorted() {
        let store = MemoryStore::new();
        for key in ["b/2", "a/1", "b/1", "c/1", "b2/1"] {
            store.put(key, vec![]).await.unwrap();
        }
        assert_eq!(store.list("b/").await.unwrap(), vec!["b/1", "b/2"]);
        assert_eq!(store.list("b").await.unwrap(), vec!["b/1", "b/2", "b2/1"]);
    }

    #[tokio::test]
    async fn compare_and_swap_checks_current_value() {
        let store = MemoryStore::new();
        assert!(store.compare_and_swap("k", None, b"1".to_vec()).await.unwrap());
        assert!(!store.compare_and_swap("k", None, b"2".to_vec()).await.unwrap());
        assert!(!store
            .compare_and_swap("k", Some(&b"0"[..]), b"2".to_vec())
            .await
            .unwrap());
        assert!(store
            .compare_and_swap("k", Some(&b"1"[..]), b"2".to_vec())
            .await
            .unwrap());
        assert_eq!(store.get("k").await.unwrap().unwrap(), b"2");
    }

    #[tokio::test]
    async fn delete_missing_is_ok() {
        let store = MemoryStore::new();
        store.delete("nope").await.unwrap();
        assert!(store.is_empty().await);
    }
}
