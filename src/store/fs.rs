use super::PageStore;
use crate::error::PipelineError;
use async_trait::async_trait;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const PARTIAL_SUFFIX: &str = ".partial";
const LOCK_SUFFIX: &str = ".lock";

/// A lock file older than this is taken to belong to a crashed process.
const LOCK_STALE_AFTER: Duration = Duration::from_secs(30);
const LOCK_WAIT: Duration = Duration::from_secs(60);
const LOCK_POLL: Duration = Duration::from_millis(10);

/// Store rooted at a local directory; a key is a relative path below it.
///
/// Writes go to a uniquely named sibling `*.partial` file and are renamed
/// into place, so a reader never sees a half-written object. Compare-and-swap
/// holds a `<key>.lock` file created with `create_new`, which serialises
/// swaps across every process sharing the directory.
pub struct FsStore {
    root: PathBuf,
    cas_lock: Mutex<()>,
}

/// Exclusive hold on `<key>.lock`; removed on drop.
struct KeyLock {
    path: PathBuf,
}

impl Drop for KeyLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Could not remove lock {}: {}", self.path.display(), e);
        }
    }
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cas_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, PipelineError> {
        let rel = Path::new(key);
        let clean = !key.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            return Err(PipelineError::storage(key, "key must be a relative path"));
        }
        Ok(self.root.join(rel))
    }

    async fn ensure_parent(key: &str, path: &Path) -> Result<(), PipelineError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::storage(key, e))?;
        }
        Ok(())
    }

    async fn write_atomic(&self, key: &str, bytes: Vec<u8>) -> Result<(), PipelineError> {
        let path = self.path_for(key)?;
        Self::ensure_parent(key, &path).await?;
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let mut tmp = tempfile::Builder::new()
                .prefix(".")
                .suffix(PARTIAL_SUFFIX)
                .tempfile_in(dir)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_data()?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| PipelineError::Internal(format!("write task for {key}: {e}")))?
        .map_err(|e| PipelineError::storage(key, e))
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, PipelineError> {
        match tokio::fs::read(self.path_for(key)?).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PipelineError::storage(key, e)),
        }
    }

    /// Take `<key>.lock`, waiting while another holder has it.
    async fn lock_key(&self, key: &str) -> Result<KeyLock, PipelineError> {
        let mut path = self.path_for(key)?.into_os_string();
        path.push(LOCK_SUFFIX);
        let path = PathBuf::from(path);
        Self::ensure_parent(key, &path).await?;

        let started = Instant::now();
        loop {
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(_) => return Ok(KeyLock { path }),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if lock_is_stale(&path).await {
                        warn!("Breaking stale lock {}", path.display());
                        let _ = tokio::fs::remove_file(&path).await;
                        continue;
                    }
                    if started.elapsed() > LOCK_WAIT {
                        return Err(PipelineError::storage(
                            key,
                            format!("timed out after {}s waiting for lock", LOCK_WAIT.as_secs()),
                        ));
                    }
                    tokio::time::sleep(LOCK_POLL).await;
                }
                Err(e) => return Err(PipelineError::storage(key, e)),
            }
        }
    }
}

async fn lock_is_stale(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|age| age > LOCK_STALE_AFTER)
}

#[async_trait]
impl PageStore for FsStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PipelineError> {
        self.read(key).await
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), PipelineError> {
        debug!("put {} ({} bytes)", key, bytes.len());
        self.write_atomic(key, bytes).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, PipelineError> {
        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(PipelineError::storage(prefix, e)),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| PipelineError::storage(prefix, e))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| PipelineError::storage(prefix, e))?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(rel) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let key = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix)
                    && !key.ends_with(PARTIAL_SUFFIX)
                    && !key.ends_with(LOCK_SUFFIX)
                {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<(), PipelineError> {
        match tokio::fs::remove_file(self.path_for(key)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::storage(key, e)),
        }
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: Vec<u8>,
    ) -> Result<bool, PipelineError> {
        let _guard = self.cas_lock.lock().await;
        let _lock = self.lock_key(key).await?;
        let current = self.read(key).await?;
        if current.as_deref() != expected {
            return Ok(false);
        }
        self.write_atomic(key, new).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn put_get_list_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());

        store
            .put("output/txt/acme_page_2.txt", b"two".to_vec())
            .await
            .unwrap();
        store
            .put("output/txt/acme_page_1.txt", b"one".to_vec())
            .await
            .unwrap();
        store.put("temp/acme_directors.json", b"{}".to_vec()).await.unwrap();

        assert_eq!(
            store.list("output/txt/acme_page_").await.unwrap(),
            vec!["output/txt/acme_page_1.txt", "output/txt/acme_page_2.txt"]
        );
        assert_eq!(
            store.get("output/txt/acme_page_1.txt").await.unwrap().unwrap(),
            b"one"
        );

        store.delete("output/txt/acme_page_1.txt").await.unwrap();
        assert!(store.get("output/txt/acme_page_1.txt").await.unwrap().is_none());
        store.delete("output/txt/acme_page_1.txt").await.unwrap();
    }

    #[tokio::test]
    async fn rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let err = store.put("../evil", vec![]).await.unwrap_err();
        assert!(matches!(err, PipelineError::Storage { .. }));
    }

    /// Retry-until-swapped increment, the way completion tracking updates state.
    async fn increment(store: &FsStore, key: &str) {
        loop {
            let current = store.get(key).await.unwrap();
            let n: u32 = current
                .as_deref()
                .map(|b| String::from_utf8_lossy(b).parse().unwrap())
                .unwrap_or(0);
            let next = (n + 1).to_string().into_bytes();
            if store
                .compare_and_swap(key, current.as_deref(), next)
                .await
                .unwrap()
            {
                return;
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn compare_and_swap_across_store_instances() {
        let dir = tempfile::tempdir().unwrap();
        // Separate instances share nothing but the directory, like separate processes.
        let stores: Vec<Arc<FsStore>> = (0..4).map(|_| Arc::new(FsStore::new(dir.path()))).collect();

        let mut handles = Vec::new();
        for store in &stores {
            for _ in 0..10 {
                let store = Arc::clone(store);
                handles.push(tokio::spawn(async move {
                    increment(&store, "state/counter.json").await
                }));
            }
        }
        for h in handles {
            h.await.unwrap();
        }

        let total = stores[0].get("state/counter.json").await.unwrap().unwrap();
        assert_eq!(total, b"40");
        assert_eq!(stores[0].list("state/").await.unwrap(), vec!["state/counter.json"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_puts_to_one_key_never_tear() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FsStore::new(dir.path()));
        let bodies: Vec<Vec<u8>> = (0..8u8).map(|i| vec![i; 4096]).collect();

        let mut handles = Vec::new();
        for body in bodies.clone() {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.put("output/txt/acme_page_1.txt", body).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let stored = store.get("output/txt/acme_page_1.txt").await.unwrap().unwrap();
        assert!(bodies.contains(&stored));
        assert_eq!(store.list("output/").await.unwrap(), vec!["output/txt/acme_page_1.txt"]);
    }

    #[tokio::test]
    async fn stale_lock_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let lock = dir.path().join("state/x.json.lock");
        std::fs::create_dir_all(lock.parent().unwrap()).unwrap();
        let file = std::fs::File::create(&lock).unwrap();
        file.set_modified(std::time::SystemTime::now() - Duration::from_secs(120))
            .unwrap();
        drop(file);

        assert!(store
            .compare_and_swap("state/x.json", None, b"a".to_vec())
            .await
            .unwrap());
        assert!(!lock.exists());
    }

    #[tokio::test]
    async fn compare_and_swap_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        assert!(store
            .compare_and_swap("state/x.json", None, b"a".to_vec())
            .await
            .unwrap());
        assert!(!store
            .compare_and_swap("state/x.json", None, b"b".to_vec())
            .await
            .unwrap());
        assert!(store
            .compare_and_swap("state/x.json", Some(&b"a"[..]), b"b".to_vec())
            .await
            .unwrap());
    }
}
