//! JSON File Quota Store
//!
//! Quota state lives in a JSON document that every process opening the same
//! path shares. Nothing is cached between calls: each operation takes an
//! advisory lock on a sibling `.lock` file (shared for reads, exclusive for
//! mutations) and re-reads the document. A mutation writes the new document
//! to a temp file that is renamed over the original before the lock is
//! released, so a failed write leaves the stored state untouched.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::error::StoreError;
use super::store::{QuotaStore, Reservation, TrackerTable};
use super::tracker::{QuotaTracker, TrackerKey};

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    trackers: Vec<QuotaTracker>,
}

#[derive(Debug, Clone, Copy)]
enum LockMode {
    Shared,
    Exclusive,
}

/// Advisory lock held until dropped
struct StoreLock(File);

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.0);
    }
}

/// File-backed quota store, safe to share between processes
#[derive(Debug, Clone)]
pub struct JsonFileQuotaStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonFileQuotaStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    ///
    /// An existing document is parsed up front so a corrupt file is reported here.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let store = Self {
            lock_path: sibling(&path, ".lock"),
            path,
        };

        let trackers = store.read(|table| table.len()).await?;
        tracing::debug!(path = %store.path.display(), trackers, "Opened quota store");
        Ok(store)
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        sibling(&self.path, &format!(".{}.tmp", std::process::id()))
    }

    fn lock(&self, mode: LockMode) -> io::Result<StoreLock> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)?;
        match mode {
            LockMode::Shared => FileExt::lock_shared(&file)?,
            LockMode::Exclusive => FileExt::lock_exclusive(&file)?,
        }
        Ok(StoreLock(file))
    }

    fn load(&self) -> Result<TrackerTable, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(TrackerTable::default()),
            Err(e) => return Err(e.into()),
        };

        let document: StoreDocument = serde_json::from_slice(&bytes)?;
        if document.version != FORMAT_VERSION {
            tracing::warn!(
                path = %self.path.display(),
                version = document.version,
                "Unexpected quota store version, loading anyway"
            );
        }
        Ok(TrackerTable::from_trackers(document.trackers))
    }

    fn persist(&self, table: &TrackerTable) -> Result<(), StoreError> {
        let document = StoreDocument {
            version: FORMAT_VERSION,
            trackers: table.snapshot(),
        };
        let bytes = serde_json::to_vec_pretty(&document)?;

        let tmp = self.temp_path();
        if let Err(e) = write_and_rename(&tmp, &self.path, &bytes) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Run `op` against the current document under a shared lock
    async fn read<R, F>(&self, op: F) -> Result<R, StoreError>
    where
        F: FnOnce(&TrackerTable) -> R + Send + 'static,
        R: Send + 'static,
    {
        let store = self.clone();
        run_blocking(move || {
            let _lock = store.lock(LockMode::Shared)?;
            let table = store.load()?;
            Ok(op(&table))
        })
        .await
    }

    /// Run `op` against the current document under an exclusive lock.
    ///
    /// `op` returns its result and whether the document changed; a changed
    /// document is written back before the lock is released.
    async fn update<R, F>(&self, op: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut TrackerTable) -> Result<(R, bool), StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let store = self.clone();
        run_blocking(move || {
            let _lock = store.lock(LockMode::Exclusive)?;
            let mut table = store.load()?;
            let (result, changed) = op(&mut table)?;
            if changed {
                store.persist(&table)?;
            }
            Ok(result)
        })
        .await
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("quotas"));
    name.push(suffix);
    path.with_file_name(name)
}

fn write_and_rename(tmp: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(tmp, path)
}

async fn run_blocking<R, F>(f: F) -> Result<R, StoreError>
where
    F: FnOnce() -> Result<R, StoreError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Io(io::Error::other(e)))?
}

#[async_trait]
impl QuotaStore for JsonFileQuotaStore {
    async fn find_or_create(
        &self,
        key: &TrackerKey,
        default_limit: u64,
        default_interval_secs: u64,
    ) -> Result<QuotaTracker, StoreError> {
        let owned = key.clone();
        let (tracker, created) = self
            .update(move |table| {
                let (tracker, created) =
                    table.find_or_create(&owned, default_limit, default_interval_secs);
                Ok(((tracker, created), created))
            })
            .await?;
        if created {
            tracing::debug!(tracker = %key, limit = default_limit, "Created quota tracker");
        }
        Ok(tracker)
    }

    async fn get(&self, key: &TrackerKey) -> Result<Option<QuotaTracker>, StoreError> {
        let key = key.clone();
        self.read(move |table| table.get(&key)).await
    }

    async fn upsert(&self, tracker: QuotaTracker) -> Result<(), StoreError> {
        self.update(move |table| {
            table.upsert(tracker);
            Ok(((), true))
        })
        .await
    }

    async fn remove(&self, key: &TrackerKey) -> Result<Option<QuotaTracker>, StoreError> {
        let key = key.clone();
        self.update(move |table| {
            let removed = table.remove(&key);
            let changed = removed.is_some();
            Ok((removed, changed))
        })
        .await
    }

    async fn reserve(&self, key: &TrackerKey, n: u64) -> Result<Reservation, StoreError> {
        let key = key.clone();
        self.update(move |table| {
            let before = table.get(&key);
            let reservation = table.reserve(&key, n)?;
            let changed = before.as_ref() != Some(reservation.tracker());
            Ok((reservation, changed))
        })
        .await
    }

    async fn release(
        &self,
        key: &TrackerKey,
        n: u64,
        window: DateTime<Utc>,
    ) -> Result<QuotaTracker, StoreError> {
        let key = key.clone();
        self.update(move |table| {
            let before = table.get(&key);
            let tracker = table.release(&key, n, window)?;
            let changed = before.as_ref() != Some(&tracker);
            Ok((tracker, changed))
        })
        .await
    }

    async fn consume(&self, key: &TrackerKey, n: u64) -> Result<QuotaTracker, StoreError> {
        let key = key.clone();
        self.update(move |table| Ok((table.consume(&key, n)?, true))).await
    }

    async fn reset_if_expired(&self, key: &TrackerKey) -> Result<bool, StoreError> {
        let key = key.clone();
        self.update(move |table| {
            let reset = table.reset_if_expired(&key)?;
            Ok((reset, reset))
        })
        .await
    }

    async fn trackers_for_customer(
        &self,
        customer_id: &str,
    ) -> Result<Vec<QuotaTracker>, StoreError> {
        let customer_id = customer_id.to_string();
        self.read(move |table| table.for_customer(&customer_id)).await
    }

    async fn all(&self) -> Result<Vec<QuotaTracker>, StoreError> {
        self.read(|table| table.snapshot()).await
    }

    async fn reset_expired(&self) -> Result<usize, StoreError> {
        self.update(|table| {
            let count = table.reset_expired();
            Ok((count, count > 0))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key() -> TrackerKey {
        TrackerKey::new("hubspot", "contacts", "cust-9")
    }

    #[tokio::test]
    async fn test_open_missing_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileQuotaStore::open(dir.path().join("quotas.json"))
            .await
            .unwrap();
        assert!(store.all().await.unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("quotas.json");

        {
            let store = JsonFileQuotaStore::open(&path).await.unwrap();
            store.find_or_create(&key(), 100, 3600).await.unwrap();
            store.reserve(&key(), 1).await.unwrap();
            store.reserve(&key(), 1).await.unwrap();
        }

        let reopened = JsonFileQuotaStore::open(&path).await.unwrap();
        let tracker = reopened.get(&key()).await.unwrap().unwrap();
        assert_eq!(tracker.quota_limit, 100);
        assert_eq!(tracker.current_usage, 2);
    }

    #[tokio::test]
    async fn test_release_is_persisted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quotas.json");

        let store = JsonFileQuotaStore::open(&path).await.unwrap();
        store.find_or_create(&key(), 5, 60).await.unwrap();
        let reservation = store.reserve(&key(), 1).await.unwrap();
        store
            .release(&key(), 1, reservation.tracker().reset_at)
            .await
            .unwrap();

        let reopened = JsonFileQuotaStore::open(&path).await.unwrap();
        assert_eq!(reopened.get(&key()).await.unwrap().unwrap().current_usage, 0);
    }

    #[tokio::test]
    async fn test_handles_see_each_others_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quotas.json");

        let a = JsonFileQuotaStore::open(&path).await.unwrap();
        let b = JsonFileQuotaStore::open(&path).await.unwrap();
        a.find_or_create(&key(), 1, 3600).await.unwrap();

        assert!(b.reserve(&key(), 1).await.unwrap().is_admitted());
        assert!(!a.reserve(&key(), 1).await.unwrap().is_admitted());
        assert_eq!(a.get(&key()).await.unwrap().unwrap().current_usage, 1);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_usage_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quotas.json");
        let store = JsonFileQuotaStore::open(&path).await.unwrap();
        store.find_or_create(&key(), 5, 3600).await.unwrap();

        // A directory where the temp file should go makes the write fail
        std::fs::create_dir(store.temp_path()).unwrap();
        let err = store.reserve(&key(), 1).await.unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert_eq!(store.get(&key()).await.unwrap().unwrap().current_usage, 0);

        std::fs::remove_dir(store.temp_path()).unwrap();
        let reservation = store.reserve(&key(), 1).await.unwrap();
        assert!(reservation.is_admitted());
        assert_eq!(reservation.tracker().current_usage, 1);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quotas.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let err = JsonFileQuotaStore::open(&path).await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
