//! Directory-backed lease store for cross-process coordination.
//!
//! Layout under the root directory:
//!
//! - `<key>` holds the value; writes replace it atomically via a temp file
//! - `<key>.lock` is an empty file locked exclusively with `flock` semantics
//!
//! Lock files are never removed. Removing one while another process holds it
//! would let a third process lock a fresh inode and break mutual exclusion.
//!
//! All filesystem calls are blocking, so they run on the blocking pool.

use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use fs2::FileExt;
use snafu::ResultExt;
use tracing::debug;

use crate::error::IoSnafu;
use crate::error::StoreError;
use crate::error::TaskJoinSnafu;
use crate::traits::LeaseStore;

const LOCK_SUFFIX: &str = ".lock";

/// Lease store rooted at a directory on a (possibly shared) filesystem.
#[derive(Debug, Clone)]
pub struct FileLeaseStore {
    root: Arc<PathBuf>,
}

/// Holds a key's lock file locked until dropped.
#[derive(Debug)]
pub struct FileLockGuard {
    file: File,
    path: PathBuf,
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        // Closing the descriptor releases the lock as well; unlocking
        // explicitly just makes the release immediate.
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!(path = %self.path.display(), error = %e, "failed to unlock lease file");
        }
    }
}

impl FileLeaseStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).context(IoSnafu { path: root.clone() })?;
        Ok(Self { root: Arc::new(root) })
    }

    /// Root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn value_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn lock_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.root.join(format!("{key}{LOCK_SUFFIX}")))
    }
}

/// Reject keys that would escape the root or collide with lock and temp files.
fn validate_key(key: &str) -> Result<(), StoreError> {
    let reason = if key.is_empty() {
        Some("key is empty")
    } else if key.starts_with('.') {
        Some("key must not start with '.'")
    } else if key.ends_with(LOCK_SUFFIX) {
        Some("key must not end with '.lock'")
    } else if key.chars().any(|c| c == '/' || c == '\\' || c == '\0') {
        Some("key contains a path separator")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(StoreError::InvalidKey {
            key: key.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

#[async_trait]
impl LeaseStore for FileLeaseStore {
    type Guard = FileLockGuard;

    async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.value_path(key)?;
        tokio::task::spawn_blocking(move || match fs::read(&path) {
            // Undecodable bytes come back as replacement characters and parse as a malformed record
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context(IoSnafu { path }),
        })
        .await
        .context(TaskJoinSnafu)?
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.value_path(key)?;
        let root = Arc::clone(&self.root);
        let value = value.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let mut temp = tempfile::NamedTempFile::new_in(root.as_path()).context(IoSnafu {
                path: root.as_path().to_path_buf(),
            })?;
            temp.write_all(value.as_bytes()).context(IoSnafu { path: temp.path().to_path_buf() })?;
            temp.as_file().sync_all().context(IoSnafu { path: temp.path().to_path_buf() })?;
            temp.persist(&path).map_err(|e| e.error).context(IoSnafu { path })?;
            Ok(())
        })
        .await
        .context(TaskJoinSnafu)?
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.value_path(key)?;
        tokio::task::spawn_blocking(move || match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context(IoSnafu { path }),
        })
        .await
        .context(TaskJoinSnafu)?
    }

    async fn lock(&self, key: &str) -> Result<Self::Guard, StoreError> {
        let path = self.lock_path(key)?;
        tokio::task::spawn_blocking(move || -> Result<FileLockGuard, StoreError> {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&path)
                .context(IoSnafu { path: path.clone() })?;
            FileExt::lock_exclusive(&file).context(IoSnafu { path: path.clone() })?;
            Ok(FileLockGuard { file, path })
        })
        .await
        .context(TaskJoinSnafu)?
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_read_write_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLeaseStore::open(dir.path()).unwrap();

        assert_eq!(store.read("slotlease:printer:0").await.unwrap(), None);
        store.write("slotlease:printer:0", "a|1|t").await.unwrap();
        assert_eq!(store.read("slotlease:printer:0").await.unwrap().as_deref(), Some("a|1|t"));

        store.delete("slotlease:printer:0").await.unwrap();
        assert_eq!(store.read("slotlease:printer:0").await.unwrap(), None);
        store.delete("slotlease:printer:0").await.unwrap();
    }

    #[tokio::test]
    async fn test_reads_undecodable_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLeaseStore::open(dir.path()).unwrap();
        fs::write(dir.path().join("slotlease:printer:0"), [0xff, 0xfe, b'|', b'1']).unwrap();

        let value = store.read("slotlease:printer:0").await.unwrap().unwrap();
        assert!(value.ends_with("|1"));
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        FileLeaseStore::open(dir.path()).unwrap().write("k", "v").await.unwrap();

        let reopened = FileLeaseStore::open(dir.path()).unwrap();
        assert_eq!(reopened.read("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_open_creates_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = FileLeaseStore::open(&nested).unwrap();
        assert!(store.root().is_dir());
    }

    #[tokio::test]
    async fn test_rejects_unsafe_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLeaseStore::open(dir.path()).unwrap();

        for key in ["", "../escape", "a/b", ".hidden", "k.lock"] {
            assert!(
                matches!(store.write(key, "v").await, Err(StoreError::InvalidKey { .. })),
                "key {key:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_lock_excludes_second_holder() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLeaseStore::open(dir.path()).unwrap();
        let guard = store.lock("k").await.unwrap();

        let contender = {
            let store = store.clone();
            tokio::spawn(async move {
                let _guard = store.lock("k").await.unwrap();
            })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!contender.is_finished(), "second lock must wait for the first guard");

        drop(guard);
        tokio::time::timeout(Duration::from_secs(5), contender).await.unwrap().unwrap();
    }
}
