// File-system artifact store
// reason: tokio for async locking, blocking std::fs writes on spawn_blocking
//
// Publish protocol per key:
// 1. write a hidden temp file `.{key}.{uuid}.tmp` in the output directory
// 2. fsync it
// 3. hard-link it to `{key}` (fails if the key exists: no clobber)
// 4. remove the temp file (also on every error path)
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};
use uuid::Uuid;

use netbackup_core::port::{ArtifactError, ArtifactStore};

/// Write-once artifacts as plain files in one directory
pub struct FsArtifactStore {
    root: PathBuf,
    /// Per-key write serialization; idle entries are pruned on access
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl FsArtifactStore {
    /// Open the store, creating the directory if needed
    pub async fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        debug!(dir = %root.display(), "Artifact directory ready");
        Ok(Self {
            root,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_lock(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(key.to_string()).or_default())
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn persist(&self, key: &str, contents: &[u8]) -> Result<String, ArtifactError> {
        validate_key(key)?;

        let guard = self.key_lock(key).lock_owned().await;

        let root = self.root.clone();
        let owned_key = key.to_string();
        let contents = contents.to_vec();

        // The guard travels with the write so a dropped caller cannot release
        // the key while the blocking write is still running
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            write_once(&root, &owned_key, &contents)
        })
            .await
            .map_err(|e| ArtifactError::Io {
                key: key.to_string(),
                source: io::Error::new(io::ErrorKind::Other, e.to_string()),
            })?
    }
}

/// Keys become file names: one path component, never hidden
fn validate_key(key: &str) -> Result<(), ArtifactError> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && !key.contains(['/', '\\'])
        && !key.chars().any(char::is_control);

    if valid {
        Ok(())
    } else {
        Err(ArtifactError::Io {
            key: key.to_string(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "invalid artifact name"),
        })
    }
}

/// Removes the temp file when dropped, whatever happened
struct TempFileGuard(PathBuf);

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.0) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.0.display(), error = %e, "Failed to remove temp file");
            }
        }
    }
}

fn write_once(root: &Path, key: &str, contents: &[u8]) -> Result<String, ArtifactError> {
    let io_err = |source: io::Error| ArtifactError::Io {
        key: key.to_string(),
        source,
    };

    let final_path = root.join(key);
    if final_path.exists() {
        return Err(ArtifactError::Duplicate(key.to_string()));
    }

    let temp_path = root.join(format!(".{}.{}.tmp", key, Uuid::new_v4()));
    let _temp = TempFileGuard(temp_path.clone());

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .map_err(io_err)?;
    file.write_all(contents).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    drop(file);

    match fs::hard_link(&temp_path, &final_path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(ArtifactError::Duplicate(key.to_string()));
        }
        Err(e) if link_unsupported(&e) => {
            debug!(error = %e, "Hard links unsupported, falling back to rename");
            // Serialized by the per-key lock, so check-then-rename cannot race in-process
            if final_path.exists() {
                return Err(ArtifactError::Duplicate(key.to_string()));
            }
            fs::rename(&temp_path, &final_path).map_err(io_err)?;
        }
        Err(e) => return Err(io_err(e)),
    }

    // Make the new directory entry durable; not every platform can open a directory
    if let Ok(dir) = File::open(root) {
        let _ = dir.sync_all();
    }

    Ok(final_path.display().to_string())
}

fn link_unsupported(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::Unsupported | io::ErrorKind::PermissionDenied
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("netbackup-fs-test-{}", Uuid::new_v4()))
    }

    fn leftover_temp_files(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .count()
    }

    #[tokio::test]
    async fn test_open_creates_directory() {
        let dir = scratch_dir().join("nested").join("out");
        let store = assert_ok!(FsArtifactStore::open(&dir).await);
        assert!(store.root().is_dir());
        fs::remove_dir_all(dir.parent().unwrap().parent().unwrap()).ok();
    }

    #[tokio::test]
    async fn test_persist_writes_exact_bytes() {
        let dir = scratch_dir();
        let store = FsArtifactStore::open(&dir).await.unwrap();

        let location = assert_ok!(store.persist("10.0.0.1-2024-01-01", b"hostname r1\n").await);

        assert_eq!(PathBuf::from(&location), dir.join("10.0.0.1-2024-01-01"));
        assert_eq!(fs::read(&location).unwrap(), b"hostname r1\n");
        assert_eq!(leftover_temp_files(&dir), 0);
        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_duplicate_never_overwrites() {
        let dir = scratch_dir();
        let store = FsArtifactStore::open(&dir).await.unwrap();
        store.persist("r1-2024-01-01", b"first\n").await.unwrap();

        let err = assert_err!(store.persist("r1-2024-01-01", b"second\n").await);

        assert!(matches!(err, ArtifactError::Duplicate(_)));
        assert_eq!(fs::read(dir.join("r1-2024-01-01")).unwrap(), b"first\n");
        assert_eq!(leftover_temp_files(&dir), 0);
        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_same_key_one_wins() {
        let dir = scratch_dir();
        let store = Arc::new(FsArtifactStore::open(&dir).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .persist("sw1-2024-01-01", format!("writer {}\n", i).as_bytes())
                    .await
            }));
        }

        let mut saved = 0;
        let mut duplicates = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => saved += 1,
                Err(ArtifactError::Duplicate(_)) => duplicates += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        assert_eq!(saved, 1);
        assert_eq!(duplicates, 7);
        let written = fs::read_to_string(dir.join("sw1-2024-01-01")).unwrap();
        assert!(written.starts_with("writer "));
        assert_eq!(leftover_temp_files(&dir), 0);
        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_distinct_keys_are_independent() {
        let dir = scratch_dir();
        let store = FsArtifactStore::open(&dir).await.unwrap();

        let (a, b) = tokio::join!(
            store.persist("a-2024-01-01", b"a\n"),
            store.persist("b-2024-01-01", b"b\n")
        );

        assert_ok!(a);
        assert_ok!(b);
        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_invalid_keys_rejected() {
        let dir = scratch_dir();
        let store = FsArtifactStore::open(&dir).await.unwrap();

        for key in ["", "../escape", "a/b", ".hidden"] {
            let err = assert_err!(store.persist(key, b"x").await);
            assert!(matches!(err, ArtifactError::Io { .. }), "key {:?}", key);
        }
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
        fs::remove_dir_all(&dir).ok();
    }
}
