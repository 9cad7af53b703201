// Artifact Store Port
// Keyed, write-once persistence for captured configurations

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Artifact already exists: {0}")]
    Duplicate(String),

    #[error("Failed to write artifact {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Write-once artifact namespace
///
/// Implementations must never overwrite an existing key and never leave a
/// partial artifact behind. Writes to the same key are serialized; distinct
/// keys may be written concurrently.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist `contents` under `key`
    ///
    /// # Returns
    /// Location of the written artifact (path or URI)
    ///
    /// # Errors
    /// - ArtifactError::Duplicate if the key already holds an artifact
    /// - ArtifactError::Io on any write failure (nothing is left behind)
    async fn persist(&self, key: &str, contents: &[u8]) -> Result<String, ArtifactError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// In-memory store with the same write-once semantics
    #[derive(Default)]
    pub struct MemoryArtifactStore {
        artifacts: Mutex<BTreeMap<String, Vec<u8>>>,
        fail_writes: bool,
    }

    impl MemoryArtifactStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every persist fails with an IO error
        pub fn failing() -> Self {
            Self {
                fail_writes: true,
                ..Self::default()
            }
        }

        /// Seed an artifact (simulates a previous run)
        pub fn with_artifact(self, key: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
            self.artifacts
                .lock()
                .unwrap()
                .insert(key.into(), contents.into());
            self
        }

        pub fn get(&self, key: &str) -> Option<Vec<u8>> {
            self.artifacts.lock().unwrap().get(key).cloned()
        }

        pub fn keys(&self) -> Vec<String> {
            self.artifacts.lock().unwrap().keys().cloned().collect()
        }
    }

    #[async_trait]
    impl ArtifactStore for MemoryArtifactStore {
        async fn persist(&self, key: &str, contents: &[u8]) -> Result<String, ArtifactError> {
            if self.fail_writes {
                return Err(ArtifactError::Io {
                    key: key.to_string(),
                    source: std::io::Error::other("scripted write failure"),
                });
            }
            let mut artifacts = self.artifacts.lock().unwrap();
            if artifacts.contains_key(key) {
                return Err(ArtifactError::Duplicate(key.to_string()));
            }
            artifacts.insert(key.to_string(), contents.to_vec());
            Ok(format!("memory://{}", key))
        }
    }
}
