// netbackup Infrastructure - File-System Adapter
// Implements: ArtifactStore

pub mod artifact_store;

pub use artifact_store::FsArtifactStore;
