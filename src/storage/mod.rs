//! Artifact storage
//!
//! This module owns everything that touches the artifact directory:
//! - Packaging a job's working directory into a ZIP archive
//! - Scanning the directory for job artifacts
//! - Periodic reclamation by age and by total size

mod archive;
mod artifacts;
mod steward;

pub use archive::archive_directory;
pub use artifacts::{remove_artifact, scan_artifacts, total_size, ArtifactKind, StoredArtifact};
pub use steward::{RetentionPolicy, StorageSteward, SweepReport};

use thiserror::Error;

/// Errors from artifact storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl StorageError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
