//! Artifact discovery and removal
//!
//! Jobs finish and clean up concurrently with scans, so every operation here
//! treats an entry that has already disappeared as a normal outcome.

use super::{StorageError, StorageResult};
use crate::jobs::JobId;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// A job's working directory
    Directory,
    /// A packaged archive or any other file
    File,
}

/// One top-level entry of the artifact directory
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub path: PathBuf,
    /// Total bytes, recursive for directories
    pub size: u64,
    pub modified: SystemTime,
    pub kind: ArtifactKind,
    /// Owning job, when the name is a job identifier or `<id>.zip`
    pub job_id: Option<JobId>,
}

/// Lists every top-level entry of `root`
///
/// A missing root yields an empty list. Entries that vanish mid-scan are skipped.
pub fn scan_artifacts(root: &Path) -> StorageResult<Vec<StoredArtifact>> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StorageError::io(root, e)),
    };

    let mut artifacts = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("Skipping unreadable entry in {}: {}", root.display(), e);
                continue;
            }
        };

        let path = entry.path();
        let metadata = match fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => {
                tracing::debug!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };

        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let name = entry.file_name().to_string_lossy().into_owned();

        let artifact = if metadata.is_dir() {
            StoredArtifact {
                size: dir_size(&path),
                modified,
                kind: ArtifactKind::Directory,
                job_id: name.parse().ok(),
                path,
            }
        } else {
            StoredArtifact {
                size: metadata.len(),
                modified,
                kind: ArtifactKind::File,
                job_id: name.strip_suffix(".zip").and_then(|id| id.parse().ok()),
                path,
            }
        };
        artifacts.push(artifact);
    }

    Ok(artifacts)
}

/// Recursive size of a directory, counting only what is still present
pub fn dir_size(path: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(path) else {
        return 0;
    };

    entries
        .filter_map(Result::ok)
        .map(|entry| match entry.metadata() {
            Ok(metadata) if metadata.is_dir() => dir_size(&entry.path()),
            Ok(metadata) => metadata.len(),
            Err(_) => 0,
        })
        .sum()
}

pub fn total_size(artifacts: &[StoredArtifact]) -> u64 {
    artifacts.iter().map(|artifact| artifact.size).sum()
}

/// Deletes an artifact; already gone counts as success
pub fn remove_artifact(artifact: &StoredArtifact) -> StorageResult<()> {
    let result = match artifact.kind {
        ArtifactKind::Directory => fs::remove_dir_all(&artifact.path),
        ArtifactKind::File => fs::remove_file(&artifact.path),
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::io(&artifact.path, e)),
    }
}
