//! Job records, options and the snapshots published to observers

use crate::crawler::AssetKind;
use crate::state::{progress_percent, JobStatus};
use crate::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;
use uuid::Uuid;

/// Bytes in one unit of `max_size`
pub const SIZE_UNIT_BYTES: u64 = 1024 * 1024;

/// Opaque unique job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// File name of the job's packaged archive
    pub fn archive_name(&self) -> String {
        format!("{}.zip", self.0)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| ValidationError::InvalidJobId(s.to_string()))
    }
}

/// Immutable per-job crawl options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobOptions {
    /// Number of levels to fetch, seed level included (1–5)
    pub depth: u8,
    /// Largest page or asset to keep, in megabytes (1–500)
    pub max_size: u32,
    pub include_images: bool,
    pub include_styles: bool,
    pub include_scripts: bool,
    /// Use the headless browser instead of plain HTTP for pages
    pub render_javascript: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            depth: 2,
            max_size: 100,
            include_images: true,
            include_styles: true,
            include_scripts: true,
            render_javascript: false,
        }
    }
}

impl JobOptions {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1..=5).contains(&self.depth) {
            return Err(ValidationError::DepthOutOfRange(self.depth));
        }
        if !(1..=500).contains(&self.max_size) {
            return Err(ValidationError::MaxSizeOutOfRange(self.max_size));
        }
        Ok(())
    }

    pub fn max_size_bytes(&self) -> u64 {
        u64::from(self.max_size) * SIZE_UNIT_BYTES
    }

    pub fn includes(&self, kind: AssetKind) -> bool {
        match kind {
            AssetKind::Image => self.include_images,
            AssetKind::Stylesheet => self.include_styles,
            AssetKind::Script => self.include_scripts,
        }
    }
}

/// A request to start a new job
#[derive(Debug, Clone, Deserialize)]
pub struct StartRequest {
    pub url: String,
    #[serde(default)]
    pub options: JobOptions,
}

/// The mutable record of one job
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub url: Url,
    pub options: JobOptions,
    pub status: JobStatus,
    pub files_downloaded: u64,
    pub total_files: u64,
    pub current_file: String,
    pub error: Option<String>,
    pub cancelled: bool,
    pub zip_file: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: JobId, url: Url, options: JobOptions) -> Self {
        Self {
            id,
            url,
            options,
            status: JobStatus::Starting,
            files_downloaded: 0,
            total_files: 1,
            current_file: String::new(),
            error: None,
            cancelled: false,
            zip_file: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn progress(&self) -> u8 {
        progress_percent(self.status, self.files_downloaded, self.total_files)
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            status: self.status,
            progress: self.progress(),
            files_downloaded: self.files_downloaded,
            current_file: self.current_file.clone(),
            error: self.error.clone(),
            zip_file: self.zip_file.clone(),
            render_mode: self.options.render_javascript,
        }
    }
}

/// Immutable view of a job, as published to subscribers and status queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub files_downloaded: u64,
    pub current_file: String,
    pub error: Option<String>,
    pub zip_file: Option<PathBuf>,
    pub render_mode: bool,
}
