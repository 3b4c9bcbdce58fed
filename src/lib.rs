//! Sumi-Mirror: a bounded website mirror
//!
//! This crate crawls a website breadth-first from a seed URL up to a depth
//! limit, stores the pages and their assets, packages the result as a ZIP
//! archive, and reclaims old archives under age and capacity limits.

pub mod config;
pub mod crawler;
pub mod jobs;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Sumi-Mirror operations
///
/// These are the job-fatal failures. A job that hits one of them ends in the
/// `error` state with the error's display text as its message.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Failed to prepare working directory {path}: {source}")]
    Workspace {
        path: String,
        source: std::io::Error,
    },

    #[error("Rendering infrastructure failed: {0}")]
    Render(String),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: state::JobStatus,
        to: state::JobStatus,
    },

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Errors raised while validating a request at the service boundary
///
/// None of these ever create a job.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("Address points to a private or loopback host: {0}")]
    PrivateHost(String),

    #[error("Depth must be between 1 and 5, got {0}")]
    DepthOutOfRange(u8),

    #[error("Max size must be between 1 and 500, got {0}")]
    MaxSizeOutOfRange(u32),

    #[error("Malformed job identifier: {0}")]
    InvalidJobId(String),
}

/// Result type alias for Sumi-Mirror operations
pub type Result<T> = std::result::Result<T, MirrorError>;

// Re-export commonly used types
pub use config::Config;
pub use jobs::{JobId, JobOptions, JobService, JobSnapshot, StartRequest};
pub use state::JobStatus;
pub use url::{resolve_reference, validate_seed};
