//! Job orchestration
//!
//! This module tracks every job for the life of the process:
//! - Job identifiers, options and published snapshots
//! - The registry of job records and their cancellation flags
//! - Per-job progress broadcasting
//! - The service facade used by callers to start and observe jobs

mod broadcaster;
mod registry;
mod service;
mod types;

pub use broadcaster::{ProgressBroadcaster, ProgressSubscription, DEFAULT_CHANNEL_CAPACITY};
pub use registry::{JobHandle, JobRegistry};
pub use service::JobService;
pub use types::{Job, JobId, JobOptions, JobSnapshot, StartRequest, SIZE_UNIT_BYTES};
