//! State module for tracking job progress
//!
//! # Components
//!
//! - `JobStatus`: the job state machine (starting, downloading/rendering,
//!   archiving, and the three terminal outcomes)
//! - `progress_percent`: maps a job's counters and status to a 0–100 value

mod job_state;
mod progress;

// Re-export main types
pub use job_state::JobStatus;
pub use progress::{progress_percent, ARCHIVING_PROGRESS, PROGRESS_HEADROOM, TRAVERSAL_CEILING};
