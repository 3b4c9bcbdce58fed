//! Job registry
//!
//! The registry is the only state shared between job tasks. It supports three
//! kinds of access: insert on create, read on query, and flag-set on cancel.
//! Everything else goes through the job's single [`JobHandle`], which is owned
//! by the engine task running that job.

use super::broadcaster::{ProgressBroadcaster, ProgressSubscription};
use super::types::{Job, JobId, JobOptions, JobSnapshot};
use crate::state::JobStatus;
use crate::MirrorError;
use chrono::Utc;
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;
use url::Url;

#[derive(Debug)]
struct JobEntry {
    record: RwLock<Job>,
    cancel: CancellationToken,
}

impl JobEntry {
    fn read(&self) -> RwLockReadGuard<'_, Job> {
        self.record.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Job> {
        self.record.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Process-wide map from job identifier to job state
#[derive(Debug)]
pub struct JobRegistry {
    jobs: DashMap<JobId, Arc<JobEntry>>,
    broadcaster: Arc<ProgressBroadcaster>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::with_broadcaster(Arc::new(ProgressBroadcaster::default()))
    }

    pub fn with_broadcaster(broadcaster: Arc<ProgressBroadcaster>) -> Self {
        Self {
            jobs: DashMap::new(),
            broadcaster,
        }
    }

    /// Allocates a record for a new job and returns its writer handle
    pub fn create(&self, url: Url, options: JobOptions) -> JobHandle {
        let id = JobId::new();
        let entry = Arc::new(JobEntry {
            record: RwLock::new(Job::new(id, url, options)),
            cancel: CancellationToken::new(),
        });

        self.broadcaster.register(id);
        self.jobs.insert(id, Arc::clone(&entry));

        JobHandle {
            id,
            entry,
            broadcaster: Arc::clone(&self.broadcaster),
        }
    }

    fn entry(&self, id: &JobId) -> Option<Arc<JobEntry>> {
        self.jobs.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Current snapshot of a job
    pub fn snapshot(&self, id: &JobId) -> Option<JobSnapshot> {
        self.entry(id).map(|entry| entry.read().snapshot())
    }

    /// Snapshots of every known job, oldest first
    pub fn list(&self) -> Vec<JobSnapshot> {
        let entries: Vec<Arc<JobEntry>> = self
            .jobs
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut jobs: Vec<_> = entries
            .iter()
            .map(|entry| {
                let job = entry.read();
                (job.created_at, job.snapshot())
            })
            .collect();
        jobs.sort_by_key(|(created_at, _)| *created_at);
        jobs.into_iter().map(|(_, snapshot)| snapshot).collect()
    }

    /// Requests cancellation of a job
    ///
    /// Returns true only if the job exists and has not reached a terminal
    /// state. The engine observes the request at its next check point.
    pub fn cancel(&self, id: &JobId) -> bool {
        let Some(entry) = self.entry(id) else {
            return false;
        };

        let mut job = entry.write();
        if job.status.is_terminal() {
            return false;
        }

        job.cancelled = true;
        entry.cancel.cancel();
        tracing::info!(job = %id, status = %job.status, "Cancellation requested");
        true
    }

    /// Requests cancellation of every non-terminal job; returns how many were signalled
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<JobId> = self.jobs.iter().map(|entry| *entry.key()).collect();
        ids.iter().filter(|id| self.cancel(id)).count()
    }

    /// Returns true if the job exists and is not yet terminal
    pub fn is_live(&self, id: &JobId) -> bool {
        self.entry(id)
            .map(|entry| entry.read().status.is_active())
            .unwrap_or(false)
    }

    /// Subscribes to a job's progress stream
    ///
    /// The record's read lock is held while the receiver is created. Snapshots
    /// are published under the write lock, so the subscription sees the current
    /// state followed by exactly the updates that come after it.
    pub fn subscribe(&self, id: &JobId) -> Option<ProgressSubscription> {
        let entry = self.entry(id)?;
        let job = entry.read();
        let receiver = self.broadcaster.subscribe(id);
        Some(ProgressSubscription::new(job.snapshot(), receiver))
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive writer for one job's record
///
/// Every mutation made through the handle publishes a snapshot before the
/// call returns. The snapshot is built and sent while the record is still
/// locked, so notifications follow mutation order.
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    entry: Arc<JobEntry>,
    broadcaster: Arc<ProgressBroadcaster>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn url(&self) -> Url {
        self.entry.read().url.clone()
    }

    pub fn options(&self) -> JobOptions {
        self.entry.read().options.clone()
    }

    pub fn status(&self) -> JobStatus {
        self.entry.read().status
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.entry.read().snapshot()
    }

    /// Token tripped when the job is cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.entry.cancel.clone()
    }

    /// Applies a counter or label mutation and publishes the result
    ///
    /// Status changes must go through [`JobHandle::transition`] and the
    /// finishing methods instead.
    pub fn update(&self, mutate: impl FnOnce(&mut Job)) -> JobSnapshot {
        let mut job = self.entry.write();
        let status = job.status;
        mutate(&mut job);
        job.status = status;
        self.publish(&job)
    }

    /// Moves the job to a new status
    pub fn transition(&self, next: JobStatus) -> Result<JobSnapshot, MirrorError> {
        let mut job = self.entry.write();
        if !job.status.can_transition_to(next) {
            return Err(MirrorError::InvalidTransition {
                from: job.status,
                to: next,
            });
        }

        tracing::debug!(job = %self.id, from = %job.status, to = %next, "Job transition");
        job.status = next;
        if next.is_terminal() {
            job.completed_at = Some(Utc::now());
        }
        Ok(self.publish(&job))
    }

    /// Finishes a successfully archived job
    ///
    /// If cancellation was accepted while the archive was being written, the
    /// job ends `Cancelled` instead and no archive link is recorded. Returns
    /// the terminal status actually reached.
    pub fn complete(&self, zip_file: PathBuf) -> JobStatus {
        let mut job = self.entry.write();
        if job.status.is_terminal() {
            return job.status;
        }

        if job.cancelled {
            job.status = JobStatus::Cancelled;
        } else {
            job.status = JobStatus::Completed;
            job.zip_file = Some(zip_file);
        }
        job.completed_at = Some(Utc::now());
        self.publish(&job);
        job.status
    }

    /// Finishes the job as cancelled
    pub fn finish_cancelled(&self) {
        if let Err(e) = self.transition(JobStatus::Cancelled) {
            tracing::debug!(job = %self.id, "Ignoring cancellation of finished job: {}", e);
        }
    }

    /// Finishes the job with a job-fatal error
    pub fn fail(&self, message: impl Into<String>) {
        let mut job = self.entry.write();
        if job.status.is_terminal() {
            return;
        }

        job.status = JobStatus::Error;
        job.error = Some(message.into());
        job.completed_at = Some(Utc::now());
        self.publish(&job);
    }

    fn publish(&self, job: &Job) -> JobSnapshot {
        let snapshot = job.snapshot();
        self.broadcaster.publish(&snapshot);
        snapshot
    }
}
