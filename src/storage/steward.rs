//! Storage steward
//!
//! Reclaims space in the artifact directory in two passes:
//!
//! 1. **Age**: anything last modified longer ago than the retention window is
//!    deleted, whatever the total usage.
//! 2. **Capacity**: if usage is still above the ceiling, the oldest remaining
//!    artifacts are deleted until usage is at or below the low watermark.
//!
//! Artifacts owned by a job that has not reached a terminal state are never
//! deleted by either pass.

use super::artifacts::{remove_artifact, scan_artifacts, total_size, StoredArtifact};
use super::StorageResult;
use crate::config::StorageConfig;
use crate::jobs::JobRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Limits applied by each sweep
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionPolicy {
    pub retention: Duration,
    pub max_total_bytes: u64,
    /// Fraction of `max_total_bytes` to shrink to once the ceiling is exceeded
    pub low_watermark: f64,
}

impl RetentionPolicy {
    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            retention: config.retention(),
            max_total_bytes: config.max_storage_bytes(),
            low_watermark: config.low_watermark,
        }
    }

    /// Usage the capacity pass shrinks to
    pub fn target_bytes(&self) -> u64 {
        (self.max_total_bytes as f64 * self.low_watermark).floor() as u64
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from_config(&StorageConfig::default())
    }
}

/// Outcome of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Deleted by the age pass
    pub expired: usize,
    /// Deleted by the capacity pass
    pub evicted: usize,
    /// Deletions that failed and were skipped
    pub failed: usize,
    pub bytes_freed: u64,
    /// Usage after the sweep
    pub remaining_bytes: u64,
}

pub struct StorageSteward {
    root: PathBuf,
    policy: RetentionPolicy,
    registry: Arc<JobRegistry>,
}

impl StorageSteward {
    pub fn new(root: impl Into<PathBuf>, policy: RetentionPolicy, registry: Arc<JobRegistry>) -> Self {
        Self {
            root: root.into(),
            policy,
            registry,
        }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Runs both passes against the current time
    pub fn sweep(&self) -> StorageResult<SweepReport> {
        self.sweep_at(SystemTime::now())
    }

    /// Runs both passes, measuring ages against `now`
    pub fn sweep_at(&self, now: SystemTime) -> StorageResult<SweepReport> {
        let mut report = SweepReport::default();
        let mut remaining = Vec::new();

        for artifact in scan_artifacts(&self.root)? {
            let age = now.duration_since(artifact.modified).unwrap_or(Duration::ZERO);
            if self.is_protected(&artifact) || age <= self.policy.retention {
                remaining.push(artifact);
                continue;
            }

            if self.delete(&artifact, &mut report) {
                report.expired += 1;
            } else {
                remaining.push(artifact);
            }
        }

        let mut usage = total_size(&remaining);
        if usage > self.policy.max_total_bytes {
            let target = self.policy.target_bytes();
            tracing::info!(
                usage,
                ceiling = self.policy.max_total_bytes,
                target,
                "Artifact storage over capacity"
            );

            let mut candidates: Vec<&StoredArtifact> = remaining
                .iter()
                .filter(|artifact| !self.is_protected(artifact))
                .collect();
            candidates.sort_by_key(|artifact| artifact.modified);

            for artifact in candidates {
                if usage <= target {
                    break;
                }
                if self.delete(artifact, &mut report) {
                    report.evicted += 1;
                    usage = usage.saturating_sub(artifact.size);
                }
            }
        }

        report.remaining_bytes = usage;
        Ok(report)
    }

    /// Artifacts of a running job are off limits
    fn is_protected(&self, artifact: &StoredArtifact) -> bool {
        artifact
            .job_id
            .map(|id| self.registry.is_live(&id))
            .unwrap_or(false)
    }

    fn delete(&self, artifact: &StoredArtifact, report: &mut SweepReport) -> bool {
        match remove_artifact(artifact) {
            Ok(()) => {
                tracing::debug!("Deleted artifact {}", artifact.path.display());
                report.bytes_freed += artifact.size;
                true
            }
            Err(e) => {
                tracing::warn!("Failed to delete artifact: {}", e);
                report.failed += 1;
                false
            }
        }
    }

    /// Sweeps on a fixed interval until `shutdown` is cancelled
    ///
    /// The first sweep runs immediately. Filesystem work happens on the
    /// blocking pool.
    pub fn spawn(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let steward = Arc::clone(&self);
                match tokio::task::spawn_blocking(move || steward.sweep()).await {
                    Ok(Ok(report)) if report.expired + report.evicted + report.failed > 0 => {
                        tracing::info!(
                            expired = report.expired,
                            evicted = report.evicted,
                            failed = report.failed,
                            bytes_freed = report.bytes_freed,
                            remaining_bytes = report.remaining_bytes,
                            "Storage sweep finished"
                        );
                    }
                    Ok(Ok(report)) => {
                        tracing::debug!(remaining_bytes = report.remaining_bytes, "Storage sweep found nothing to reclaim");
                    }
                    Ok(Err(e)) => tracing::warn!("Storage sweep failed: {}", e),
                    Err(e) => tracing::error!("Storage sweep task panicked: {}", e),
                }
            }

            tracing::debug!("Storage steward stopped");
        })
    }
}
