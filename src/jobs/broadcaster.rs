//! Progress broadcaster
//!
//! One `tokio::sync::broadcast` channel per job identifier. Channels are
//! registered when a job is created and dropped right after the job's terminal
//! snapshot is published, which closes every subscription once it has drained.

use super::types::{JobId, JobSnapshot};
use dashmap::DashMap;
use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};

/// Buffered snapshots per job before slow subscribers start lagging
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Typed publish/subscribe keyed by job identifier
#[derive(Debug)]
pub struct ProgressBroadcaster {
    channels: DashMap<JobId, broadcast::Sender<JobSnapshot>>,
    capacity: usize,
}

impl ProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Opens the channel for a new job
    pub fn register(&self, id: JobId) {
        let (sender, _) = broadcast::channel(self.capacity);
        self.channels.insert(id, sender);
    }

    /// Sends a snapshot to every current subscriber of its job
    ///
    /// Fire-and-forget: having no subscribers is not an error. Publishing a
    /// terminal snapshot closes the job's channel.
    pub fn publish(&self, snapshot: &JobSnapshot) {
        if let Some(sender) = self.channels.get(&snapshot.id) {
            let delivered = sender.send(snapshot.clone()).unwrap_or(0);
            tracing::trace!(
                job = %snapshot.id,
                status = %snapshot.status,
                delivered,
                "Published progress snapshot"
            );
        }

        if snapshot.status.is_terminal() {
            self.channels.remove(&snapshot.id);
        }
    }

    /// Returns a receiver for future snapshots, or None once the job has ended
    pub fn subscribe(&self, id: &JobId) -> Option<broadcast::Receiver<JobSnapshot>> {
        self.channels.get(id).map(|sender| sender.subscribe())
    }

    /// Number of live subscribers for a job
    pub fn subscriber_count(&self, id: &JobId) -> usize {
        self.channels
            .get(id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Returns true while the job's channel is open
    pub fn is_open(&self, id: &JobId) -> bool {
        self.channels.contains_key(id)
    }
}

impl Default for ProgressBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

/// An ordered stream of snapshots for one job
///
/// Yields the snapshot current at subscription time, then every later update,
/// and ends after the terminal snapshot.
#[derive(Debug)]
pub struct ProgressSubscription {
    initial: Option<JobSnapshot>,
    receiver: Option<broadcast::Receiver<JobSnapshot>>,
    finished: bool,
}

impl ProgressSubscription {
    pub(crate) fn new(
        initial: JobSnapshot,
        receiver: Option<broadcast::Receiver<JobSnapshot>>,
    ) -> Self {
        Self {
            initial: Some(initial),
            receiver,
            finished: false,
        }
    }

    /// Waits for the next snapshot; None once the job has reached a terminal state
    pub async fn next(&mut self) -> Option<JobSnapshot> {
        if self.finished {
            return None;
        }

        if let Some(snapshot) = self.initial.take() {
            self.finished = snapshot.status.is_terminal();
            return Some(snapshot);
        }

        let Some(receiver) = self.receiver.as_mut() else {
            self.finished = true;
            return None;
        };

        loop {
            match receiver.recv().await {
                Ok(snapshot) => {
                    self.finished = snapshot.status.is_terminal();
                    return Some(snapshot);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Progress subscriber lagged, skipping snapshots");
                }
                Err(RecvError::Closed) => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }

    /// Adapts the subscription into a `futures::Stream`
    pub fn into_stream(self) -> impl Stream<Item = JobSnapshot> {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription
                .next()
                .await
                .map(|snapshot| (snapshot, subscription))
        })
    }
}
