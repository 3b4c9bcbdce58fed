//! Crawl engine
//!
//! The engine runs one job from start to a terminal state. Pages are fetched
//! one at a time, level by level; assets found on a page are fetched in the
//! background under a shared concurrency limit and are all accounted for
//! before the job moves on to archiving.
//!
//! # Cancellation
//!
//! Cancellation is cooperative. It is checked at the start of each level,
//! before each page and before each asset fetch. Fetches already in flight
//! are abandoned and their results discarded.

use super::fetcher::{FetchError, PageFetcher};
use super::frontier::Frontier;
use super::parser::{AssetRef, PageReferences};
use super::paths::local_path_for;
use crate::jobs::{JobHandle, JobOptions};
use crate::state::JobStatus;
use crate::storage::archive_directory;
use crate::url::{is_private_host, same_host};
use crate::MirrorError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

/// How a traversal ended without a job-fatal error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Traversal {
    Finished,
    Cancelled,
}

/// Result of one background asset fetch
struct AssetOutcome {
    url: Url,
    result: Result<u64, FetchError>,
}

/// Drives one fetch strategy over jobs
pub struct CrawlEngine {
    fetcher: Arc<dyn PageFetcher>,
    artifact_dir: PathBuf,
    asset_permits: Arc<Semaphore>,
}

impl CrawlEngine {
    /// Creates an engine writing under `artifact_dir`
    ///
    /// `asset_permits` bounds concurrent asset fetches and may be shared with
    /// other engines.
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        artifact_dir: impl Into<PathBuf>,
        asset_permits: Arc<Semaphore>,
    ) -> Self {
        Self {
            fetcher,
            artifact_dir: artifact_dir.into(),
            asset_permits,
        }
    }

    /// Runs a job to a terminal state and returns that state
    ///
    /// The working directory is always removed before the terminal snapshot
    /// is published. Only a completed job leaves an archive behind.
    pub async fn run(&self, job: JobHandle) -> JobStatus {
        let id = job.id();
        let work_dir = self.artifact_dir.join(id.to_string());
        let zip_path = self.artifact_dir.join(id.archive_name());

        tracing::info!(job = %id, url = %job.url(), "Starting job");
        let outcome = self.execute(&job, &work_dir, &zip_path).await;
        remove_dir_quietly(&work_dir).await;

        match outcome {
            Ok(Traversal::Finished) => {
                let status = job.complete(zip_path.clone());
                if status == JobStatus::Cancelled {
                    tracing::info!(job = %id, "Cancelled while archiving, discarding archive");
                    remove_file_quietly(&zip_path).await;
                } else {
                    tracing::info!(job = %id, archive = %zip_path.display(), "Job completed");
                }
                status
            }
            Ok(Traversal::Cancelled) => {
                tracing::info!(job = %id, "Job cancelled");
                job.finish_cancelled();
                JobStatus::Cancelled
            }
            Err(e) => {
                tracing::error!(job = %id, "Job failed: {}", e);
                remove_file_quietly(&zip_path).await;
                job.fail(e.to_string());
                JobStatus::Error
            }
        }
    }

    async fn execute(
        &self,
        job: &JobHandle,
        work_dir: &Path,
        zip_path: &Path,
    ) -> Result<Traversal, MirrorError> {
        let options = job.options();
        job.transition(JobStatus::traversal(options.render_javascript))?;

        tokio::fs::create_dir_all(work_dir)
            .await
            .map_err(|source| MirrorError::Workspace {
                path: work_dir.display().to_string(),
                source,
            })?;

        if self.traverse(job, &options, work_dir).await? == Traversal::Cancelled {
            return Ok(Traversal::Cancelled);
        }
        if job.cancel_token().is_cancelled() {
            return Ok(Traversal::Cancelled);
        }

        job.transition(JobStatus::Archiving)?;
        let source = work_dir.to_path_buf();
        let destination = zip_path.to_path_buf();
        let entries =
            tokio::task::spawn_blocking(move || archive_directory(&source, &destination)).await??;
        tracing::info!(job = %job.id(), entries, "Archive written");

        Ok(Traversal::Finished)
    }

    /// Breadth-first traversal of the job's pages
    async fn traverse(
        &self,
        job: &JobHandle,
        options: &JobOptions,
        work_dir: &Path,
    ) -> Result<Traversal, MirrorError> {
        let id = job.id();
        let cancel = job.cancel_token();
        let seed = job.url();
        let max_bytes = options.max_size_bytes();

        let mut frontier = Frontier::new(seed.clone(), usize::from(options.depth));
        let mut assets: JoinSet<AssetOutcome> = JoinSet::new();

        for depth in 0..frontier.max_depth() {
            if cancel.is_cancelled() {
                return Ok(abandon(assets).await);
            }

            let batch = frontier.take_level(depth);
            if batch.is_empty() {
                tracing::debug!(job = %id, depth, "No pages at this level, stopping");
                break;
            }
            tracing::info!(job = %id, depth, pages = batch.len(), "Processing level");

            for url in batch {
                drain_finished(job, &mut assets);
                if cancel.is_cancelled() {
                    return Ok(abandon(assets).await);
                }
                if !frontier.mark_visited(&url) {
                    continue;
                }

                job.update(|j| j.current_file = url.to_string());
                let page = match self.fetcher.fetch_page(&url, max_bytes, &cancel).await {
                    Ok(page) => page,
                    Err(FetchError::Cancelled) => return Ok(abandon(assets).await),
                    Err(e) if e.is_job_fatal() => {
                        abandon(assets).await;
                        return Err(MirrorError::Render(e.to_string()));
                    }
                    Err(e @ FetchError::TooLarge { .. }) => {
                        tracing::warn!(job = %id, "Rejected page: {}", e);
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(job = %id, "Skipping page: {}", e);
                        continue;
                    }
                };

                if cancel.is_cancelled() {
                    return Ok(abandon(assets).await);
                }

                // A redirect target counts as fetched too
                if page.url != url {
                    if !same_host(&page.url, &seed) {
                        tracing::debug!(
                            job = %id,
                            "{} redirected off-site to {}",
                            url,
                            page.url
                        );
                        continue;
                    }
                    if !frontier.mark_visited(&page.url) {
                        tracing::debug!(
                            job = %id,
                            "{} redirected to already fetched {}",
                            url,
                            page.url
                        );
                        continue;
                    }
                }

                let target = work_dir.join(local_path_for(&page.url, &seed, page.is_markup()));
                if let Err(e) = write_file(&target, &page.body).await {
                    tracing::warn!(job = %id, "Skipping page: {}", e);
                    continue;
                }
                job.update(|j| j.files_downloaded += 1);

                let discovered = enqueue_links(&mut frontier, depth + 1, &seed, &page.references);
                let scheduled = self.spawn_assets(
                    &mut assets,
                    &mut frontier,
                    &page.references.assets,
                    options,
                    &seed,
                    work_dir,
                    &cancel,
                );
                if discovered + scheduled > 0 {
                    job.update(|j| j.total_files += discovered + scheduled);
                }
            }
        }

        while let Some(joined) = assets.join_next().await {
            if cancel.is_cancelled() {
                return Ok(abandon(assets).await);
            }
            match joined {
                Ok(outcome) => record_asset(job, outcome),
                Err(e) => tracing::warn!(job = %id, "Asset task failed: {}", e),
            }
        }

        if cancel.is_cancelled() {
            return Ok(Traversal::Cancelled);
        }
        Ok(Traversal::Finished)
    }

    /// Starts background fetches for a page's in-scope assets
    ///
    /// Returns how many were scheduled.
    #[allow(clippy::too_many_arguments)]
    fn spawn_assets(
        &self,
        assets: &mut JoinSet<AssetOutcome>,
        frontier: &mut Frontier,
        references: &[AssetRef],
        options: &JobOptions,
        seed: &Url,
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> u64 {
        let max_bytes = options.max_size_bytes();
        let mut scheduled = 0;

        for asset in references {
            if cancel.is_cancelled() {
                break;
            }
            if !options.includes(asset.kind) || !asset_in_scope(&asset.url, seed) {
                continue;
            }
            if !frontier.mark_visited(&asset.url) {
                continue;
            }

            let fetcher = Arc::clone(&self.fetcher);
            let permits = Arc::clone(&self.asset_permits);
            let cancel = cancel.clone();
            let url = asset.url.clone();
            let target = work_dir.join(local_path_for(&url, seed, false));

            assets.spawn(async move {
                let result = async {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|_| FetchError::Cancelled)?;
                    if cancel.is_cancelled() {
                        return Err(FetchError::Cancelled);
                    }

                    let fetched = fetcher.fetch_asset(&url, max_bytes, &cancel).await?;
                    write_file(&target, &fetched.body).await?;
                    Ok(fetched.body.len() as u64)
                }
                .await;

                AssetOutcome { url, result }
            });
            scheduled += 1;
        }

        scheduled
    }
}

/// Same-host assets are always fetched; other hosts only when public
fn asset_in_scope(url: &Url, seed: &Url) -> bool {
    same_host(url, seed) || !is_private_host(url)
}

/// Queues same-host links for the next level; returns how many were new
fn enqueue_links(frontier: &mut Frontier, depth: usize, seed: &Url, references: &PageReferences) -> u64 {
    references
        .links
        .iter()
        .filter(|link| same_host(link, seed))
        .filter(|link| frontier.enqueue(depth, (*link).clone()))
        .count() as u64
}

fn drain_finished(job: &JobHandle, assets: &mut JoinSet<AssetOutcome>) {
    while let Some(joined) = assets.try_join_next() {
        match joined {
            Ok(outcome) => record_asset(job, outcome),
            Err(e) => tracing::warn!(job = %job.id(), "Asset task failed: {}", e),
        }
    }
}

fn record_asset(job: &JobHandle, outcome: AssetOutcome) {
    match outcome.result {
        Ok(bytes) => {
            tracing::trace!(job = %job.id(), url = %outcome.url, bytes, "Saved asset");
            job.update(|j| {
                j.files_downloaded += 1;
                j.current_file = outcome.url.to_string();
            });
        }
        Err(FetchError::Cancelled) => {}
        Err(e) => tracing::debug!(job = %job.id(), "Skipping asset: {}", e),
    }
}

/// Aborts outstanding asset work and waits for it to stop
async fn abandon(mut assets: JoinSet<AssetOutcome>) -> Traversal {
    assets.abort_all();
    while assets.join_next().await.is_some() {}
    Traversal::Cancelled
}

async fn write_file(path: &Path, body: &[u8]) -> Result<(), FetchError> {
    let write_error = |source| FetchError::Write {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_error)?;
    }
    tokio::fs::write(path, body).await.map_err(write_error)
}

async fn remove_dir_quietly(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
    }
}

async fn remove_file_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
    }
}
