//! Job service
//!
//! The entry point for callers: start, query, cancel and observe jobs. Each
//! accepted job runs as its own task on the Tokio runtime.

use super::broadcaster::ProgressSubscription;
use super::registry::JobRegistry;
use super::types::{JobId, JobSnapshot, StartRequest};
use crate::config::Config;
use crate::crawler::{BrowserSession, CrawlEngine, HttpFetcher, PageFetcher, RenderFetcher};
use crate::state::JobStatus;
use crate::url::validate_seed;
use crate::{MirrorError, ValidationError};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub struct JobService {
    registry: Arc<JobRegistry>,
    static_engine: Arc<CrawlEngine>,
    render_engine: Arc<CrawlEngine>,
    browser: Option<Arc<BrowserSession>>,
    tasks: Mutex<JoinSet<JobStatus>>,
}

impl JobService {
    /// Builds a service with the HTTP and headless-browser strategies
    pub fn new(config: &Config) -> Result<Self, MirrorError> {
        let http = HttpFetcher::from_config(&config.fetcher, &config.user_agent)?;
        let browser = Arc::new(BrowserSession::new(config.render.clone()));
        let render = RenderFetcher::new(Arc::clone(&browser), http.clone(), &config.render);

        let mut service = Self::with_fetchers(
            Arc::new(JobRegistry::new()),
            Arc::new(http),
            Arc::new(render),
            config.storage.artifact_dir.clone(),
            config.fetcher.max_concurrent_assets as usize,
        );
        service.browser = Some(browser);
        Ok(service)
    }

    /// Builds a service around a registry and arbitrary fetch strategies
    pub fn with_fetchers(
        registry: Arc<JobRegistry>,
        static_fetcher: Arc<dyn PageFetcher>,
        render_fetcher: Arc<dyn PageFetcher>,
        artifact_dir: impl Into<PathBuf>,
        max_concurrent_assets: usize,
    ) -> Self {
        let artifact_dir = artifact_dir.into();
        let permits = Arc::new(Semaphore::new(max_concurrent_assets.max(1)));

        Self {
            registry,
            static_engine: Arc::new(CrawlEngine::new(
                static_fetcher,
                artifact_dir.clone(),
                Arc::clone(&permits),
            )),
            render_engine: Arc::new(CrawlEngine::new(render_fetcher, artifact_dir, permits)),
            browser: None,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// The shared registry, for collaborators such as the storage steward
    pub fn registry(&self) -> Arc<JobRegistry> {
        Arc::clone(&self.registry)
    }

    /// Validates a request and starts the job in the background
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, request: StartRequest) -> Result<JobId, ValidationError> {
        let mut seed = validate_seed(&request.url)?;
        seed.set_fragment(None);
        request.options.validate()?;

        let engine = if request.options.render_javascript {
            Arc::clone(&self.render_engine)
        } else {
            Arc::clone(&self.static_engine)
        };

        let job = self.registry.create(seed, request.options);
        let id = job.id();

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while let Some(finished) = tasks.try_join_next() {
            if let Err(e) = finished {
                tracing::error!("Job task panicked: {}", e);
            }
        }
        tasks.spawn(async move { engine.run(job).await });

        Ok(id)
    }

    pub fn status(&self, id: &JobId) -> Option<JobSnapshot> {
        self.registry.snapshot(id)
    }

    /// Requests cancellation; false if the job is unknown or already finished
    pub fn cancel(&self, id: &JobId) -> bool {
        self.registry.cancel(id)
    }

    /// Snapshots of every job, oldest first
    pub fn list(&self) -> Vec<JobSnapshot> {
        self.registry.list()
    }

    /// Ordered progress stream for a job, or None if it is unknown
    pub fn subscribe(&self, id: &JobId) -> Option<ProgressSubscription> {
        self.registry.subscribe(id)
    }

    /// Parses a caller-supplied job identifier
    pub fn parse_job_id(value: &str) -> Result<JobId, ValidationError> {
        value.parse()
    }

    /// Waits for every started job to reach a terminal state
    pub async fn wait_idle(&self) {
        let mut tasks = {
            let mut guard = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };

        while let Some(finished) = tasks.join_next().await {
            if let Err(e) = finished {
                tracing::error!("Job task panicked: {}", e);
            }
        }
    }

    /// Cancels every running job, waits for them to stop and closes the browser
    pub async fn shutdown(&self) {
        let cancelled = self.registry.cancel_all();
        if cancelled > 0 {
            tracing::info!(cancelled, "Cancelling running jobs");
        }

        self.wait_idle().await;

        if let Some(browser) = &self.browser {
            browser.shutdown().await;
        }
    }
}
