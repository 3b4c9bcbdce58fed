//! Rendered fetch strategy
//!
//! Pages are loaded in a headless Chromium so that script-generated content and
//! links are captured. One browser process is shared by every job using this
//! strategy; it is launched on first use and each navigation gets its own page,
//! so a hung or crashed page only affects the fetch that opened it.
//!
//! Assets are plain files and are fetched over HTTP like the static strategy.

use super::fetcher::{FetchError, HttpFetcher, PageFetcher, RetrievedAsset, RetrievedPage};
use super::parser::RawReferences;
use crate::config::RenderConfig;
use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Interval between network-idle probes
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Consecutive probes with no new resource entries before the page counts as idle
const IDLE_STABLE_PROBES: u32 = 2;

const IDLE_PROBE_SCRIPT: &str = r#"(() => ({
    readyState: document.readyState,
    resources: performance.getEntriesByType('resource').length
}))()"#;

/// Collects the raw reference attributes from the live DOM
const EXTRACT_SCRIPT: &str = r#"(() => {
    const attrs = (selector, name) =>
        Array.from(document.querySelectorAll(selector)).map(el => el.getAttribute(name));
    const base = document.querySelector('base[href]');
    return {
        baseHref: base ? base.getAttribute('href') : null,
        links: attrs('a[href], area[href]', 'href'),
        images: attrs('img[src]', 'src').concat(attrs('link[rel~="icon"][href]', 'href')),
        stylesheets: attrs('link[rel~="stylesheet"][href]', 'href'),
        scripts: attrs('script[src]', 'src'),
    };
})()"#;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdleProbe {
    ready_state: String,
    resources: u64,
}

#[derive(Default)]
struct SessionState {
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
}

/// A lazily launched browser shared across jobs
pub struct BrowserSession {
    config: RenderConfig,
    state: Mutex<SessionState>,
}

impl BrowserSession {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Returns true once the browser has been launched and not shut down
    pub async fn is_running(&self) -> bool {
        self.state.lock().await.browser.is_some()
    }

    /// Opens a fresh page, launching the browser if needed
    ///
    /// Launches are serialized by the session lock. If the running browser
    /// refuses a new page it is discarded so the next call relaunches it.
    async fn open_page(&self) -> Result<Page, FetchError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if state.browser.is_none() {
            let (browser, handler) = self.launch().await?;
            state.browser = Some(browser);
            state.handler = Some(handler);
        }

        let opened = match &state.browser {
            Some(browser) => browser.new_page("about:blank").await,
            None => return Err(FetchError::Infrastructure("browser unavailable".to_string())),
        };

        match opened {
            Ok(page) => Ok(page),
            Err(e) => {
                tracing::warn!("Browser refused a new page, discarding it: {}", e);
                if let Some(handler) = state.handler.take() {
                    handler.abort();
                }
                state.browser = None;
                Err(FetchError::Infrastructure(e.to_string()))
            }
        }
    }

    async fn launch(&self) -> Result<(Browser, JoinHandle<()>), FetchError> {
        tracing::info!("Launching headless browser");

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .request_timeout(self.config.navigation_timeout())
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage");
        if let Some(path) = &self.config.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(FetchError::Infrastructure)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| FetchError::Infrastructure(e.to_string()))?;

        // The handler drives the CDP connection and must be polled for the
        // browser's whole lifetime
        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("Browser handler stopped: {}", e);
                    break;
                }
            }
        });

        Ok((browser, handle))
    }

    /// Closes the browser if it was ever launched
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;

        if let Some(mut browser) = state.browser.take() {
            tracing::info!("Closing headless browser");
            if let Err(e) = browser.close().await {
                tracing::warn!("Failed to close browser cleanly: {}", e);
            }
            if let Err(e) = browser.wait().await {
                tracing::warn!("Failed to wait for browser exit: {}", e);
            }
        }

        if let Some(handler) = state.handler.take() {
            handler.abort();
        }
    }
}

/// Script-executing strategy backed by a shared [`BrowserSession`]
pub struct RenderFetcher {
    session: Arc<BrowserSession>,
    assets: HttpFetcher,
    navigation_timeout: Duration,
    settle_delay: Duration,
}

impl RenderFetcher {
    pub fn new(session: Arc<BrowserSession>, assets: HttpFetcher, config: &RenderConfig) -> Self {
        Self {
            session,
            assets,
            navigation_timeout: config.navigation_timeout(),
            settle_delay: config.settle_delay(),
        }
    }

    async fn render(&self, page: &Page, url: &Url, max_bytes: u64) -> Result<RetrievedPage, FetchError> {
        let navigation_error = |e: chromiumoxide::error::CdpError| FetchError::Navigation {
            url: url.to_string(),
            message: e.to_string(),
        };

        page.goto(url.as_str()).await.map_err(navigation_error)?;
        page.wait_for_navigation().await.map_err(navigation_error)?;
        wait_for_network_idle(page).await;
        tokio::time::sleep(self.settle_delay).await;

        let html = page.content().await.map_err(navigation_error)?;
        let size = html.len() as u64;
        if size > max_bytes {
            return Err(FetchError::TooLarge {
                url: url.to_string(),
                size,
                limit: max_bytes,
            });
        }

        let final_url = page
            .url()
            .await
            .ok()
            .flatten()
            .and_then(|u| Url::parse(&u).ok())
            .unwrap_or_else(|| url.clone());

        let raw: RawReferences = page
            .evaluate(EXTRACT_SCRIPT)
            .await
            .map_err(navigation_error)?
            .into_value()
            .map_err(|e| FetchError::Navigation {
                url: url.to_string(),
                message: format!("Unexpected extraction result: {e}"),
            })?;

        Ok(RetrievedPage {
            references: raw.resolve(&final_url),
            url: final_url,
            content_type: Some("text/html".to_string()),
            body: html.into_bytes(),
        })
    }
}

/// Polls until the document is complete and no new resources have started
///
/// Returns silently when a probe fails; the caller's timeout bounds the wait.
async fn wait_for_network_idle(page: &Page) {
    let mut last_count = None;
    let mut stable = 0;

    loop {
        let probe: Option<IdleProbe> = match page.evaluate(IDLE_PROBE_SCRIPT).await {
            Ok(result) => result.into_value().ok(),
            Err(_) => None,
        };
        let Some(probe) = probe else {
            return;
        };

        if probe.ready_state == "complete" && last_count == Some(probe.resources) {
            stable += 1;
            if stable >= IDLE_STABLE_PROBES {
                return;
            }
        } else {
            stable = 0;
        }
        last_count = Some(probe.resources);

        tokio::time::sleep(IDLE_POLL_INTERVAL).await;
    }
}

#[async_trait]
impl PageFetcher for RenderFetcher {
    async fn fetch_page(
        &self,
        url: &Url,
        max_bytes: u64,
        cancel: &CancellationToken,
    ) -> Result<RetrievedPage, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let page = self.session.open_page().await?;

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            rendered = tokio::time::timeout(self.navigation_timeout, self.render(&page, url, max_bytes)) => {
                rendered.unwrap_or_else(|_| Err(FetchError::Timeout { url: url.to_string() }))
            }
        };

        if let Err(e) = page.close().await {
            tracing::debug!("Failed to close page for {}: {}", url, e);
        }

        outcome
    }

    async fn fetch_asset(
        &self,
        url: &Url,
        max_bytes: u64,
        cancel: &CancellationToken,
    ) -> Result<RetrievedAsset, FetchError> {
        self.assets.fetch_asset(url, max_bytes, cancel).await
    }
}
