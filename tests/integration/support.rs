//! Shared fakes for integration tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use sumi_mirror::crawler::{
    parse_references, FetchError, PageFetcher, RetrievedAsset, RetrievedPage,
};
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use url::Url;

/// In-memory site keyed by absolute URL, recording every fetch
#[derive(Default)]
pub struct FakeSite {
    pages: HashMap<String, String>,
    assets: HashMap<String, Vec<u8>>,
    fetched: Mutex<Vec<String>>,
    gate: Option<Gate>,
}

/// Blocks page fetches until released
pub struct Gate {
    pub started: Notify,
    pub release: Semaphore,
}

impl FakeSite {
    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    pub fn asset(mut self, url: &str, body: &[u8]) -> Self {
        self.assets.insert(url.to_string(), body.to_vec());
        self
    }

    pub fn gated(mut self) -> Self {
        self.gate = Some(Gate {
            started: Notify::new(),
            release: Semaphore::new(0),
        });
        self
    }

    pub fn gate(&self) -> &Gate {
        self.gate.as_ref().expect("site is not gated")
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

/// A small site on example.com with a cross-host link and shared assets
pub fn example_site() -> FakeSite {
    FakeSite::default()
        .page(
            "https://example.com/",
            r#"<html><head><link rel="stylesheet" href="/site.css"></head><body>
               <a href="/docs/">Docs</a>
               <a href="/about">About</a>
               <a href="https://elsewhere.org/">Elsewhere</a>
               <img src="/logo.png">
               </body></html>"#,
        )
        .page(
            "https://example.com/docs/",
            r#"<a href="/docs/intro">Intro</a><a href="/">Home</a><img src="/logo.png">"#,
        )
        .page("https://example.com/about", r#"<a href="/docs/">Docs</a>"#)
        .page("https://example.com/docs/intro", "<p>deep</p>")
        .asset("https://example.com/site.css", b"body {}")
        .asset("https://example.com/logo.png", b"PNG")
}

#[async_trait]
impl PageFetcher for FakeSite {
    async fn fetch_page(
        &self,
        url: &Url,
        max_bytes: u64,
        _cancel: &CancellationToken,
    ) -> Result<RetrievedPage, FetchError> {
        self.fetched.lock().unwrap().push(url.to_string());

        if let Some(gate) = &self.gate {
            gate.started.notify_one();
            let permit = gate.release.acquire().await.map_err(|_| FetchError::Cancelled)?;
            permit.forget();
        }

        let html = self.pages.get(url.as_str()).ok_or_else(|| FetchError::Status {
            url: url.to_string(),
            status: 404,
        })?;
        if html.len() as u64 > max_bytes {
            return Err(FetchError::TooLarge {
                url: url.to_string(),
                size: html.len() as u64,
                limit: max_bytes,
            });
        }

        Ok(RetrievedPage {
            url: url.clone(),
            content_type: Some("text/html".to_string()),
            body: html.clone().into_bytes(),
            references: parse_references(html, url),
        })
    }

    async fn fetch_asset(
        &self,
        url: &Url,
        _max_bytes: u64,
        _cancel: &CancellationToken,
    ) -> Result<RetrievedAsset, FetchError> {
        self.fetched.lock().unwrap().push(url.to_string());

        let body = self.assets.get(url.as_str()).ok_or_else(|| FetchError::Status {
            url: url.to_string(),
            status: 404,
        })?;
        Ok(RetrievedAsset {
            url: url.clone(),
            content_type: None,
            body: body.clone(),
        })
    }
}
