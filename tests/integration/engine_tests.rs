//! End-to-end mirror runs against mock servers

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use sumi_mirror::config::{FetcherConfig, UserAgentConfig};
use sumi_mirror::crawler::{CrawlEngine, HttpFetcher, PageFetcher};
use sumi_mirror::jobs::{JobOptions, JobRegistry};
use sumi_mirror::JobStatus;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn engine(artifact_dir: &Path) -> CrawlEngine {
    let fetcher = HttpFetcher::from_config(&FetcherConfig::default(), &UserAgentConfig::default())
        .expect("Failed to build fetcher");
    CrawlEngine::new(
        Arc::new(fetcher) as Arc<dyn PageFetcher>,
        artifact_dir,
        Arc::new(Semaphore::new(4)),
    )
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/html")
}

fn read_archive(path: &Path) -> BTreeMap<String, Vec<u8>> {
    let file = std::fs::File::open(path).expect("Archive missing");
    let mut archive = zip::ZipArchive::new(file).expect("Invalid archive");
    let mut entries = BTreeMap::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).unwrap();
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        entries.insert(entry.name().to_string(), content);
    }
    entries
}

#[tokio::test]
async fn test_mirror_with_depth_limit() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<html><head><link rel="stylesheet" href="/style.css"></head><body>
            <a href="/page1">Page 1</a>
            <a href="/page2">Page 2</a>
            <img src="/img.png">
            </body></html>"#,
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page1"))
        .respond_with(html(r#"<a href="/deep">Deep</a><a href="/page2">Page 2</a>"#))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(html(r#"<a href="/">Home</a><img src="/img.png">"#))
        .expect(1)
        .mount(&mock_server)
        .await;

    // Level 2 is beyond a depth of 2 and must never be requested
    Mock::given(method("GET"))
        .and(path("/deep"))
        .respond_with(html("<p>too deep</p>"))
        .expect(0)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/style.css"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("body { color: black; }", "text/css"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/img.png"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(vec![0x89, b'P', b'N', b'G'], "image/png"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let registry = JobRegistry::new();
    let seed = Url::parse(&format!("{}/", mock_server.uri())).unwrap();
    let job = registry.create(
        seed,
        JobOptions {
            depth: 2,
            ..JobOptions::default()
        },
    );
    let id = job.id();

    let status = engine(dir.path()).run(job).await;
    assert_eq!(status, JobStatus::Completed);

    let snapshot = registry.snapshot(&id).unwrap();
    assert_eq!(snapshot.progress, 100);
    assert_eq!(snapshot.files_downloaded, 5);

    let zip_path = snapshot.zip_file.expect("Completed job has an archive");
    let entries = read_archive(&zip_path);
    assert_eq!(
        entries.keys().cloned().collect::<Vec<_>>(),
        vec!["img.png", "index.html", "page1.html", "page2.html", "style.css"]
    );
    assert_eq!(entries["style.css"], b"body { color: black; }");

    // Only the archive remains
    assert!(!dir.path().join(id.to_string()).exists());
}

#[tokio::test]
async fn test_oversize_page_is_skipped() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<a href="/huge">Huge</a><a href="/small">Small</a>"#))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/huge"))
        .respond_with(html(&"x".repeat(1024 * 1024 + 1)))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/small"))
        .respond_with(html("<p>small</p>"))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let registry = JobRegistry::new();
    let seed = Url::parse(&mock_server.uri()).unwrap();
    let job = registry.create(
        seed,
        JobOptions {
            depth: 2,
            max_size: 1,
            ..JobOptions::default()
        },
    );
    let id = job.id();

    assert_eq!(engine(dir.path()).run(job).await, JobStatus::Completed);

    let snapshot = registry.snapshot(&id).unwrap();
    assert_eq!(snapshot.files_downloaded, 2);
    let entries = read_archive(&snapshot.zip_file.unwrap());
    assert!(entries.contains_key("small.html"));
    assert!(!entries.contains_key("huge.html"));
}

#[tokio::test]
async fn test_failed_seed_still_completes_with_empty_archive() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let registry = JobRegistry::new();
    let job = registry.create(Url::parse(&mock_server.uri()).unwrap(), JobOptions::default());
    let id = job.id();

    assert_eq!(engine(dir.path()).run(job).await, JobStatus::Completed);

    let snapshot = registry.snapshot(&id).unwrap();
    assert_eq!(snapshot.files_downloaded, 0);
    assert!(read_archive(&snapshot.zip_file.unwrap()).is_empty());
}

#[tokio::test]
async fn test_missing_assets_are_best_effort() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<img src="/gone.png"><script src="/app.js"></script>"#))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/app.js"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("run()", "application/javascript"))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let registry = JobRegistry::new();
    let job = registry.create(Url::parse(&mock_server.uri()).unwrap(), JobOptions::default());
    let id = job.id();

    assert_eq!(engine(dir.path()).run(job).await, JobStatus::Completed);

    let entries = read_archive(&registry.snapshot(&id).unwrap().zip_file.unwrap());
    assert_eq!(
        entries.keys().cloned().collect::<Vec<_>>(),
        vec!["app.js", "index.html"]
    );
}

#[tokio::test]
async fn test_redirect_target_is_fetched_once() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<a href="/old">Old</a><a href="/new">New</a>"#))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(html("<p>moved here</p>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let registry = JobRegistry::new();
    let job = registry.create(
        Url::parse(&mock_server.uri()).unwrap(),
        JobOptions {
            depth: 2,
            ..JobOptions::default()
        },
    );
    let id = job.id();

    assert_eq!(engine(dir.path()).run(job).await, JobStatus::Completed);

    let snapshot = registry.snapshot(&id).unwrap();
    assert_eq!(snapshot.files_downloaded, 2);
    let entries = read_archive(&snapshot.zip_file.unwrap());
    assert_eq!(
        entries.keys().cloned().collect::<Vec<_>>(),
        vec!["index.html", "new.html"]
    );
}
