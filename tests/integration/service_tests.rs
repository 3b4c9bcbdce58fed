//! Job service behavior over an in-memory site

use crate::support::{example_site, FakeSite};
use std::sync::Arc;
use std::time::Duration;
use sumi_mirror::crawler::PageFetcher;
use sumi_mirror::jobs::{JobOptions, JobRegistry, JobService, JobSnapshot, StartRequest};
use sumi_mirror::{JobStatus, ValidationError};
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
    static_site: Arc<FakeSite>,
    render_site: Arc<FakeSite>,
    service: JobService,
}

fn fixture_with(static_site: FakeSite) -> Fixture {
    let dir = TempDir::new().unwrap();
    let static_site = Arc::new(static_site);
    let render_site = Arc::new(example_site());
    let service = JobService::with_fetchers(
        Arc::new(JobRegistry::new()),
        Arc::clone(&static_site) as Arc<dyn PageFetcher>,
        Arc::clone(&render_site) as Arc<dyn PageFetcher>,
        dir.path(),
        4,
    );
    Fixture {
        dir,
        static_site,
        render_site,
        service,
    }
}

fn fixture() -> Fixture {
    fixture_with(example_site())
}

fn request(url: &str, options: JobOptions) -> StartRequest {
    StartRequest {
        url: url.to_string(),
        options,
    }
}

fn depth(depth: u8) -> JobOptions {
    JobOptions {
        depth,
        ..JobOptions::default()
    }
}

/// Collects every snapshot until the job's stream ends
async fn drain(service: &JobService, id: &sumi_mirror::JobId) -> Vec<JobSnapshot> {
    let mut subscription = service.subscribe(id).expect("Unknown job");
    let mut seen = Vec::new();
    let collect = async {
        while let Some(snapshot) = subscription.next().await {
            seen.push(snapshot);
        }
    };
    tokio::time::timeout(Duration::from_secs(10), collect)
        .await
        .expect("Job did not finish");
    seen
}

#[tokio::test]
async fn test_rejects_invalid_seeds() {
    let f = fixture();

    for url in [
        "ftp://example.com/",
        "http://localhost/",
        "http://127.0.0.1:8080/",
        "http://10.0.0.1/",
        "http://172.20.1.1/",
        "http://192.168.0.10/",
        "http://[::1]/",
        "not a url",
    ] {
        assert!(
            f.service.start(request(url, JobOptions::default())).is_err(),
            "{url} should be rejected"
        );
    }

    assert!(f.service.list().is_empty());
    assert!(f.static_site.fetched().is_empty());
}

#[tokio::test]
async fn test_rejects_out_of_range_options() {
    let f = fixture();

    assert_eq!(
        f.service.start(request("https://example.com/", depth(0))),
        Err(ValidationError::DepthOutOfRange(0))
    );
    assert_eq!(
        f.service.start(request("https://example.com/", depth(6))),
        Err(ValidationError::DepthOutOfRange(6))
    );
    assert_eq!(
        f.service.start(request(
            "https://example.com/",
            JobOptions {
                max_size: 501,
                ..JobOptions::default()
            }
        )),
        Err(ValidationError::MaxSizeOutOfRange(501))
    );
}

#[tokio::test]
async fn test_job_runs_to_completion() {
    let f = fixture();
    let id = f
        .service
        .start(request("https://example.com/", depth(3)))
        .unwrap();

    let snapshots = drain(&f.service, &id).await;
    let last = snapshots.last().unwrap();
    assert_eq!(last.status, JobStatus::Completed);
    assert_eq!(last.progress, 100);
    assert!(!last.render_mode);

    let zip = last.zip_file.clone().unwrap();
    assert_eq!(zip, f.dir.path().join(id.archive_name()));
    assert!(zip.exists());

    // Every URL once, nothing from other hosts
    let mut fetched = f.static_site.fetched();
    fetched.sort();
    assert_eq!(
        fetched,
        vec![
            "https://example.com/",
            "https://example.com/about",
            "https://example.com/docs/",
            "https://example.com/docs/intro",
            "https://example.com/logo.png",
            "https://example.com/site.css",
        ]
    );
    assert!(f.render_site.fetched().is_empty());

    assert_eq!(f.service.status(&id).unwrap(), *last);
    assert_eq!(f.service.list().len(), 1);
}

#[tokio::test]
async fn test_depth_one_fetches_only_seed_page() {
    let f = fixture();
    let id = f
        .service
        .start(request(
            "https://example.com/#top",
            JobOptions {
                depth: 1,
                include_images: false,
                include_styles: false,
                ..JobOptions::default()
            },
        ))
        .unwrap();

    let snapshots = drain(&f.service, &id).await;
    assert_eq!(snapshots.last().unwrap().status, JobStatus::Completed);
    assert_eq!(f.static_site.fetched(), vec!["https://example.com/"]);
}

#[tokio::test]
async fn test_progress_is_monotonic() {
    let f = fixture();
    let id = f
        .service
        .start(request("https://example.com/", depth(3)))
        .unwrap();

    let snapshots = drain(&f.service, &id).await;
    for pair in snapshots.windows(2) {
        assert!(pair[1].files_downloaded >= pair[0].files_downloaded);
    }
    assert!(snapshots
        .iter()
        .filter(|s| s.status == JobStatus::Downloading)
        .all(|s| s.progress <= 85));
}

#[tokio::test]
async fn test_render_mode_uses_render_strategy() {
    let f = fixture();
    let id = f
        .service
        .start(request(
            "https://example.com/",
            JobOptions {
                depth: 1,
                render_javascript: true,
                ..JobOptions::default()
            },
        ))
        .unwrap();

    let snapshots = drain(&f.service, &id).await;
    assert!(snapshots.iter().any(|s| s.status == JobStatus::Rendering));
    assert!(snapshots.iter().all(|s| s.render_mode));
    assert_eq!(snapshots.last().unwrap().status, JobStatus::Completed);

    assert!(f.static_site.fetched().is_empty());
    assert!(f
        .render_site
        .fetched()
        .contains(&"https://example.com/".to_string()));
}

#[tokio::test]
async fn test_cancel_mid_traversal() {
    let f = fixture_with(example_site().gated());
    let id = f
        .service
        .start(request("https://example.com/", depth(3)))
        .unwrap();
    let mut subscription = f.service.subscribe(&id).unwrap();

    // Wait until the seed fetch is in flight
    f.static_site.gate().started.notified().await;
    assert!(f.service.cancel(&id));
    f.static_site.gate().release.add_permits(100);

    let mut last = None;
    while let Some(snapshot) = subscription.next().await {
        last = Some(snapshot);
    }
    let last = last.unwrap();

    assert_eq!(last.status, JobStatus::Cancelled);
    assert!(last.zip_file.is_none());
    assert_eq!(f.static_site.fetched(), vec!["https://example.com/"]);
    assert!(!f.dir.path().join(id.archive_name()).exists());
    assert!(!f.dir.path().join(id.to_string()).exists());

    // Terminal jobs cannot be cancelled again
    assert!(!f.service.cancel(&id));
}

#[tokio::test]
async fn test_shutdown_cancels_running_jobs() {
    let f = fixture_with(example_site().gated());
    let id = f
        .service
        .start(request("https://example.com/", depth(2)))
        .unwrap();

    f.static_site.gate().started.notified().await;
    let shutdown = f.service.shutdown();
    tokio::pin!(shutdown);

    // Shutdown cannot finish until the in-flight fetch returns
    assert!(tokio::time::timeout(Duration::from_millis(50), &mut shutdown)
        .await
        .is_err());
    f.static_site.gate().release.add_permits(100);
    tokio::time::timeout(Duration::from_secs(10), shutdown)
        .await
        .expect("Shutdown hung");

    assert_eq!(f.service.status(&id).unwrap().status, JobStatus::Cancelled);
}

#[tokio::test]
async fn test_unknown_and_malformed_ids() {
    let f = fixture();
    let unknown = sumi_mirror::JobId::new();

    assert!(f.service.status(&unknown).is_none());
    assert!(!f.service.cancel(&unknown));
    assert!(f.service.subscribe(&unknown).is_none());

    assert!(matches!(
        JobService::parse_job_id("definitely-not-an-id"),
        Err(ValidationError::InvalidJobId(_))
    ));
    let id = f
        .service
        .start(request("https://example.com/", depth(1)))
        .unwrap();
    assert_eq!(JobService::parse_job_id(&id.to_string()).unwrap(), id);
}

#[tokio::test]
async fn test_concurrent_jobs_are_independent() {
    let f = fixture();
    let first = f
        .service
        .start(request("https://example.com/", depth(1)))
        .unwrap();
    let second = f
        .service
        .start(request("https://example.com/about", depth(1)))
        .unwrap();
    assert_ne!(first, second);

    f.service.wait_idle().await;

    let list = f.service.list();
    assert_eq!(list.len(), 2);
    assert!(list.iter().any(|s| s.id == first));
    assert!(list.iter().all(|s| s.status == JobStatus::Completed));
    assert!(f.dir.path().join(first.archive_name()).exists());
    assert!(f.dir.path().join(second.archive_name()).exists());
}

#[tokio::test]
async fn test_service_uses_injected_registry() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(JobRegistry::new());
    let service = JobService::with_fetchers(
        Arc::clone(&registry),
        Arc::new(example_site()),
        Arc::new(example_site()),
        dir.path(),
        4,
    );

    let id = service
        .start(request("https://example.com/", depth(1)))
        .unwrap();
    assert!(Arc::ptr_eq(&registry, &service.registry()));
    assert!(registry.snapshot(&id).is_some());

    service.wait_idle().await;
    assert_eq!(registry.snapshot(&id).unwrap().status, JobStatus::Completed);
}
