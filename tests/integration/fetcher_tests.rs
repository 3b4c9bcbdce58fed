//! HTTP fetch strategy against mock servers

use sumi_mirror::config::{FetcherConfig, UserAgentConfig};
use sumi_mirror::crawler::{AssetKind, FetchError, HttpFetcher, PageFetcher};
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MB: u64 = 1024 * 1024;

fn test_user_agent() -> UserAgentConfig {
    UserAgentConfig {
        crawler_name: "TestBot".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    }
}

fn fetcher() -> HttpFetcher {
    HttpFetcher::from_config(&FetcherConfig::default(), &test_user_agent())
        .expect("Failed to build fetcher")
}

fn url(server: &MockServer, route: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), route)).expect("Failed to parse mock URL")
}

#[tokio::test]
async fn test_page_fetch_extracts_references() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(
                r#"<html><head><script src="/app.js"></script></head><body>
                <a href="/page1">Page 1</a>
                <a href="mailto:someone@example.com">Mail</a>
                <img src="img/logo.png">
                </body></html>"#,
                "text/html; charset=utf-8",
            ),
        )
        .mount(&mock_server)
        .await;

    let page = fetcher()
        .fetch_page(&url(&mock_server, "/"), MB, &CancellationToken::new())
        .await
        .expect("Fetch failed");

    assert!(page.is_markup());
    assert_eq!(page.references.links, vec![url(&mock_server, "/page1")]);

    let assets: Vec<_> = page
        .references
        .assets
        .iter()
        .map(|a| (a.kind, a.url.clone()))
        .collect();
    assert_eq!(
        assets,
        vec![
            (AssetKind::Image, url(&mock_server, "/img/logo.png")),
            (AssetKind::Script, url(&mock_server, "/app.js")),
        ]
    );
}

#[tokio::test]
async fn test_non_markup_page_has_no_references() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(r#"{"href": "<a href='/x'>"}"#, "application/json"),
        )
        .mount(&mock_server)
        .await;

    let page = fetcher()
        .fetch_page(&url(&mock_server, "/data.json"), MB, &CancellationToken::new())
        .await
        .expect("Fetch failed");

    assert!(!page.is_markup());
    assert!(page.references.links.is_empty());
    assert!(!page.body.is_empty());
}

#[tokio::test]
async fn test_error_status_is_reported() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let err = fetcher()
        .fetch_page(&url(&mock_server, "/missing"), MB, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Status { status: 404, .. }));
    assert!(!err.is_job_fatal());
}

#[tokio::test]
async fn test_oversize_body_is_rejected() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/big.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 4096]))
        .mount(&mock_server)
        .await;

    let err = fetcher()
        .fetch_asset(&url(&mock_server, "/big.bin"), 1024, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        FetchError::TooLarge { size, limit, .. } => {
            assert!(size > limit);
            assert_eq!(limit, 1024);
        }
        other => panic!("Expected TooLarge, got {other:?}"),
    }
}

#[tokio::test]
async fn test_body_at_limit_is_accepted() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/exact.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 1024]))
        .mount(&mock_server)
        .await;

    let asset = fetcher()
        .fetch_asset(&url(&mock_server, "/exact.bin"), 1024, &CancellationToken::new())
        .await
        .expect("Fetch failed");

    assert_eq!(asset.body.len(), 1024);
}

#[tokio::test]
async fn test_user_agent_header_is_sent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .and(header(
            "user-agent",
            "TestBot/1.0.0 (+https://example.com/contact; test@example.com)",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&mock_server)
        .await;

    fetcher()
        .fetch_asset(&url(&mock_server, "/"), MB, &CancellationToken::new())
        .await
        .expect("Request did not match the user agent");
}

#[tokio::test]
async fn test_redirects_are_followed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/new/"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/new/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(r#"<a href="child">Child</a>"#, "text/html"),
        )
        .mount(&mock_server)
        .await;

    let page = fetcher()
        .fetch_page(&url(&mock_server, "/old"), MB, &CancellationToken::new())
        .await
        .expect("Fetch failed");

    assert_eq!(page.url, url(&mock_server, "/new/"));
    // Relative links resolve against the final URL
    assert_eq!(page.references.links, vec![url(&mock_server, "/new/child")]);
}

#[tokio::test]
async fn test_redirect_to_private_host_is_refused() {
    let mock_server = MockServer::start().await;
    let private_target = format!("http://localhost:{}/secret", mock_server.address().port());

    Mock::given(method("GET"))
        .and(path("/go"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", private_target.as_str()))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/secret"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("internal admin panel", "text/html"))
        .expect(0)
        .mount(&mock_server)
        .await;

    let err = fetcher()
        .fetch_page(&url(&mock_server, "/go"), MB, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Status { status: 302, .. }));
}
