use url::Url;

/// Extracts the domain from a URL
///
/// This function retrieves the host portion of a URL and converts it to lowercase.
/// If the URL has no host (which shouldn't happen for valid HTTP(S) URLs), it returns None.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_mirror::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns true when both URLs have exactly the same hostname
///
/// This is the crawl's same-origin rule: `blog.example.com` and
/// `example.com` are different origins even though they share a registrable
/// domain. Scheme and port are not compared.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_mirror::url::same_host;
///
/// let seed = Url::parse("https://example.com/").unwrap();
/// assert!(same_host(&seed, &Url::parse("http://example.com/about").unwrap()));
/// assert!(!same_host(&seed, &Url::parse("https://blog.example.com/").unwrap()));
/// ```
pub fn same_host(a: &Url, b: &Url) -> bool {
    match (extract_domain(a), extract_domain(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
