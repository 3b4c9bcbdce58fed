use crate::ValidationError;
use std::net::{Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// Validates a seed address at the service boundary
///
/// Accepts only http/https URLs with a host that is not loopback, private,
/// link-local or otherwise local to the machine running the crawl.
///
/// # Examples
///
/// ```
/// use sumi_mirror::url::validate_seed;
///
/// assert!(validate_seed("https://example.com").is_ok());
/// assert!(validate_seed("http://127.0.0.1").is_err());
/// assert!(validate_seed("ftp://example.com").is_err());
/// ```
pub fn validate_seed(address: &str) -> Result<Url, ValidationError> {
    let url = Url::parse(address.trim()).map_err(|e| ValidationError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ValidationError::InvalidScheme(url.scheme().to_string()));
    }

    if url.host().is_none() {
        return Err(ValidationError::MissingHost);
    }

    if is_private_host(&url) {
        let host = url.host_str().unwrap_or_default().to_string();
        return Err(ValidationError::PrivateHost(host));
    }

    Ok(url)
}

/// Returns true if the URL's host matches a private, loopback or link-local pattern
///
/// Matched patterns: `localhost`, `127.*`, `10.*`, `172.16-31.*`,
/// `192.168.*`, `0.*`, `::1`, `fc00::/7` and `fe80::/10`. IPv4-mapped IPv6
/// addresses are checked against the IPv4 patterns. URLs without a host are
/// treated as private.
pub fn is_private_host(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => {
            domain.trim_end_matches('.').eq_ignore_ascii_case("localhost")
        }
        Some(Host::Ipv4(addr)) => is_private_ipv4(addr),
        Some(Host::Ipv6(addr)) => is_private_ipv6(addr),
        None => true,
    }
}

fn is_private_ipv4(addr: Ipv4Addr) -> bool {
    let [a, b, ..] = addr.octets();
    matches!(
        (a, b),
        (127, _) | (10, _) | (0, _) | (192, 168) | (172, 16..=31)
    )
}

fn is_private_ipv6(addr: Ipv6Addr) -> bool {
    if let Some(mapped) = addr.to_ipv4_mapped() {
        return is_private_ipv4(mapped);
    }

    let first = addr.segments()[0];
    addr.is_loopback() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
}
