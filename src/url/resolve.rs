use url::Url;

/// Schemes whose references never name a crawlable resource
const PSEUDO_SCHEMES: &[&str] = &["javascript:", "mailto:", "tel:", "data:"];

/// Resolves a possibly-relative reference against a base URL
///
/// Returns None if the reference should be excluded:
/// - empty or fragment-only (`#section`) references
/// - `javascript:`, `mailto:`, `tel:` and `data:` references
/// - references that fail to resolve
/// - anything that resolves to a scheme other than http or https
///
/// The fragment is dropped from the result so `/page#a` and `/page#b` map to
/// the same address. The function is pure and safe to call from any task.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_mirror::url::resolve_reference;
///
/// let base = Url::parse("https://example.com/docs/intro").unwrap();
/// let resolved = resolve_reference("../about#team", &base).unwrap();
/// assert_eq!(resolved.as_str(), "https://example.com/about");
///
/// assert!(resolve_reference("#top", &base).is_none());
/// assert!(resolve_reference("mailto:admin@example.com", &base).is_none());
/// ```
pub fn resolve_reference(reference: &str, base: &Url) -> Option<Url> {
    let reference = reference.trim();

    if reference.is_empty() || reference.starts_with('#') {
        return None;
    }

    let lowered = reference.to_ascii_lowercase();
    if PSEUDO_SCHEMES.iter().any(|scheme| lowered.starts_with(scheme)) {
        return None;
    }

    let mut resolved = base.join(reference).ok()?;
    if resolved.scheme() != "http" && resolved.scheme() != "https" {
        return None;
    }

    resolved.set_fragment(None);
    Some(resolved)
}
