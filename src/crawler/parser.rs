//! HTML parser for extracting links and asset references
//!
//! This module handles parsing markup to extract:
//! - Links to follow (from `<a>` and `<area>` tags)
//! - Images (`<img src>` and icon links)
//! - Stylesheets (`<link rel="stylesheet">`)
//! - Scripts (`<script src>`)
//!
//! The rendering strategy collects the same raw attribute values from the live
//! DOM, so both strategies go through [`RawReferences::resolve`].

use crate::url::resolve_reference;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::collections::HashSet;
use url::Url;

/// Asset categories that can be toggled per job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Image,
    Stylesheet,
    Script,
}

/// An asset referenced by a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRef {
    pub kind: AssetKind,
    pub url: Url,
}

/// Absolute, deduplicated references found on one page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageReferences {
    /// Outbound links, in document order
    pub links: Vec<Url>,

    /// Asset references, in document order
    pub assets: Vec<AssetRef>,
}

/// Unresolved attribute values as they appear in the document
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawReferences {
    /// Value of `<base href>`, if the document declares one
    pub base_href: Option<String>,
    pub links: Vec<String>,
    pub images: Vec<String>,
    pub stylesheets: Vec<String>,
    pub scripts: Vec<String>,
}

impl RawReferences {
    /// Resolves every reference against the document's effective base URL
    ///
    /// Rejected references (fragments, pseudo-schemes, non-web schemes) are
    /// dropped, and duplicates are removed while keeping first occurrence order.
    pub fn resolve(&self, page_url: &Url) -> PageReferences {
        let base = self
            .base_href
            .as_deref()
            .and_then(|href| resolve_reference(href, page_url))
            .unwrap_or_else(|| page_url.clone());

        let mut seen = HashSet::new();
        let links = self
            .links
            .iter()
            .filter_map(|href| resolve_reference(href, &base))
            .filter(|url| seen.insert(url.to_string()))
            .collect();

        let mut seen = HashSet::new();
        let groups = [
            (AssetKind::Image, &self.images),
            (AssetKind::Stylesheet, &self.stylesheets),
            (AssetKind::Script, &self.scripts),
        ];
        let assets = groups
            .into_iter()
            .flat_map(|(kind, values)| {
                values
                    .iter()
                    .filter_map(|value| resolve_reference(value, &base))
                    .map(move |url| AssetRef { kind, url })
            })
            .filter(|asset| seen.insert(asset.url.to_string()))
            .collect();

        PageReferences { links, assets }
    }
}

/// Parses markup and returns its resolved links and assets
///
/// # Example
///
/// ```
/// use sumi_mirror::crawler::parse_references;
/// use url::Url;
///
/// let html = r#"<a href="/about">About</a><img src="logo.png">"#;
/// let base = Url::parse("https://example.com/").unwrap();
/// let refs = parse_references(html, &base);
/// assert_eq!(refs.links[0].as_str(), "https://example.com/about");
/// assert_eq!(refs.assets[0].url.as_str(), "https://example.com/logo.png");
/// ```
pub fn parse_references(html: &str, page_url: &Url) -> PageReferences {
    extract_raw(&Html::parse_document(html)).resolve(page_url)
}

/// Collects raw attribute values from a parsed document
fn extract_raw(document: &Html) -> RawReferences {
    RawReferences {
        base_href: select_attr(document, "base[href]", "href").into_iter().next(),
        links: select_attr(document, "a[href], area[href]", "href"),
        images: [
            select_attr(document, "img[src]", "src"),
            select_attr(document, "link[rel~=\"icon\"][href]", "href"),
        ]
        .concat(),
        stylesheets: select_attr(document, "link[rel~=\"stylesheet\"][href]", "href"),
        scripts: select_attr(document, "script[src]", "src"),
    }
}

fn select_attr(document: &Html, selector: &str, attr: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse(selector) else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|element| element.value().attr(attr))
        .map(str::to_string)
        .collect()
}
