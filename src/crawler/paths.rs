//! Maps fetched URLs to file paths inside a job's working directory

use crate::url::same_host;
use std::path::{Path, PathBuf};
use url::Url;

/// Directory holding assets fetched from hosts other than the seed's
pub const EXTERNAL_DIR: &str = "_external";

const INDEX_FILE: &str = "index.html";

/// Returns the relative storage path for a fetched resource
///
/// The path is derived from the URL's path component:
/// - `/` and paths ending in `/` map to `index.html` inside that directory
/// - markup without an extension gets `.html` appended
/// - resources from another host go under `_external/<host>/`
///
/// Empty, `.` and `..` segments are dropped and characters that are unsafe in
/// file names are replaced, so the result never escapes the working directory.
pub fn local_path_for(url: &Url, seed: &Url, is_markup: bool) -> PathBuf {
    let mut path = PathBuf::new();
    if !same_host(url, seed) {
        path.push(EXTERNAL_DIR);
        path.push(sanitize_segment(url.host_str().unwrap_or("unknown-host")));
    }

    let segments: Vec<String> = url
        .path()
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .map(sanitize_segment)
        .collect();

    let directory_like = url.path().ends_with('/');
    let Some((last, parents)) = segments.split_last().filter(|_| !directory_like) else {
        path.extend(segments.iter());
        path.push(INDEX_FILE);
        return path;
    };
    path.extend(parents);

    if is_markup && Path::new(last).extension().is_none() {
        path.push(format!("{last}.html"));
    } else {
        path.push(last);
    }
    path
}

fn sanitize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| match c {
            ':' | '\\' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
