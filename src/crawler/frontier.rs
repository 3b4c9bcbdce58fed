//! Breadth-first frontier
//!
//! Pages are grouped by level: level 0 is the seed, level `n + 1` holds links
//! first discovered on level `n`. A URL enters the frontier at most once and is
//! fetched at most once, whether as a page or as an asset.

use std::collections::HashSet;
use url::Url;

#[derive(Debug)]
pub struct Frontier {
    levels: Vec<Vec<Url>>,
    enqueued: HashSet<String>,
    visited: HashSet<String>,
    max_depth: usize,
}

impl Frontier {
    /// Creates a frontier holding only the seed at level 0
    ///
    /// `max_depth` is the number of levels that will be fetched.
    pub fn new(seed: Url, max_depth: usize) -> Self {
        let mut enqueued = HashSet::new();
        enqueued.insert(key(&seed));

        Self {
            levels: vec![vec![seed]],
            enqueued,
            visited: HashSet::new(),
            max_depth,
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Removes and returns the batch for a level
    pub fn take_level(&mut self, depth: usize) -> Vec<Url> {
        self.levels
            .get_mut(depth)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// Number of URLs waiting at a level
    pub fn pending(&self, depth: usize) -> usize {
        self.levels.get(depth).map(Vec::len).unwrap_or(0)
    }

    /// Queues a URL for a level unless it has been seen before
    ///
    /// URLs beyond the last fetched level are still recorded so they count
    /// toward the discovered total, but they are never returned by
    /// [`Frontier::take_level`] within the depth limit.
    pub fn enqueue(&mut self, depth: usize, url: Url) -> bool {
        let key = key(&url);
        if self.visited.contains(&key) || !self.enqueued.insert(key) {
            return false;
        }

        if self.levels.len() <= depth {
            self.levels.resize_with(depth + 1, Vec::new);
        }
        self.levels[depth].push(url);
        true
    }

    /// Marks a URL as fetched; false if it already was
    pub fn mark_visited(&mut self, url: &Url) -> bool {
        self.visited.insert(key(url))
    }

    pub fn is_visited(&self, url: &Url) -> bool {
        self.visited.contains(&key(url))
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }
}

fn key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.into()
}
