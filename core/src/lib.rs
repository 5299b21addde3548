//! Core utilities and shared types for the reachability checker.

use std::collections::HashSet;

pub mod ratelimiter;

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Deduplicated list of target URLs, in first-seen order.
///
/// URLs are opaque, case-sensitive strings: two lines are the same target only
/// if they are byte-identical after trimming.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlList {
    urls: Vec<String>,
}

impl UrlList {
    /// Parse newline-delimited text (blank lines and `#` comments ignored).
    pub fn parse(text: &str) -> Self {
        text.lines()
            .map(str::trim)
            .filter(|l| !l.starts_with('#'))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.urls.iter().map(String::as_str)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.iter().any(|u| u == url)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.urls
    }
}

impl<S: AsRef<str>> FromIterator<S> for UrlList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut seen = HashSet::new();
        let mut urls = Vec::new();
        for raw in iter {
            let url = raw.as_ref().trim();
            if url.is_empty() {
                continue;
            }
            if seen.insert(url.to_string()) {
                urls.push(url.to_string());
            }
        }
        UrlList { urls }
    }
}
