// src/crawler/fetcher.rs
// =============================================================================
// This module turns one URL into (page body, outgoing links).
//
// How links are found:
// 1. Collect the href of every <a> element in the parsed HTML
// 2. Add the site scraper's own candidates (some sites bury their links
//    in scripts where no anchor scan will find them)
// 3. Resolve each candidate against the page URL, so relative paths work
// 4. Keep only URLs on the same host as the page
// 5. Drop duplicates
//
// The Fetcher trait is the seam the crawler tests fake: a test hands the
// crawler an in-memory link graph instead of a live website.
//
// Rust concepts:
// - #[async_trait]: Async methods in a trait, usable as dyn Fetcher
// - Iterator chains: filter_map to collect hrefs in one pass
// =============================================================================

use anyhow::Result;
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::Arc;
use url::Url;

use super::http::Getter;
use crate::scrape::Scraper;

// Fetches one page and reports the links leaving it
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<(String, Vec<Url>)>;
}

// The production Fetcher: HTTP GET plus link extraction
pub struct PageFetcher {
    getter: Getter,
    scraper: Arc<dyn Scraper>,
}

impl PageFetcher {
    pub fn new(getter: Getter, scraper: Arc<dyn Scraper>) -> Self {
        Self { getter, scraper }
    }
}

#[async_trait]
impl Fetcher for PageFetcher {
    async fn fetch(&self, url: &Url) -> Result<(String, Vec<Url>)> {
        let body = self.getter.get_body(url).await?;
        let mut candidates = anchor_hrefs(&body);
        candidates.extend(self.scraper.extract_urls(&body));
        let urls = resolve_same_host(url, &candidates);
        Ok((body, urls))
    }
}

// Collects the raw href of every anchor in the page
//
// html5ever recovers from broken markup, so a malformed page just
// yields whatever anchors were still readable (possibly none).
fn anchor_hrefs(body: &str) -> Vec<String> {
    let document = Html::parse_document(body);

    // This selector is hardcoded and always valid, so unwrap is safe
    let anchors = Selector::parse("a[href]").unwrap();

    document
        .select(&anchors)
        .filter_map(|element| element.value().attr("href"))
        .map(str::to_string)
        .collect()
}

// Resolves candidates against the source URL and filters them
//
// Parameters:
//   source: The URL the candidates were found on
//   candidates: Raw URL strings, absolute or relative
//
// Returns: Deduplicated absolute URLs on the source's host
fn resolve_same_host(source: &Url, candidates: &[String]) -> Vec<Url> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for candidate in candidates {
        // A candidate that won't resolve is simply not an edge
        let resolved = match source.join(candidate) {
            Ok(resolved) => resolved,
            Err(_) => continue,
        };

        // Same host only; this also drops mailto:, javascript:, and
        // friends, which resolve to URLs without our host
        if resolved.host_str() != source.host_str() || resolved.port() != source.port() {
            continue;
        }

        // insert() returns false for duplicates
        if seen.insert(resolved.to_string()) {
            urls.push(resolved);
        }
    }

    urls
}
