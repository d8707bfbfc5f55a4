// src/scrape/ticketmonster/urls.rs
// =============================================================================
// URL grammar for ticketmonster.
//
// The site has two page kinds worth crawling: deal lists at /deallist/{id}
// and deals at /deal/{id}. Everything here either builds those URLs or
// recognizes them, and transform() folds every recognized variant down to
// its canonical form so the crawler's dedup sees one URL per page.
//
// Rust concepts:
// - once_cell::sync::Lazy: Compiles each regex once, on first use
// - Option returns: "not one of ours" is a value, not an error
// =============================================================================

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::scrape::DealId;

pub const HOST: &str = "www.ticketmonster.co.kr";

static DEAL_LIST_PATH: Lazy<Regex> = Lazy::new(|| {
    // Hardcoded and always valid
    Regex::new(r"^/deallist/(\d+)").unwrap()
});

static DEAL_PATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^/deal/(\d+)").unwrap());

pub fn base_url() -> Url {
    // Hardcoded and always parseable
    Url::parse(&format!("http://{HOST}/")).unwrap()
}

pub fn start_url() -> Url {
    Url::parse(&format!("http://{HOST}/home/")).unwrap()
}

pub fn url_for_deal_list(id: i64) -> Url {
    Url::parse(&format!("http://{HOST}/deallist/{id}")).unwrap()
}

pub fn url_for_deal(id: DealId) -> Url {
    Url::parse(&format!("http://{HOST}/deal/{id}")).unwrap()
}

// The JSON endpoint listing a deal's options at one expansion depth
//
// Takes the site base as a parameter so option fetching can be pointed at
// a local server in tests.
pub fn option_list_url(base: &Url, id: DealId, depth: usize, opt_key: &str) -> Url {
    // The relative path is well formed, so the join cannot fail
    let mut url = base.join(&format!("deal/getOptionList/{id}/{depth}")).unwrap();
    // The endpoint expects the parameter even when the key is empty
    url.query_pairs_mut().append_pair("opt_key", opt_key);
    url
}

// Reads the deal list id out of a /deallist/{id} URL on our host
pub fn parse_deal_list_url(url: &Url) -> Option<i64> {
    let captures = match_url(url, &DEAL_LIST_PATH)?;
    captures[1].parse().ok()
}

// Reads the deal id out of a /deal/{id} URL on our host
pub fn parse_deal_url(url: &Url) -> Option<DealId> {
    let captures = match_url(url, &DEAL_PATH)?;
    captures[1].parse().map(DealId).ok()
}

fn match_url<'a>(url: &'a Url, pattern: &Regex) -> Option<regex::Captures<'a>> {
    if url.host_str() != Some(HOST) {
        return None;
    }
    pattern.captures(url.path())
}

// Canonicalizes crawlable URLs and prunes the rest
pub fn transform(url: &Url) -> Option<Url> {
    if let Some(id) = parse_deal_list_url(url) {
        return Some(url_for_deal_list(id));
    }
    parse_deal_url(url).map(url_for_deal)
}
