// src/scrape/mod.rs
// =============================================================================
// This module contains the deal domain model and the per-site scrapers.
//
// Submodules:
// - store: daily snapshot persistence and CSV export
// - htmlutil: small HTML helpers shared by the site parsers
// - ticketmonster / coupang / wemakeprice: one Scraper per supported site
//
// A Scraper bundles everything the crawler and the pipeline need to know
// about one site: which URLs matter, how to canonicalize them, how to turn
// a deal page into a Deal, and how to fetch a deal's purchase options.
// The site is chosen once at startup and passed around as Arc<dyn Scraper>;
// nothing else in the program knows which site it is talking to.
//
// Rust concepts:
// - Trait objects (Arc<dyn Scraper>): one interface, many site implementations
// - Newtypes: DealId/OptionId wrap i64 so the two kinds of ID can't be mixed
// - #[async_trait]: lets a trait have async methods
// =============================================================================

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use url::Url;

use crate::crawler::Getter;

mod coupang;
mod htmlutil;
pub mod store;
mod ticketmonster;
mod wemakeprice;

// Re-export the store handle so callers don't need the submodule path
pub use store::SnapshotStore;

// Identifies a deal within one site
//
// #[serde(transparent)] makes it serialize as a bare JSON number,
// not as an object wrapping one
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DealId(pub i64);

// Identifies one purchase option within a deal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionId(pub i64);

impl fmt::Display for DealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for OptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// One deal as scraped from a detail page
//
// Optional fields stay None when the page doesn't expose them;
// they serialize as JSON null so every snapshot has the same shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub site: String,
    pub deal_id: DealId,
    pub description: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub locale: Vec<String>,
    pub original_price: Option<i64>,
    pub discount_price: Option<i64>,
    pub num_sold: Option<i64>,
    pub expired: bool,
    pub adult: bool,
}

// One purchase option belonging to a deal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealOption {
    pub site: String,
    pub deal_id: DealId,
    pub option_id: OptionId,
    pub description: String,
    pub price: i64,
    pub num_available: i64,
    pub num_sold: i64,
}

// Everything the crawler and pipeline need from one deal site
//
// The crawler calls transform_url and extract_urls while walking the site;
// the pipeline calls parse_deal and fetch_deal_options on what comes back.
#[async_trait]
pub trait Scraper: Send + Sync {
    /// Short site identifier used in snapshots and log lines.
    fn name(&self) -> &'static str;

    /// Where a crawl begins when no start URL is given.
    fn default_start_url(&self) -> Url;

    /// Canonicalize a discovered URL, or return None to prune it
    /// from the crawl frontier.
    fn transform_url(&self, url: &Url) -> Option<Url>;

    /// The canonical detail-page URL for a deal.
    fn deal_url(&self, id: DealId) -> Url;

    /// Parse a deal out of a fetched page. Ok(None) means the page is
    /// not a deal page (or the deal doesn't exist) - that's not an error.
    fn parse_deal(&self, url: &Url, body: &str) -> Result<Option<Deal>>;

    /// Fetch the purchase options for a deal. Fetch or decode problems are
    /// logged and skipped; the crawl never fails because of an option.
    /// Sites without per-deal options inherit this empty default.
    async fn fetch_deal_options(&self, _getter: &Getter, _id: DealId) -> Vec<DealOption> {
        Vec::new()
    }

    /// Site-specific link discovery beyond plain <a href> anchors.
    /// Returns raw URL candidates, possibly relative. Most sites link
    /// normally and inherit this empty default.
    fn extract_urls(&self, _body: &str) -> Vec<String> {
        Vec::new()
    }
}

// Looks up the scraper for a site name
//
// Accepts the full site names plus the short aliases used day to day.
// An unknown name is a configuration error, caught before any crawling.
pub fn new_scraper(site: &str) -> Result<Arc<dyn Scraper>> {
    match site {
        "ticketmonster" | "tmon" => Ok(Arc::new(ticketmonster::TicketMonster)),
        "coupang" => Ok(Arc::new(coupang::Coupang)),
        "wemakeprice" | "wmp" => Ok(Arc::new(wemakeprice::WeMakePrice)),
        other => bail!("invalid site {:?} (expected ticketmonster, coupang, or wemakeprice)", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deal_ids_serialize_as_numbers() {
        let deal = Deal {
            site: "coupang".to_string(),
            deal_id: DealId(42),
            description: Some("Half-price pizza".to_string()),
            category: None,
            subcategory: None,
            locale: vec![],
            original_price: Some(20000),
            discount_price: Some(10000),
            num_sold: None,
            expired: false,
            adult: false,
        };
        let json = serde_json::to_string(&deal).unwrap();
        assert!(json.contains("\"deal_id\":42"));
        assert!(json.contains("\"category\":null"));
    }

    #[test]
    fn test_deal_round_trips_through_json() {
        let deal = Deal {
            site: "ticketmonster".to_string(),
            deal_id: DealId(7),
            description: None,
            category: Some("지역".to_string()),
            subcategory: None,
            locale: vec!["서울".to_string()],
            original_price: None,
            discount_price: Some(9900),
            num_sold: Some(120),
            expired: true,
            adult: false,
        };
        let json = serde_json::to_string(&deal).unwrap();
        let back: Deal = serde_json::from_str(&json).unwrap();
        assert_eq!(deal, back);
    }

    #[test]
    fn test_option_id_serializes_as_number() {
        let option = DealOption {
            site: "ticketmonster".to_string(),
            deal_id: DealId(1),
            option_id: OptionId(901),
            description: "대".to_string(),
            price: 5000,
            num_available: 3,
            num_sold: 17,
        };
        let json = serde_json::to_string(&option).unwrap();
        assert!(json.contains("\"option_id\":901"));
    }

    #[test]
    fn test_new_scraper_accepts_known_sites() {
        assert_eq!(new_scraper("ticketmonster").unwrap().name(), "ticketmonster");
        assert_eq!(new_scraper("tmon").unwrap().name(), "ticketmonster");
        assert_eq!(new_scraper("coupang").unwrap().name(), "coupang");
        assert_eq!(new_scraper("wmp").unwrap().name(), "wemakeprice");
    }

    #[test]
    fn test_new_scraper_rejects_unknown_site() {
        assert!(new_scraper("groupon").is_err());
    }
}
