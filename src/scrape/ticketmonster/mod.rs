// src/scrape/ticketmonster/mod.rs
// =============================================================================
// The ticketmonster site scraper.
//
// Submodules:
// - urls: the site's URL grammar (recognize, canonicalize, build)
// - page: deal page HTML parsing
// - options: the getOptionList tree walk behind each deal
//
// ticketmonster is the one supported site with purchasable sub-options, so
// it implements the full capability set of the Scraper trait except link
// extraction (its pages link normally through anchors).
// =============================================================================

use anyhow::Result;
use async_trait::async_trait;
use url::Url;

use crate::crawler::Getter;
use crate::scrape::{Deal, DealId, DealOption, Scraper};

mod options;
mod page;
mod urls;

const NAME: &str = "ticketmonster";

pub struct TicketMonster;

#[async_trait]
impl Scraper for TicketMonster {
    fn name(&self) -> &'static str {
        NAME
    }

    fn default_start_url(&self) -> Url {
        urls::start_url()
    }

    fn transform_url(&self, url: &Url) -> Option<Url> {
        urls::transform(url)
    }

    fn deal_url(&self, id: DealId) -> Url {
        urls::url_for_deal(id)
    }

    fn parse_deal(&self, url: &Url, body: &str) -> Result<Option<Deal>> {
        page::parse_deal(url, body)
    }

    async fn fetch_deal_options(&self, getter: &Getter, id: DealId) -> Vec<DealOption> {
        options::fetch_deal_options(getter, id).await
    }
}
