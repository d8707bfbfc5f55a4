// src/scrape/wemakeprice.rs
// =============================================================================
// The wemakeprice site scraper.
//
// Deal lists live under /main/{id} (mirrored at /wmp_top_menu/{id}, which
// canonicalizes to /main) where {id} is a word like "seoul" or "brand/123".
// Deal pages live at /deal/adeal/{id}.
//
// The deal page carries no usable title element; the description comes
// from the alt text of the deal's one-cut banner image, whose element id
// embeds the deal id. The site never marks deals expired or adult in
// markup we can see, so both flags stay false.
//
// No per-deal option listings and no scripted links to sweep for.
// =============================================================================

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::scrape::htmlutil;
use crate::scrape::{Deal, DealId, Scraper};

pub const HOST: &str = "www.wemakeprice.com";

static DEAL_LIST_PATH: Lazy<Regex> = Lazy::new(|| {
    // Hardcoded and always valid
    Regex::new(r"^/(?:main|wmp_top_menu)/(\w+(?:/\d+)?)").unwrap()
});

static DEAL_PATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^/deal/adeal/(\d+)").unwrap());

static CATEGORY: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#gnb ul.gnb_menu > li.on a span.hide").unwrap());

static SUBCATEGORY: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#div_section_gnbsub ul > li.on a").unwrap());

// The region shows up twice: a province heading and a district below it
static LOCALE_HEADING: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".gnb_section.region .gnb_sub h3.on a").unwrap());

static LOCALE_ENTRY: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".gnb_section.region .gnb_sub ul > li.on a").unwrap());

static ORIGINAL_PRICE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".price_area .ba_origin_price").unwrap());

static DISCOUNT_PRICE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".price_area .ba_sale_price").unwrap());

static NUM_SOLD: Lazy<Selector> = Lazy::new(|| Selector::parse("#buy_num").unwrap());

fn site_path(url: &Url) -> Option<&str> {
    if url.host_str() == Some(HOST) {
        Some(url.path())
    } else {
        None
    }
}

// Deal list ids are strings, optionally with a numeric tail: "seoul",
// "brand/1234"
fn parse_deal_list_url(url: &Url) -> Option<String> {
    let captures = DEAL_LIST_PATH.captures(site_path(url)?)?;
    Some(captures[1].to_string())
}

fn parse_deal_url(url: &Url) -> Option<DealId> {
    let captures = DEAL_PATH.captures(site_path(url)?)?;
    captures[1].parse().map(DealId).ok()
}

fn url_for_deal_list(id: &str) -> Url {
    // Ids come out of the path regex, so the URL always parses
    Url::parse(&format!("http://{HOST}/main/{id}")).unwrap()
}

pub struct WeMakePrice;

#[async_trait]
impl Scraper for WeMakePrice {
    fn name(&self) -> &'static str {
        "wemakeprice"
    }

    fn default_start_url(&self) -> Url {
        Url::parse(&format!("http://{HOST}/main")).unwrap()
    }

    fn transform_url(&self, url: &Url) -> Option<Url> {
        if let Some(id) = parse_deal_list_url(url) {
            return Some(url_for_deal_list(&id));
        }
        parse_deal_url(url).map(|id| self.deal_url(id))
    }

    fn deal_url(&self, id: DealId) -> Url {
        Url::parse(&format!("http://{HOST}/deal/adeal/{id}")).unwrap()
    }

    fn parse_deal(&self, url: &Url, body: &str) -> Result<Option<Deal>> {
        let deal_id = match parse_deal_url(url) {
            Some(id) => id,
            None => return Ok(None),
        };
        let page = DealPage::new(deal_id, body);
        Ok(Some(Deal {
            site: self.name().to_string(),
            deal_id,
            description: page.description(),
            category: page.category(),
            subcategory: page.subcategory(),
            locale: page.locale(),
            original_price: page.original_price(),
            discount_price: page.discount_price(),
            num_sold: page.num_sold(),
            expired: false,
            adult: false,
        }))
    }
}

struct DealPage {
    deal_id: DealId,
    doc: Html,
}

impl DealPage {
    fn new(deal_id: DealId, body: &str) -> Self {
        Self {
            deal_id,
            doc: Html::parse_document(body),
        }
    }

    fn description(&self) -> Option<String> {
        // The element id embeds the deal id; numeric, so it always parses
        let selector = Selector::parse(&format!("img#img_onecut_{}", self.deal_id)).unwrap();
        let banner = htmlutil::select_only(&self.doc, &selector)?;
        banner.value().attr("alt").map(str::to_string)
    }

    fn category(&self) -> Option<String> {
        htmlutil::select_only(&self.doc, &CATEGORY).and_then(htmlutil::first_text)
    }

    fn subcategory(&self) -> Option<String> {
        htmlutil::select_only(&self.doc, &SUBCATEGORY).and_then(htmlutil::first_text)
    }

    fn locale(&self) -> Vec<String> {
        let mut locale = Vec::new();
        for selector in [&*LOCALE_HEADING, &*LOCALE_ENTRY] {
            if let Some(active) = htmlutil::select_only(&self.doc, selector) {
                if let Some(text) = htmlutil::first_text(active) {
                    locale.push(text);
                }
            }
        }
        locale
    }

    fn original_price(&self) -> Option<i64> {
        htmlutil::extract_integer(&self.doc, &ORIGINAL_PRICE)
    }

    fn discount_price(&self) -> Option<i64> {
        htmlutil::extract_integer(&self.doc, &DISCOUNT_PRICE)
    }

    fn num_sold(&self) -> Option<i64> {
        htmlutil::extract_integer(&self.doc, &NUM_SOLD)
    }
}
