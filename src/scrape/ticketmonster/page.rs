// src/scrape/ticketmonster/page.rs
// =============================================================================
// Parses a ticketmonster deal page into a Deal record.
//
// The interesting fields all come out of the page's global nav and price
// box. Two of them hide in inline javascript rather than markup: the sold
// counter is animated by countUpTo(n) calls, and the active local region
// is highlighted by a script that tests nav hrefs against a deal list id.
// Those are read with regexes over the raw body; everything else goes
// through CSS selectors on the parsed document.
//
// A missing field is simply None in the record. Deal pages vary a lot
// (expired deals lose their price box, travel deals have no region) and a
// partial record is still worth keeping.
//
// Rust concepts:
// - scraper::Html: Parsed DOM with CSS selector queries
// - Lifetime-free struct methods: DealPage borrows the body it was built
//   from, so field readers take &self and allocate only their results
// =============================================================================

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use super::urls;
use crate::scrape::htmlutil;
use crate::scrape::{Deal, DealId};

static TITLE: Lazy<Selector> = Lazy::new(|| {
    // Selectors are hardcoded and always valid
    Selector::parse("head title").unwrap()
});

static ACTIVE_SECTION_TAB: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.gnb_section ul.tab_gnb > li.on > a").unwrap());

static ACTIVE_SUBMENU: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.gnb_section div.submenu ul > li.on > a").unwrap());

static LOCALE_ANCHORS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.gnb_section.local ul > li > a").unwrap());

// Matches the highlighting script: return (/(\b{id}\b)/.test(this.href));
static LOCALE_SCRIPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"return \(/\(\\b(\d+)\\b\)/.test\(this.href\)\);").unwrap());

static NUM_SOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"countUpTo\((\d+)\)").unwrap());

static ORIGINAL_PRICE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".price_info .price .old em").unwrap());

static DISCOUNT_PRICE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".price_info .price .now_price").unwrap());

static BUY_BUTTON: Lazy<Selector> = Lazy::new(|| Selector::parse("a#buy_button").unwrap());

static ADULT_WARNING: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div#content div.deal_detail_adult").unwrap());

static NOT_FOUND_ERROR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".error_type .no_find").unwrap());

const ADULT_WARNING_TEXT: &str = "청소년보호법";
const SOLD_OUT_BUTTON_TEXT: &str = "판매종료";

// Extracts a Deal from a fetched page, or None when the URL is not a deal
// page or the deal no longer exists
pub fn parse_deal(url: &Url, body: &str) -> Result<Option<Deal>> {
    let deal_id = match urls::parse_deal_url(url) {
        Some(id) => id,
        None => return Ok(None),
    };
    let page = DealPage::new(body);
    if !page.exists() {
        return Ok(None);
    }
    Ok(Some(Deal {
        site: super::NAME.to_string(),
        deal_id,
        description: page.description(),
        category: page.category(),
        subcategory: page.subcategory(),
        locale: page.locale(),
        original_price: page.original_price(),
        discount_price: page.discount_price(),
        num_sold: page.num_sold(),
        expired: page.expired(),
        adult: page.adult(),
    }))
}

struct DealPage<'a> {
    body: &'a str,
    doc: Html,
}

impl<'a> DealPage<'a> {
    fn new(body: &'a str) -> Self {
        Self {
            body,
            doc: Html::parse_document(body),
        }
    }

    // Removed deals come back as a styled "page not found" error
    fn exists(&self) -> bool {
        self.doc.select(&NOT_FOUND_ERROR).next().is_none()
    }

    fn description(&self) -> Option<String> {
        htmlutil::select_only(&self.doc, &TITLE).and_then(htmlutil::first_text)
    }

    fn category(&self) -> Option<String> {
        htmlutil::select_only(&self.doc, &ACTIVE_SECTION_TAB).and_then(htmlutil::first_text)
    }

    fn subcategory(&self) -> Option<String> {
        htmlutil::select_only(&self.doc, &ACTIVE_SUBMENU).and_then(htmlutil::first_text)
    }

    // The region is not marked up; a script highlights the local nav entry
    // whose href contains a deal list id. Find that id, then find the nav
    // link pointing at that list and take its label.
    fn locale(&self) -> Vec<String> {
        let mut scripts = LOCALE_SCRIPT.captures_iter(self.body);
        let captures = match scripts.next() {
            Some(captures) => captures,
            None => return Vec::new(),
        };
        // Two highlighting scripts would leave the region ambiguous
        if scripts.next().is_some() {
            return Vec::new();
        }
        let deal_list_id: i64 = match captures[1].parse() {
            Ok(id) => id,
            Err(_) => return Vec::new(),
        };

        for anchor in self.doc.select(&LOCALE_ANCHORS) {
            let href = match anchor.value().attr("href") {
                Some(href) => href,
                None => continue,
            };
            let resolved = match urls::base_url().join(href) {
                Ok(url) => url,
                Err(_) => continue,
            };
            if urls::parse_deal_list_url(&resolved) == Some(deal_list_id) {
                return match htmlutil::first_text(anchor) {
                    Some(text) => vec![text],
                    None => Vec::new(),
                };
            }
        }
        Vec::new()
    }

    fn original_price(&self) -> Option<i64> {
        htmlutil::extract_integer(&self.doc, &ORIGINAL_PRICE)
    }

    fn discount_price(&self) -> Option<i64> {
        htmlutil::extract_integer(&self.doc, &DISCOUNT_PRICE)
    }

    // The page animates the counter through several countUpTo(n) calls;
    // the last one is the real total
    fn num_sold(&self) -> Option<i64> {
        NUM_SOLD
            .captures_iter(self.body)
            .last()
            .and_then(|captures| captures[1].parse().ok())
    }

    fn expired(&self) -> bool {
        match htmlutil::select_only(&self.doc, &BUY_BUTTON).and_then(htmlutil::first_text) {
            Some(text) => text == SOLD_OUT_BUTTON_TEXT,
            None => false,
        }
    }

    fn adult(&self) -> bool {
        self.doc.select(&ADULT_WARNING).next().is_some()
            && self.body.contains(ADULT_WARNING_TEXT)
    }
}
