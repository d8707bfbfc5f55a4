// src/scrape/coupang.rs
// =============================================================================
// The coupang site scraper.
//
// Coupang renders most of its deal list links through javascript, so anchor
// extraction alone misses them; this scraper adds a regex sweep over the
// raw body for *.pang URLs. Deal pages live at /deal.pang?coupang={id} and
// list pages at /alldeal.pang, /promotion/prmt.pang and /shopping.pang.
//
// Categories are not written into the page as text we can trust; instead
// the active nav elements carry stable ids (menuTab3, gts9, ...) that map
// to the site's category names. Unknown ids fall back to the raw id so new
// sections degrade into something greppable rather than nothing.
//
// The site has no per-deal option listings.
// =============================================================================

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::scrape::htmlutil;
use crate::scrape::{Deal, DealId, Scraper};

pub const HOST: &str = "www.coupang.com";

// Sweeps *.pang URLs (absolute or relative, with query and fragment) out
// of raw markup and javascript
static EXTRACT_URL: Lazy<Regex> = Lazy::new(|| {
    // Hardcoded and always valid
    Regex::new(
        r"(?:https?://)?(?:[-\w.%~]+)?/(?:alldeal|promotion/prmt|shopping|deal)\.pang(?:[?][-\w.%~:@!$&()*+,;=/?]*)?(?:[#][-\w.%~:@!$&()*+,;=/?]*)?",
    )
    .unwrap()
});

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());

static ACTIVE_CATEGORY: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#gnbDepth1 > .on").unwrap());

static ACTIVE_SUBCATEGORY: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#gnbTopSubMenu > .on").unwrap());

static ACTIVE_LOCALE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#localCatePos .on").unwrap());

static NUM_SOLD: Lazy<Selector> = Lazy::new(|| Selector::parse("#buyCount").unwrap());

static ORIGINAL_PRICE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".priceArea .originPrice .delPrice").unwrap());

static DISCOUNT_PRICE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".priceArea .salePrice").unwrap());

static EXPIRED_BUTTON: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#non_click_order_button").unwrap());

static ADULT_WARNING: Lazy<Selector> = Lazy::new(|| Selector::parse("#onlyAdult").unwrap());

const ADULT_WARNING_TEXT: &str = "청소년보호법";
// Removed deals keep a normal-looking page whose title apologizes instead
const INVALID_DEAL_TEXT: &str = "유효하지";

fn category_name(id: &str) -> Option<&'static str> {
    Some(match id {
        "menuTab1" => "오늘의 추천",
        "menuTab2" => "지역",
        "menuTab3" => "쇼핑",
        "menuTab4" => "여행/레저",
        "menuTab5" => "문화",
        "menuTab6" => "오늘마감",
        "menuTab7" => "전체보기",
        _ => return None,
    })
}

fn subcategory_name(id: &str) -> Option<&'static str> {
    Some(match id {
        "gts51" => "전국/서울",
        "gts52" => "인천/경기",
        "gts53" => "대구/부산",
        "gts54" => "대전/광주",
        "gts55" => "강원/제주",
        "gts1" => "쇼핑 스페셜",
        "gts2" => "의류",
        "gts3" => "패션잡화",
        "gts4" => "스포츠/레저",
        "gts5" => "신품",
        "gts6" => "뷰티",
        "gts7" => "생활/주방",
        "gts8" => "홈 인테리어/취미",
        "gts9" => "디지탈/가전",
        "gts10" => "출산/유아동",
        "gts11" => "쇼핑몰 할인권",
        "gts31" => "전체",
        "gts32" => "해외",
        "gts33" => "국내",
        "gts34" => "제주",
        "gts35" => "레저/입장권",
        "gts36" => "숙박",
        "gts41" => "전지역",
        "gts42" => "서울/경기",
        "gts43" => "다른 지역",
        _ => return None,
    })
}

fn parse_deal_url(url: &Url) -> Option<DealId> {
    if url.path() != "/deal.pang" {
        return None;
    }
    let (_, id) = url.query_pairs().find(|(key, _)| key == "coupang")?;
    id.parse().map(DealId).ok()
}

fn is_deal_list_url(url: &Url) -> bool {
    matches!(
        url.path(),
        "/alldeal.pang" | "/promotion/prmt.pang" | "/shopping.pang"
    )
}

pub struct Coupang;

#[async_trait]
impl Scraper for Coupang {
    fn name(&self) -> &'static str {
        "coupang"
    }

    fn default_start_url(&self) -> Url {
        // Hardcoded and always parseable
        Url::parse(&format!("http://{HOST}/")).unwrap()
    }

    fn transform_url(&self, url: &Url) -> Option<Url> {
        if let Some(id) = parse_deal_url(url) {
            return Some(self.deal_url(id));
        }
        if is_deal_list_url(url) {
            // List URLs are crawled as found; their queries select pages
            return Some(url.clone());
        }
        None
    }

    fn deal_url(&self, id: DealId) -> Url {
        Url::parse(&format!("http://{HOST}/deal.pang?coupang={id}")).unwrap()
    }

    fn parse_deal(&self, url: &Url, body: &str) -> Result<Option<Deal>> {
        let deal_id = match parse_deal_url(url) {
            Some(id) => id,
            None => return Ok(None),
        };
        let page = DealPage::new(body);
        if !page.exists() {
            return Ok(None);
        }
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
            expired: page.expired(),
            adult: page.adult(),
        }))
    }

    fn extract_urls(&self, body: &str) -> Vec<String> {
        EXTRACT_URL
            .find_iter(body)
            .map(|found| found.as_str().to_string())
            .collect()
    }
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

    fn exists(&self) -> bool {
        match self.description() {
            Some(description) => !description.contains(INVALID_DEAL_TEXT),
            None => false,
        }
    }

    fn description(&self) -> Option<String> {
        htmlutil::select_only(&self.doc, &TITLE).and_then(htmlutil::first_text)
    }

    fn category(&self) -> Option<String> {
        let active = htmlutil::select_only(&self.doc, &ACTIVE_CATEGORY)?;
        let id = active.value().attr("id")?;
        Some(match category_name(id) {
            Some(name) => name.to_string(),
            None => id.to_string(),
        })
    }

    fn subcategory(&self) -> Option<String> {
        let active = htmlutil::select_only(&self.doc, &ACTIVE_SUBCATEGORY)?;
        let id = active.value().attr("id")?;
        Some(match subcategory_name(id) {
            Some(name) => name.to_string(),
            None => id.to_string(),
        })
    }

    // Local deals can span several regions, all highlighted at once
    fn locale(&self) -> Vec<String> {
        self.doc
            .select(&ACTIVE_LOCALE)
            .filter_map(htmlutil::first_text)
            .filter(|text| !text.is_empty())
            .collect()
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

    // An expired deal swaps the order button for a dead one
    fn expired(&self) -> bool {
        self.doc.select(&EXPIRED_BUTTON).next().is_some()
    }

    fn adult(&self) -> bool {
        self.doc.select(&ADULT_WARNING).next().is_some()
            && self.body.contains(ADULT_WARNING_TEXT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_extract_urls_sweeps_pang_links_from_markup() {
        let body = r#"
            <a href="/deal.pang?coupang=77">deal</a>
            <script>go("http://www.coupang.com/alldeal.pang?page=2");</script>
            <a href="/promotion/prmt.pang#top">promo</a>
            <a href="/event.html">ignored</a>
        "#;
        assert_eq!(
            Coupang.extract_urls(body),
            [
                "/deal.pang?coupang=77",
                "http://www.coupang.com/alldeal.pang?page=2",
                "/promotion/prmt.pang#top",
            ]
        );
    }

    #[test]
    fn test_transform_canonicalizes_deals_and_keeps_lists() {
        assert_eq!(
            Coupang
                .transform_url(&u("http://www.coupang.com/deal.pang?coupang=5&ref=gnb"))
                .map(String::from),
            Some("http://www.coupang.com/deal.pang?coupang=5".to_string())
        );
        // List pages keep their query, it selects the page being listed
        assert_eq!(
            Coupang
                .transform_url(&u("http://www.coupang.com/alldeal.pang?page=3"))
                .map(String::from),
            Some("http://www.coupang.com/alldeal.pang?page=3".to_string())
        );
        assert_eq!(
            Coupang.transform_url(&u("http://www.coupang.com/help.pang")),
            None
        );
    }

    #[test]
    fn test_parse_deal_url_needs_a_numeric_coupang_param() {
        assert_eq!(
            parse_deal_url(&u("http://www.coupang.com/deal.pang?coupang=42")),
            Some(DealId(42))
        );
        assert_eq!(
            parse_deal_url(&u("http://www.coupang.com/deal.pang?page=2")),
            None
        );
        assert_eq!(
            parse_deal_url(&u("http://www.coupang.com/deal.pang?coupang=abc")),
            None
        );
    }

    const LIVE_DEAL: &str = r#"<html>
<head><title>로봇청소기 반값 특가</title></head>
<body>
<ul id="gnbDepth1">
  <li id="menuTab1"><a>오늘의 추천</a></li>
  <li id="menuTab3" class="on"><a>쇼핑</a></li>
</ul>
<ul id="gnbTopSubMenu">
  <li id="gts9" class="on"><a>디지탈/가전</a></li>
</ul>
<div id="localCatePos">
  <span class="on">서울</span>
  <span class="on">경기</span>
</div>
<div class="priceArea">
  <div class="originPrice">정가 <span class="delPrice">300,000원</span></div>
  <span class="salePrice">149,000원</span>
</div>
<span id="buyCount">1,542</span>
</body>
</html>"#;

    #[test]
    fn test_parse_live_deal_page() {
        let url = u("http://www.coupang.com/deal.pang?coupang=321");
        let deal = Coupang.parse_deal(&url, LIVE_DEAL).unwrap().unwrap();

        assert_eq!(deal.site, "coupang");
        assert_eq!(deal.deal_id, DealId(321));
        assert_eq!(deal.description, Some("로봇청소기 반값 특가".to_string()));
        assert_eq!(deal.category, Some("쇼핑".to_string()));
        assert_eq!(deal.subcategory, Some("디지탈/가전".to_string()));
        assert_eq!(deal.locale, ["서울", "경기"]);
        assert_eq!(deal.original_price, Some(300000));
        assert_eq!(deal.discount_price, Some(149000));
        assert_eq!(deal.num_sold, Some(1542));
        assert!(!deal.expired);
        assert!(!deal.adult);
    }

    #[test]
    fn test_unknown_menu_ids_fall_back_to_the_raw_id() {
        let body = r#"<html><head><title>새 코너</title></head><body>
            <ul id="gnbDepth1"><li id="menuTab99" class="on"><a>신규</a></li></ul>
        </body></html>"#;
        let url = u("http://www.coupang.com/deal.pang?coupang=1");
        let deal = Coupang.parse_deal(&url, body).unwrap().unwrap();
        assert_eq!(deal.category, Some("menuTab99".to_string()));
    }

    #[test]
    fn test_invalid_deal_page_is_skipped() {
        let body = "<html><head><title>유효하지 않은 상품입니다</title></head></html>";
        let url = u("http://www.coupang.com/deal.pang?coupang=404");
        assert!(Coupang.parse_deal(&url, body).unwrap().is_none());
    }

    #[test]
    fn test_expired_and_adult_flags() {
        let body = r#"<html><head><title>성인용품 특가</title></head><body>
            <div id="onlyAdult">청소년보호법에 의해 ...</div>
            <a id="non_click_order_button">판매 종료</a>
        </body></html>"#;
        let url = u("http://www.coupang.com/deal.pang?coupang=9");
        let deal = Coupang.parse_deal(&url, body).unwrap().unwrap();
        assert!(deal.expired);
        assert!(deal.adult);
    }
}
