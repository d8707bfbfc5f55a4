// src/scrape/ticketmonster/options.rs
// =============================================================================
// Fetches a deal's purchase options from the getOptionList JSON endpoint.
//
// Options form a tree: a concert deal might offer dates at the first level
// and seat grades under each date. The endpoint returns one level at a
// time, keyed by the chain of ancestor option keys (the opt_key). Each raw
// option announces its own tree height through its "opts" field: the number
// of '|' separators in it is the depth at which items become purchasable.
//
// We walk that tree breadth-first. Items below their declared height are
// expanded by fetching the next level with their key chain; items at the
// height are terminal and become DealOption records whose description is
// the full key chain, for example "3월 15일|R석|".
//
// The declared height comes from the network, so it is clamped. Fetch and
// decode errors at any level are logged and that branch is skipped; an
// unreadable branch must not cost us the rest of the tree.
//
// Rust concepts:
// - serde untagged enums: One decode for both body shapes the endpoint
//   serves (object keyed by id, or plain array)
// - VecDeque: The BFS frontier
// =============================================================================

use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use tracing::warn;
use url::Url;

use super::urls;
use crate::crawler::Getter;
use crate::scrape::{DealId, DealOption, OptionId};

// Upper bound on the expansion depth a listing may request
const MAX_OPTION_DEPTH: usize = 8;

// The endpoint serializes keys as strings or bare numbers, varying by deal
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FuzzyKey {
    Text(String),
    Number(i64),
}

impl FuzzyKey {
    fn as_string(&self) -> String {
        match self {
            FuzzyKey::Text(text) => text.clone(),
            FuzzyKey::Number(number) => number.to_string(),
        }
    }
}

// One entry of a getOptionList response; unknown fields are ignored and
// absent ones default to zero, matching how sparsely the endpoint fills
// them in practice
#[derive(Debug, Deserialize)]
struct RawOption {
    #[serde(default)]
    deal_buy_count: i64,
    #[serde(default)]
    deal_srl: i64,
    #[serde(default)]
    key: Option<FuzzyKey>,
    #[serde(default)]
    opts: String,
    #[serde(default)]
    price: i64,
    #[serde(default)]
    remain_count: i64,
}

// The endpoint answers with either {"<id>": {...}, ...} or [{...}, ...]
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OptionListing {
    Map(HashMap<String, RawOption>),
    List(Vec<RawOption>),
}

impl OptionListing {
    fn into_options(self) -> Vec<RawOption> {
        match self {
            OptionListing::Map(map) => map.into_values().collect(),
            OptionListing::List(list) => list,
        }
    }
}

// A raw option queued for expansion or emission
struct PendingOption {
    raw: RawOption,
    depth: usize,
    max_depth: usize,
    // This option's full key chain, every segment '|'-terminated
    opt_key: String,
}

fn pending_from(options: Vec<RawOption>, depth: usize, prefix: &str) -> Vec<PendingOption> {
    options
        .into_iter()
        .map(|raw| {
            let key = raw.key.as_ref().map(FuzzyKey::as_string).unwrap_or_default();
            let max_depth = raw.opts.matches('|').count().min(MAX_OPTION_DEPTH);
            PendingOption {
                opt_key: format!("{prefix}{key}|"),
                depth,
                max_depth,
                raw,
            }
        })
        .collect()
}

// Fetches one level of the option tree under the given key chain
async fn fetch_level(
    getter: &Getter,
    base: &Url,
    deal_id: DealId,
    depth: usize,
    opt_key: &str,
) -> Vec<PendingOption> {
    let url = urls::option_list_url(base, deal_id, depth, opt_key);
    let body = match getter.get_body(&url).await {
        Ok(body) => body,
        Err(error) => {
            warn!("options for deal {deal_id}: {error:#}");
            return Vec::new();
        }
    };
    let listing: OptionListing = match serde_json::from_str(&body) {
        Ok(listing) => listing,
        Err(error) => {
            warn!("options for deal {deal_id}: bad listing at {url}: {error}");
            return Vec::new();
        }
    };
    pending_from(listing.into_options(), depth, opt_key)
}

// Walks the whole option tree of one deal and returns its terminal options
pub async fn fetch_deal_options(getter: &Getter, deal_id: DealId) -> Vec<DealOption> {
    fetch_from(getter, &urls::base_url(), deal_id).await
}

async fn fetch_from(getter: &Getter, base: &Url, deal_id: DealId) -> Vec<DealOption> {
    let mut options = Vec::new();
    let mut queue: VecDeque<PendingOption> =
        fetch_level(getter, base, deal_id, 0, "").await.into();

    while let Some(pending) = queue.pop_front() {
        if pending.depth < pending.max_depth {
            let children =
                fetch_level(getter, base, deal_id, pending.depth + 1, &pending.opt_key).await;
            queue.extend(children);
        } else {
            options.push(DealOption {
                site: super::NAME.to_string(),
                deal_id,
                option_id: OptionId(pending.raw.deal_srl),
                description: pending.opt_key,
                price: pending.raw.price,
                num_available: pending.raw.remain_count,
                num_sold: pending.raw.deal_buy_count,
            });
        }
    }
    options
}
