// src/pipeline.rs
// =============================================================================
// This module wires the crawler into a staged processing pipeline.
//
// How it works:
// 1. The crawler feeds fetched pages into the record stage
// 2. The record stage parses each page; pages that are deal pages become
//    Deal records, everything else is skipped
// 3. A pool of option workers picks up deal ids and fetches each deal's
//    option listings concurrently
// 4. The option consumer and the print sink serialize records to the
//    snapshot store and to stdout
//
// Every stage talks to the next over a bounded channel, so a slow stage
// backpressures the ones before it instead of buffering without limit.
//
// Shutdown is a cascade of channel closes: the crawler finishing closes the
// result channel, the record stage finishing closes the deal channel, the
// last worker finishing closes the option channel, and so on down to the
// printer. run() joins the stages in that same order.
//
// Rust concepts:
// - tokio::sync::Mutex: Lets the worker pool share one Receiver
// - futures::future::join_all: Waits for the whole worker pool at once
// - Drop-driven channel close: Senders are dropped as soon as no stage
//   needs them, otherwise the cascade would never start
// =============================================================================

use anyhow::{Context, Result};
use futures::future::join_all;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::crawler::{Crawler, FetchResult, Getter, PageFetcher, DEFAULT_USER_AGENT};
use crate::scrape::{DealId, DealOption, Scraper, SnapshotStore};

// Settings for one crawl run
pub struct CrawlOptions {
    // Where to start; the site's default front page when None
    pub start_url: Option<String>,
    pub max_depth: usize,
    pub max_parallel: usize,
    pub timeout: Duration,
    // Fetch per-deal option listings after each deal page
    pub fetch_options: bool,
    // Suppress stdout printing (snapshots are still written)
    pub quiet: bool,
}

// Crawls the site and runs every fetched page through the pipeline
//
// Returns after the crawl has finished AND every downstream stage has
// drained, so all discovered records have been printed and stored.
pub async fn run(
    scraper: Arc<dyn Scraper>,
    store: Option<Arc<SnapshotStore>>,
    options: &CrawlOptions,
) -> Result<()> {
    let seed = match &options.start_url {
        Some(raw) => Url::parse(raw).with_context(|| format!("invalid start URL {raw:?}"))?,
        None => scraper.default_start_url(),
    };

    let getter = Getter::new(DEFAULT_USER_AGENT, options.timeout)?;
    let fetcher = Arc::new(PageFetcher::new(getter.clone(), scraper.clone()));
    let mut crawler = Crawler::new(fetcher, scraper.clone());
    crawler.max_parallel = options.max_parallel;
    crawler.max_depth = options.max_depth;

    let capacity = options.max_parallel.max(1);
    let (result_tx, result_rx) = mpsc::channel::<FetchResult>(capacity);
    let (deal_tx, deal_rx) = mpsc::channel::<DealId>(capacity);
    let (option_tx, option_rx) = mpsc::channel::<Vec<DealOption>>(capacity);
    let (print_tx, print_rx) = mpsc::channel::<String>(capacity);

    info!("starting {} crawl at {seed}", scraper.name());

    let printer = tokio::spawn(print_sink(print_rx));

    // The workers share one receiver; each recv hands the next deal id to
    // whichever worker is free
    let deal_rx = Arc::new(Mutex::new(deal_rx));
    let workers: Vec<_> = (0..capacity)
        .map(|_| {
            tokio::spawn(option_worker(
                Arc::clone(&deal_rx),
                getter.clone(),
                scraper.clone(),
                option_tx.clone(),
                options.fetch_options,
            ))
        })
        .collect();
    // Workers hold the only remaining option senders
    drop(option_tx);

    let option_consumer = tokio::spawn(consume_options(
        option_rx,
        print_tx.clone(),
        store.clone(),
        options.quiet,
    ));

    let record_stage = tokio::spawn(consume_crawl_results(
        result_rx,
        scraper.clone(),
        deal_tx,
        print_tx.clone(),
        store.clone(),
        options.quiet,
    ));
    drop(print_tx);

    // Blocks until the whole site (within max_depth) has been fetched
    crawler.run(seed, result_tx).await;

    // Join in channel order so each stage has drained before the next
    // one's channel closes under it
    record_stage.await?;
    for worker in join_all(workers).await {
        worker?;
    }
    option_consumer.await?;
    printer.await?;

    debug!("pipeline drained");
    Ok(())
}

// Stage 1: turn fetched pages into deal records
//
// Parse failures are logged and skipped; one broken page must not end a
// crawl that is visiting hundreds of them.
async fn consume_crawl_results(
    mut results: mpsc::Receiver<FetchResult>,
    scraper: Arc<dyn Scraper>,
    deals: mpsc::Sender<DealId>,
    print: mpsc::Sender<String>,
    store: Option<Arc<SnapshotStore>>,
    quiet: bool,
) {
    while let Some(result) = results.recv().await {
        let deal = match scraper.parse_deal(&result.url, &result.body) {
            Ok(Some(deal)) => deal,
            // Not a deal page, nothing to extract
            Ok(None) => continue,
            Err(error) => {
                warn!("could not parse {}: {error:#}", result.url);
                continue;
            }
        };
        debug!("found deal {} on {}", deal.deal_id, result.url);

        if !quiet {
            match serde_json::to_string(&deal) {
                Ok(line) => {
                    if print.send(line).await.is_err() {
                        return;
                    }
                }
                Err(error) => fatal(error.into()),
            }
        }
        if let Some(store) = &store {
            if let Err(error) = store.store_deal(&deal).await {
                fatal(error);
            }
        }
        if deals.send(deal.deal_id).await.is_err() {
            return;
        }
    }
}

// Stage 2: one worker of the pool that fetches option listings
async fn option_worker(
    deals: Arc<Mutex<mpsc::Receiver<DealId>>>,
    getter: Getter,
    scraper: Arc<dyn Scraper>,
    options: mpsc::Sender<Vec<DealOption>>,
    fetch_options: bool,
) {
    loop {
        // Hold the lock only while waiting for the next id, never during
        // the fetch, so the pool actually works in parallel
        let deal_id = {
            let mut deals = deals.lock().await;
            deals.recv().await
        };
        let deal_id = match deal_id {
            Some(id) => id,
            None => return,
        };
        // Ids must be drained even with option fetching off, or the
        // record stage would block on a full deal channel
        if !fetch_options {
            continue;
        }
        let batch = scraper.fetch_deal_options(&getter, deal_id).await;
        if !batch.is_empty() && options.send(batch).await.is_err() {
            return;
        }
    }
}

// Stage 3: print and store option records
async fn consume_options(
    mut batches: mpsc::Receiver<Vec<DealOption>>,
    print: mpsc::Sender<String>,
    store: Option<Arc<SnapshotStore>>,
    quiet: bool,
) {
    while let Some(batch) = batches.recv().await {
        for option in batch {
            if !quiet {
                match serde_json::to_string(&option) {
                    Ok(line) => {
                        if print.send(line).await.is_err() {
                            return;
                        }
                    }
                    Err(error) => fatal(error.into()),
                }
            }
            if let Some(store) = &store {
                if let Err(error) = store.store_option(&option).await {
                    fatal(error);
                }
            }
        }
    }
}

// Stage 4: the one place that writes to stdout
async fn print_sink(mut lines: mpsc::Receiver<String>) {
    while let Some(line) = lines.recv().await {
        println!("{line}");
    }
}

// A record accepted for output must never vanish silently; when a sink
// cannot take it, the run stops right where the write failed
fn fatal(error: anyhow::Error) -> ! {
    error!("{error:#}");
    process::exit(2);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrape::{Deal, OptionId};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // A site whose deal pages live under /deal/{id} and whose option
    // listings are plain JSON id arrays under /options/{id}
    struct FakeSite {
        base: Url,
    }

    #[async_trait]
    impl Scraper for FakeSite {
        fn name(&self) -> &'static str {
            "fakesite"
        }
        fn default_start_url(&self) -> Url {
            self.base.clone()
        }
        fn transform_url(&self, url: &Url) -> Option<Url> {
            Some(url.clone())
        }
        fn deal_url(&self, id: DealId) -> Url {
            self.base.join(&format!("deal/{id}")).unwrap()
        }
        fn parse_deal(&self, url: &Url, body: &str) -> Result<Option<Deal>> {
            let id = match url.path().strip_prefix("/deal/") {
                Some(rest) => match rest.parse::<i64>() {
                    Ok(id) => id,
                    Err(_) => return Ok(None),
                },
                None => return Ok(None),
            };
            Ok(Some(Deal {
                site: "fakesite".to_string(),
                deal_id: DealId(id),
                description: Some(body.trim().to_string()),
                category: None,
                subcategory: None,
                locale: Vec::new(),
                original_price: None,
                discount_price: None,
                num_sold: None,
                expired: false,
                adult: false,
            }))
        }
        async fn fetch_deal_options(&self, getter: &Getter, id: DealId) -> Vec<DealOption> {
            let url = self.base.join(&format!("options/{id}")).unwrap();
            let body = match getter.get_body(&url).await {
                Ok(body) => body,
                Err(_) => return Vec::new(),
            };
            let ids: Vec<i64> = match serde_json::from_str(&body) {
                Ok(ids) => ids,
                Err(_) => return Vec::new(),
            };
            ids.into_iter()
                .map(|option_id| DealOption {
                    site: "fakesite".to_string(),
                    deal_id: id,
                    option_id: OptionId(option_id),
                    description: format!("option {option_id}"),
                    price: 1000,
                    num_available: 5,
                    num_sold: 1,
                })
                .collect()
        }
    }

    async fn page(server: &MockServer, at: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
            .mount(server)
            .await;
    }

    async fn fake_shop() -> MockServer {
        let server = MockServer::start().await;
        page(
            &server,
            "/",
            r#"<html><body>
                <a href="/deal/1">one</a>
                <a href="/deal/2">two</a>
                <a href="/about">about</a>
            </body></html>"#,
        )
        .await;
        page(&server, "/deal/1", "first deal").await;
        page(&server, "/deal/2", "second deal").await;
        page(&server, "/about", "nothing to see").await;
        page(&server, "/options/1", "[11, 12]").await;
        page(&server, "/options/2", "[21]").await;
        server
    }

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("deal-scout-{tag}-{}", process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[tokio::test]
    async fn test_pipeline_stores_deals_and_their_options() {
        let server = fake_shop().await;
        let base = Url::parse(&server.uri()).unwrap();
        let scraper: Arc<dyn Scraper> = Arc::new(FakeSite { base });

        let dir = scratch_dir("pipeline-full");
        let store = Arc::new(SnapshotStore::open(&dir).await.unwrap());

        let options = CrawlOptions {
            start_url: None,
            max_depth: 1,
            max_parallel: 2,
            timeout: Duration::from_secs(5),
            fetch_options: true,
            quiet: true,
        };
        // run() returning at all shows the shutdown cascade completed
        run(scraper, Some(store.clone()), &options).await.unwrap();

        let day = chrono::Local::now().date_naive();
        let deals = store.deals_for_day(day).await.unwrap();
        assert_eq!(deals.len(), 2);
        assert_eq!(deals[0].deal_id, DealId(1));
        assert_eq!(deals[0].description, Some("first deal".to_string()));

        let mut option_ids: Vec<i64> = store
            .options_for_day(day)
            .await
            .unwrap()
            .iter()
            .map(|option| option.option_id.0)
            .collect();
        option_ids.sort();
        assert_eq!(option_ids, [11, 12, 21]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_pipeline_can_skip_option_fetching() {
        let server = fake_shop().await;
        let base = Url::parse(&server.uri()).unwrap();
        let scraper: Arc<dyn Scraper> = Arc::new(FakeSite { base });

        let dir = scratch_dir("pipeline-skip");
        let store = Arc::new(SnapshotStore::open(&dir).await.unwrap());

        let options = CrawlOptions {
            start_url: Some(server.uri()),
            max_depth: 1,
            max_parallel: 2,
            timeout: Duration::from_secs(5),
            fetch_options: false,
            quiet: true,
        };
        run(scraper, Some(store.clone()), &options).await.unwrap();

        let day = chrono::Local::now().date_naive();
        assert_eq!(store.deals_for_day(day).await.unwrap().len(), 2);
        assert!(store.options_for_day(day).await.unwrap().is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_pipeline_rejects_a_bad_start_url() {
        let scraper: Arc<dyn Scraper> = Arc::new(FakeSite {
            base: Url::parse("http://unused.test/").unwrap(),
        });
        let options = CrawlOptions {
            start_url: Some("not a url at all".to_string()),
            max_depth: 1,
            max_parallel: 2,
            timeout: Duration::from_secs(5),
            fetch_options: false,
            quiet: true,
        };
        let error = run(scraper, None, &options).await.unwrap_err();
        assert!(error.to_string().contains("invalid start URL"));
    }
}
