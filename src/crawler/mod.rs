// src/crawler/mod.rs
// =============================================================================
// This module implements breadth-first website crawling with bounded
// concurrency.
//
// How it works:
// 1. The seed URL is marked visited and a fetch task is spawned for it
// 2. Each fetch task waits for a semaphore permit, fetches its page, and
//    reports a FetchResult to the aggregation loop
// 3. The loop expands each result: links not yet visited are marked and get
//    their own fetch tasks, one depth level lower
// 4. The loop exits once every dispatched task has reported back
//
// All bookkeeping (the visited set and the outstanding-task counter) lives
// inside the aggregation loop. Tasks only fetch and report; they never touch
// shared state, so the crawl needs no locks at all.
//
// Submodules:
// - http: the Getter that performs single GET requests
// - fetcher: the Fetcher seam and the link-extracting PageFetcher
//
// Rust concepts:
// - tokio::spawn: One lightweight task per in-flight fetch
// - Semaphore: Caps simultaneous network requests, not task count
// - mpsc channels: Fan many task results into the single loop
// =============================================================================

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, warn};
use url::Url;

use crate::scrape::Scraper;

mod fetcher;
mod http;

// Re-export the pieces callers wire together
pub use fetcher::{Fetcher, PageFetcher};
pub use http::{Getter, DEFAULT_USER_AGENT};

// What one fetch task reports back
//
// Exactly one FetchResult is produced per dispatched URL, whether the fetch
// worked or not. Downstream consumers read url and body; the other fields
// are crawl bookkeeping and stay inside the crate.
#[derive(Debug)]
pub struct FetchResult {
    pub url: Url,
    pub body: String,
    pub(crate) urls: Vec<Url>,
    pub(crate) depth: usize,
    pub(crate) error: Option<anyhow::Error>,
}

// Crawls one site breadth-first
//
// max_depth counts additional link hops from the seed: 0 fetches only the
// seed page, 1 also fetches the pages it links to, and so on.
pub struct Crawler {
    fetcher: Arc<dyn Fetcher>,
    scraper: Arc<dyn Scraper>,
    pub max_parallel: usize,
    pub max_depth: usize,
}

impl Crawler {
    // Creates a crawler with default depth and parallelism limits
    pub fn new(fetcher: Arc<dyn Fetcher>, scraper: Arc<dyn Scraper>) -> Self {
        Self {
            fetcher,
            scraper,
            max_parallel: 10,
            max_depth: 5,
        }
    }

    // Crawls breadth-first from seed, sending every successfully fetched
    // page to output
    //
    // Returns once the whole reachable graph (within max_depth) has been
    // fetched and aggregated. The output sender is dropped on return, which
    // closes the channel - that close is the one and only "crawl finished"
    // signal the pipeline gets, so nothing else may hold a sender for it.
    pub async fn run(&self, seed: Url, output: mpsc::Sender<FetchResult>) {
        // Floor of one permit: zero would leave the first fetch waiting forever
        let semaphore = Arc::new(Semaphore::new(self.max_parallel.max(1)));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<FetchResult>();

        // Spawns one fetch task. Spawning is never blocked; only the fetch
        // inside the task waits for a semaphore permit, so the frontier can
        // grow while at most max_parallel requests are on the wire.
        let dispatch = |url: Url, depth: usize| {
            let fetcher = Arc::clone(&self.fetcher);
            let scraper = Arc::clone(&self.scraper);
            let semaphore = Arc::clone(&semaphore);
            let results = result_tx.clone();
            tokio::spawn(async move {
                let permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    // The semaphore is never closed while a crawl runs
                    Err(_) => return,
                };
                let outcome = fetcher.fetch(&url).await;
                // Give the network slot back before reporting, so a slow
                // aggregation loop can't starve waiting fetch tasks
                drop(permit);

                let result = match outcome {
                    Ok((body, urls)) => FetchResult {
                        urls: transform_urls(scraper.as_ref(), urls),
                        url,
                        body,
                        depth,
                        error: None,
                    },
                    Err(error) => FetchResult {
                        url,
                        body: String::new(),
                        urls: Vec::new(),
                        depth,
                        error: Some(error),
                    },
                };
                // Fails only if the whole crawl was torn down already
                let _ = results.send(result);
            });
        };

        let mut visited: HashSet<String> = HashSet::new();
        let mut outstanding: usize = 1;

        // The seed enters visited before its task exists; every URL follows
        // that same order, which is what makes double-fetches impossible
        visited.insert(seed.to_string());
        dispatch(seed, self.max_depth);

        while outstanding > 0 {
            let mut result = match result_rx.recv().await {
                Some(result) => result,
                // No senders left; can't happen while result_tx is alive here
                None => break,
            };
            outstanding -= 1;

            // Expand this page's links one level deeper
            if result.depth > 0 && result.error.is_none() {
                for url in std::mem::take(&mut result.urls) {
                    if visited.insert(url.to_string()) {
                        dispatch(url, result.depth - 1);
                        outstanding += 1;
                    }
                }
            }

            match result.error {
                // A failed page is logged and dropped: not forwarded, not
                // expanded. The rest of the crawl carries on.
                Some(ref error) => warn!("fetch failed for {}: {error:#}", result.url),
                None => {
                    if output.send(result).await.is_err() {
                        // Receiver went away; keep aggregating so every
                        // dispatched task is still accounted for
                        debug!("output channel closed, discarding result");
                    }
                }
            }
        }

        debug!("crawl finished, {} URLs visited", visited.len());
    }
}

// Runs discovered URLs through the site's canonicalizer
//
// None from transform_url prunes the URL from the frontier entirely.
fn transform_urls(scraper: &dyn Scraper, urls: Vec<Url>) -> Vec<Url> {
    urls.iter()
        .filter_map(|url| scraper.transform_url(url))
        .collect()
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. Why a Semaphore instead of a worker pool?
//    - Spawning a task is cheap; holding a socket open is not
//    - Every discovered URL gets its task immediately, but only
//      max_parallel of them may be inside fetch() at once
//    - acquire_owned() gives a permit that travels into the task and
//      frees its slot automatically when dropped
//
// 2. Why is the result channel unbounded?
//    - A fetch task must always be able to report and finish
//    - With a bounded channel, tasks could block on send while the loop
//      blocks dispatching, and the crawl would stall
//    - The loop is the only consumer, so arrivals pile up briefly at worst
//
// 3. Why no Mutex around visited?
//    - Only the aggregation loop reads or writes it
//    - Tasks communicate purely through the channel, so there is nothing
//      to lock - single ownership instead of synchronization
//
// 4. What is std::mem::take?
//    - Moves a value out, leaving Default::default() behind
//    - Lets us consume result.urls (owned) and still forward result itself
//
// 5. Why count outstanding instead of joining task handles?
//    - New tasks appear while old ones finish; a join list would be a
//      moving target
//    - One integer, +1 per dispatch and -1 per report, pins down exactly
//      when the crawl is over: when it reaches zero
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrape::{Deal, DealId};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn u(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    // A configurable stand-in site
    struct TestSite {
        prune_marked: bool,
        strip_queries: bool,
    }

    impl TestSite {
        fn passthrough() -> Self {
            Self {
                prune_marked: false,
                strip_queries: false,
            }
        }
    }

    #[async_trait]
    impl Scraper for TestSite {
        fn name(&self) -> &'static str {
            "testsite"
        }
        fn default_start_url(&self) -> Url {
            u("http://h.test/")
        }
        fn transform_url(&self, url: &Url) -> Option<Url> {
            if self.prune_marked && url.path().contains("skip") {
                return None;
            }
            let mut url = url.clone();
            if self.strip_queries {
                url.set_query(None);
            }
            Some(url)
        }
        fn deal_url(&self, id: DealId) -> Url {
            u(&format!("http://h.test/deal/{id}"))
        }
        fn parse_deal(&self, _url: &Url, _body: &str) -> Result<Option<Deal>> {
            Ok(None)
        }
    }

    // An in-memory link graph standing in for a website
    struct FakeFetcher {
        pages: HashMap<String, Vec<String>>,
        failing: Vec<String>,
        fetched: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    fn fake(pages: &[(&str, &[&str])]) -> FakeFetcher {
        let pages = pages
            .iter()
            .map(|(url, links)| {
                let links = links.iter().map(|link| link.to_string()).collect();
                (url.to_string(), links)
            })
            .collect();
        FakeFetcher {
            pages,
            failing: Vec::new(),
            fetched: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    impl FakeFetcher {
        fn failing(mut self, url: &str) -> Self {
            self.failing.push(url.to_string());
            self
        }

        fn fetched(&self) -> Vec<String> {
            self.fetched.lock().unwrap().clone()
        }

        fn fetch_count(&self) -> usize {
            self.fetched.lock().unwrap().len()
        }

        fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetcher for FakeFetcher {
        async fn fetch(&self, url: &Url) -> Result<(String, Vec<Url>)> {
            let key = url.to_string();
            self.fetched.lock().unwrap().push(key.clone());

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(&key) {
                anyhow::bail!("fetch of {key} failed");
            }

            // Like the real fetcher, only same-host links survive
            let links = self
                .pages
                .get(&key)
                .map(|links| {
                    links
                        .iter()
                        .map(|link| u(link))
                        .filter(|link| link.host_str() == url.host_str())
                        .collect()
                })
                .unwrap_or_default();
            Ok((format!("page at {key}"), links))
        }
    }

    fn crawler_with(
        fetcher: FakeFetcher,
        site: TestSite,
        max_parallel: usize,
        max_depth: usize,
    ) -> (Crawler, Arc<FakeFetcher>) {
        let fetcher = Arc::new(fetcher);
        let mut crawler = Crawler::new(fetcher.clone() as Arc<dyn Fetcher>, Arc::new(site));
        crawler.max_parallel = max_parallel;
        crawler.max_depth = max_depth;
        (crawler, fetcher)
    }

    fn crawler(
        fetcher: FakeFetcher,
        max_parallel: usize,
        max_depth: usize,
    ) -> (Crawler, Arc<FakeFetcher>) {
        crawler_with(fetcher, TestSite::passthrough(), max_parallel, max_depth)
    }

    // Runs the crawl and the output consumer side by side; a small output
    // buffer means the crawler also gets exercised under backpressure
    async fn run_and_collect(crawler: &Crawler, seed: &str) -> Vec<FetchResult> {
        let (tx, mut rx) = mpsc::channel(1);
        let collect = async {
            let mut results = Vec::new();
            while let Some(result) = rx.recv().await {
                results.push(result);
            }
            results
        };
        let ((), results) = tokio::join!(crawler.run(u(seed), tx), collect);
        results
    }

    fn forwarded_urls(results: &[FetchResult]) -> Vec<String> {
        let mut urls: Vec<String> = results.iter().map(|r| r.url.to_string()).collect();
        urls.sort();
        urls
    }

    #[tokio::test]
    async fn test_crawl_follows_links_within_depth_and_host() {
        let fetcher = fake(&[
            ("http://h.test/a", &["http://h.test/b", "http://h.test/c"]),
            ("http://h.test/b", &[]),
            ("http://h.test/c", &["http://h.test/d", "http://other.test/e"]),
            ("http://h.test/d", &["http://h.test/f"]),
        ]);
        let (crawler, fetcher) = crawler(fetcher, 1, 2);
        let results = run_and_collect(&crawler, "http://h.test/a").await;

        assert_eq!(
            forwarded_urls(&results),
            [
                "http://h.test/a",
                "http://h.test/b",
                "http://h.test/c",
                "http://h.test/d",
            ]
        );
        // d sits on the depth boundary: fetched and forwarded, but its link
        // to f is never followed; e lives on another host
        assert_eq!(fetcher.fetch_count(), 4);
        assert!(!fetcher.fetched().contains(&"http://h.test/f".to_string()));
    }

    #[tokio::test]
    async fn test_diamond_graph_fetches_shared_page_once() {
        let fetcher = fake(&[
            ("http://h.test/a", &["http://h.test/b", "http://h.test/c"]),
            ("http://h.test/b", &["http://h.test/d"]),
            ("http://h.test/c", &["http://h.test/d"]),
            ("http://h.test/d", &[]),
        ]);
        let (crawler, fetcher) = crawler(fetcher, 4, 3);
        let results = run_and_collect(&crawler, "http://h.test/a").await;

        assert_eq!(results.len(), 4);
        let fetched = fetcher.fetched();
        assert_eq!(fetched.len(), 4);
        assert_eq!(fetched.iter().filter(|url| url.ends_with("/d")).count(), 1);
    }

    #[tokio::test]
    async fn test_concurrency_stays_under_cap() {
        let seed = "http://h.test/a".to_string();
        let leaves: Vec<String> = (0..12).map(|i| format!("http://h.test/p{i}")).collect();
        let mut pages = HashMap::new();
        pages.insert(seed.clone(), leaves.clone());
        for leaf in &leaves {
            pages.insert(leaf.clone(), Vec::new());
        }
        let fetcher = FakeFetcher {
            pages,
            failing: Vec::new(),
            fetched: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        };
        let (crawler, fetcher) = crawler(fetcher, 3, 1);
        let results = run_and_collect(&crawler, &seed).await;

        assert_eq!(results.len(), 13);
        assert!(fetcher.max_in_flight() <= 3);
    }

    #[tokio::test]
    async fn test_a_zero_cap_crawls_one_page_at_a_time() {
        let fetcher = fake(&[
            ("http://h.test/a", &["http://h.test/b", "http://h.test/c"]),
            ("http://h.test/b", &[]),
            ("http://h.test/c", &[]),
        ]);
        let (crawler, fetcher) = crawler(fetcher, 0, 1);
        let results = run_and_collect(&crawler, "http://h.test/a").await;

        // A cap of zero would admit no fetch at all; it is raised to one,
        // so the crawl completes strictly serially
        assert_eq!(
            forwarded_urls(&results),
            ["http://h.test/a", "http://h.test/b", "http://h.test/c"]
        );
        assert_eq!(fetcher.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_depth_zero_fetches_only_the_seed() {
        let fetcher = fake(&[
            ("http://h.test/a", &["http://h.test/b"]),
            ("http://h.test/b", &[]),
        ]);
        let (crawler, fetcher) = crawler(fetcher, 2, 0);
        let results = run_and_collect(&crawler, "http://h.test/a").await;

        assert_eq!(forwarded_urls(&results), ["http://h.test/a"]);
        assert_eq!(fetcher.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_seed_fetch_error_produces_nothing() {
        let fetcher =
            fake(&[("http://h.test/a", &["http://h.test/b"])]).failing("http://h.test/a");
        let (crawler, fetcher) = crawler(fetcher, 2, 2);
        let results = run_and_collect(&crawler, "http://h.test/a").await;

        assert!(results.is_empty());
        assert_eq!(fetcher.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_one_failed_fetch_spares_its_siblings() {
        let fetcher = fake(&[
            ("http://h.test/a", &["http://h.test/b", "http://h.test/c"]),
            ("http://h.test/b", &["http://h.test/x"]),
            ("http://h.test/c", &["http://h.test/d"]),
            ("http://h.test/d", &[]),
        ])
        .failing("http://h.test/b");
        let (crawler, fetcher) = crawler(fetcher, 2, 2);
        let results = run_and_collect(&crawler, "http://h.test/a").await;

        assert_eq!(
            forwarded_urls(&results),
            ["http://h.test/a", "http://h.test/c", "http://h.test/d"]
        );
        // b was tried exactly once; its subtree stays unexplored
        assert_eq!(fetcher.fetch_count(), 4);
        assert!(!fetcher.fetched().contains(&"http://h.test/x".to_string()));
    }

    #[tokio::test]
    async fn test_transform_can_prune_the_frontier() {
        let fetcher = fake(&[
            ("http://h.test/a", &["http://h.test/b", "http://h.test/skipthis"]),
            ("http://h.test/b", &[]),
        ]);
        let site = TestSite {
            prune_marked: true,
            strip_queries: false,
        };
        let (crawler, fetcher) = crawler_with(fetcher, site, 2, 1);
        let results = run_and_collect(&crawler, "http://h.test/a").await;

        assert_eq!(forwarded_urls(&results), ["http://h.test/a", "http://h.test/b"]);
        assert!(!fetcher.fetched().contains(&"http://h.test/skipthis".to_string()));
    }

    #[tokio::test]
    async fn test_transform_canonicalizes_before_dedup() {
        let fetcher = fake(&[
            (
                "http://h.test/a",
                &["http://h.test/d?ref=1", "http://h.test/d?ref=2"],
            ),
            ("http://h.test/d", &[]),
        ]);
        let site = TestSite {
            prune_marked: false,
            strip_queries: true,
        };
        let (crawler, fetcher) = crawler_with(fetcher, site, 2, 1);
        let results = run_and_collect(&crawler, "http://h.test/a").await;

        // Both query variants collapse to one canonical URL, fetched once
        assert_eq!(forwarded_urls(&results), ["http://h.test/a", "http://h.test/d"]);
        assert_eq!(fetcher.fetch_count(), 2);
    }
}
