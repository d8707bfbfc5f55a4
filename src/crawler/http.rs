// src/crawler/http.rs
// =============================================================================
// This module makes the actual HTTP requests for the crawler.
//
// Key functionality:
// - One GET per call: no retries, no special-casing of status codes
// - Configurable timeout (0 = wait forever) and User-Agent header
// - Non-2xx responses come back as errors; the caller decides what to do
//
// Rust concepts:
// - async/await: For network I/O that doesn't block other tasks
// - Result<T, E>: For error handling with anyhow context
// - Clone: The Getter is shared between the crawler and the option workers
// =============================================================================

use anyhow::{bail, Context, Result};
use reqwest::header::USER_AGENT;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

// The User-Agent presented to the deal sites
//
// The sites serve the desktop markup our selectors expect to this string;
// don't change it without re-checking the parsers.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/4.0 (compatible; MSIE 8.0; Windows NT 6.0)";

// Fetches single pages over HTTP
//
// Cloning is cheap: the inner reqwest Client is an Arc around a
// connection pool, so clones share connections.
#[derive(Debug, Clone)]
pub struct Getter {
    client: Client,
    user_agent: String,
}

impl Getter {
    // Creates a Getter with the given User-Agent and request timeout
    //
    // Parameters:
    //   user_agent: Header value to send (empty string = send no header)
    //   timeout: Total time allowed per request (zero = no timeout)
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let mut builder = Client::builder();
        if !timeout.is_zero() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("building HTTP client")?;
        Ok(Self {
            client,
            user_agent: user_agent.to_string(),
        })
    }

    // Fetches one URL and returns the response body
    //
    // Returns an error for network failures, timeouts, and non-2xx
    // responses alike. Never retries.
    pub async fn get_body(&self, url: &Url) -> Result<String> {
        debug!("GET {url}");

        let mut request = self.client.get(url.clone());
        if !self.user_agent.is_empty() {
            request = request.header(USER_AGENT, self.user_agent.as_str());
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("GET {url}: HTTP {status}");
        }

        response
            .text()
            .await
            .with_context(|| format!("reading body of {url}"))
    }
}
