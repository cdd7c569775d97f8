//! Interchangeable content backends and the "first success wins" combinator.
//!
//! Each backend may support page fetching, web search, or both. The resolver
//! keeps one ordered list per capability and walks it with [`first_success`]:
//! the first backend returning non-empty content wins, everything else
//! (quota exhaustion, transport or parse errors, empty answers) hands control
//! to the next backend.

use crate::errors::AppError;
use crate::models::SearchResult;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Maximum number of organic results parsed from a search-engine HTML page.
pub const MAX_HTML_RESULTS: usize = 15;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Uniform result of one backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendOutcome<T> {
    Found(T),
    /// Call succeeded but produced nothing usable.
    Empty,
    /// Payment-required / quota signal. Never aborts the chain.
    QuotaExceeded,
    /// Transport or parse error.
    Failed(String),
    /// The backend does not offer this capability.
    Unsupported,
}

impl BackendOutcome<String> {
    pub fn from_text(text: String) -> Self {
        if text.trim().is_empty() {
            BackendOutcome::Empty
        } else {
            BackendOutcome::Found(text)
        }
    }
}

impl BackendOutcome<Vec<SearchResult>> {
    pub fn from_results(results: Vec<SearchResult>) -> Self {
        if results.is_empty() {
            BackendOutcome::Empty
        } else {
            BackendOutcome::Found(results)
        }
    }
}

impl<T> BackendOutcome<T> {
    /// The error a failed call is reported as; `None` unless quota or transport failed.
    pub fn failure(&self, backend: &str) -> Option<AppError> {
        match self {
            BackendOutcome::QuotaExceeded => Some(AppError::ProviderUnavailable(format!(
                "{} quota exceeded",
                backend
            ))),
            BackendOutcome::Failed(reason) => Some(AppError::ProviderUnavailable(format!(
                "{}: {}",
                backend, reason
            ))),
            _ => None,
        }
    }
}

/// Maps a non-success HTTP status onto an outcome.
fn failure_for_status<T>(backend: &str, status: StatusCode) -> BackendOutcome<T> {
    match status {
        StatusCode::PAYMENT_REQUIRED | StatusCode::TOO_MANY_REQUESTS => {
            BackendOutcome::QuotaExceeded
        }
        other => BackendOutcome::Failed(format!("{} returned {}", backend, other)),
    }
}

#[async_trait]
pub trait ContentBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Textual (markdown or plain) content of `url`.
    async fn fetch(&self, _url: &str) -> BackendOutcome<String> {
        BackendOutcome::Unsupported
    }

    /// Ranked candidates for `query`.
    async fn search(&self, _query: &str) -> BackendOutcome<Vec<SearchResult>> {
        BackendOutcome::Unsupported
    }
}

/// Tries `backends` strictly in order and returns the first `Found` value.
///
/// Returns `None` when every backend failed, was empty, or ran out of quota.
pub async fn first_success<T, F, Fut>(
    backends: &[Arc<dyn ContentBackend>],
    capability: &str,
    mut call: F,
) -> Option<T>
where
    F: FnMut(Arc<dyn ContentBackend>) -> Fut,
    Fut: Future<Output = BackendOutcome<T>>,
{
    for backend in backends {
        let name = backend.name();
        let outcome = call(Arc::clone(backend)).await;
        if let Some(err) = outcome.failure(name) {
            tracing::warn!("{} failed, trying next backend: {}", capability, err);
            continue;
        }
        match outcome {
            BackendOutcome::Found(value) => {
                tracing::info!("✓ {} served by {}", capability, name);
                return Some(value);
            }
            BackendOutcome::Empty => {
                tracing::debug!("{} returned nothing for {}", name, capability);
            }
            _ => {}
        }
    }

    tracing::warn!("All backends exhausted for {}", capability);
    None
}

fn http_client(backend: &str, timeout: Duration) -> Result<Client, AppError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(BROWSER_USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| AppError::InternalError(format!("Failed to create {} client: {}", backend, e)))
}

// ============ Firecrawl (paid fetch + search) ============

#[derive(Debug, Deserialize)]
struct FirecrawlScrapeResponse {
    #[serde(default)]
    data: Option<FirecrawlScrapeData>,
}

#[derive(Debug, Deserialize)]
struct FirecrawlScrapeData {
    #[serde(default)]
    markdown: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FirecrawlSearchResponse {
    #[serde(default)]
    data: Vec<FirecrawlSearchHit>,
}

#[derive(Debug, Deserialize)]
struct FirecrawlSearchHit {
    url: String,
    #[serde(default)]
    title: Option<String>,
}

pub struct FirecrawlBackend {
    client: Client,
    base_url: String,
    api_key: String,
}

impl FirecrawlBackend {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        Self::with_base_url("https://api.firecrawl.dev", api_key, timeout)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        Ok(Self {
            client: http_client("firecrawl", timeout)?,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl ContentBackend for FirecrawlBackend {
    fn name(&self) -> &'static str {
        "firecrawl"
    }

    async fn fetch(&self, url: &str) -> BackendOutcome<String> {
        let response = match self
            .client
            .post(format!("{}/v1/scrape", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({ "url": url, "formats": ["markdown"], "onlyMainContent": true }))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return BackendOutcome::Failed(format!("request failed: {}", e)),
        };

        if !response.status().is_success() {
            return failure_for_status(self.name(), response.status());
        }

        match response.json::<FirecrawlScrapeResponse>().await {
            Ok(body) => BackendOutcome::from_text(
                body.data.and_then(|d| d.markdown).unwrap_or_default(),
            ),
            Err(e) => BackendOutcome::Failed(format!("invalid scrape response: {}", e)),
        }
    }

    async fn search(&self, query: &str) -> BackendOutcome<Vec<SearchResult>> {
        let response = match self
            .client
            .post(format!("{}/v1/search", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({ "query": query, "limit": 10, "lang": "pt", "country": "br" }))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return BackendOutcome::Failed(format!("request failed: {}", e)),
        };

        if !response.status().is_success() {
            return failure_for_status(self.name(), response.status());
        }

        match response.json::<FirecrawlSearchResponse>().await {
            Ok(body) => BackendOutcome::from_results(
                body.data
                    .into_iter()
                    .map(|hit| SearchResult {
                        url: hit.url,
                        title: hit.title.unwrap_or_default(),
                    })
                    .collect(),
            ),
            Err(e) => BackendOutcome::Failed(format!("invalid search response: {}", e)),
        }
    }
}

// ============ Jina reader / search mirror (free) ============

#[derive(Debug, Deserialize)]
struct JinaSearchResponse {
    #[serde(default)]
    data: Vec<JinaSearchHit>,
}

#[derive(Debug, Deserialize)]
struct JinaSearchHit {
    url: String,
    #[serde(default)]
    title: Option<String>,
}

pub struct JinaBackend {
    client: Client,
    reader_url: String,
    search_url: String,
    api_key: Option<String>,
}

impl JinaBackend {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Result<Self, AppError> {
        Self::with_base_urls("https://r.jina.ai", "https://s.jina.ai", api_key, timeout)
    }

    pub fn with_base_urls(
        reader_url: impl Into<String>,
        search_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        Ok(Self {
            client: http_client("jina", timeout)?,
            reader_url: reader_url.into(),
            search_url: search_url.into(),
            api_key,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key {
            Some(ref key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl ContentBackend for JinaBackend {
    fn name(&self) -> &'static str {
        "jina"
    }

    async fn fetch(&self, url: &str) -> BackendOutcome<String> {
        let request = self
            .client
            .get(format!("{}/{}", self.reader_url, url))
            .header("Accept", "text/plain");

        let response = match self.authorize(request).send().await {
            Ok(r) => r,
            Err(e) => return BackendOutcome::Failed(format!("request failed: {}", e)),
        };

        if !response.status().is_success() {
            return failure_for_status(self.name(), response.status());
        }

        match response.text().await {
            Ok(text) => BackendOutcome::from_text(text),
            Err(e) => BackendOutcome::Failed(format!("unreadable body: {}", e)),
        }
    }

    async fn search(&self, query: &str) -> BackendOutcome<Vec<SearchResult>> {
        let request = self
            .client
            .get(format!("{}/", self.search_url))
            .query(&[("q", query)])
            .header("Accept", "application/json");

        let response = match self.authorize(request).send().await {
            Ok(r) => r,
            Err(e) => return BackendOutcome::Failed(format!("request failed: {}", e)),
        };

        if !response.status().is_success() {
            return failure_for_status(self.name(), response.status());
        }

        match response.json::<JinaSearchResponse>().await {
            Ok(body) => BackendOutcome::from_results(
                body.data
                    .into_iter()
                    .map(|hit| SearchResult {
                        url: hit.url,
                        title: hit.title.unwrap_or_default(),
                    })
                    .collect(),
            ),
            Err(e) => BackendOutcome::Failed(format!("invalid search response: {}", e)),
        }
    }
}

// ============ DuckDuckGo HTML scraper (last resort) ============

static RESULT_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.result__a").expect("result selector is valid"));

/// Resolves the destination of a search-engine result link.
///
/// DuckDuckGo wraps destinations as `//duckduckgo.com/l/?uddg=<encoded>`; the
/// wrapped target is returned decoded. Ad redirects (`/y.js`) and anything that
/// is not http(s) yield `None`.
pub fn unwrap_result_href(href: &str) -> Option<String> {
    let base = url::Url::parse("https://duckduckgo.com").ok()?;
    let parsed = base.join(href.trim()).ok()?;

    let is_search_host = parsed
        .host_str()
        .is_some_and(|h| h.ends_with("duckduckgo.com"));

    if is_search_host {
        if parsed.path().starts_with("/y.js") {
            return None;
        }
        let target = parsed
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, value)| value.into_owned())?;
        let target = url::Url::parse(&target).ok()?;
        return matches!(target.scheme(), "http" | "https").then(|| target.to_string());
    }

    matches!(parsed.scheme(), "http" | "https").then(|| parsed.to_string())
}

/// Parses organic results out of a DuckDuckGo HTML results page.
pub fn parse_html_results(html: &str) -> Vec<SearchResult> {
    let document = Html::parse_document(html);
    let mut results: Vec<SearchResult> = Vec::new();

    for link in document.select(&RESULT_LINK_SELECTOR) {
        if results.len() >= MAX_HTML_RESULTS {
            break;
        }
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Some(url) = unwrap_result_href(href) else {
            continue;
        };
        if results.iter().any(|r| r.url == url) {
            continue;
        }
        let title = link.text().collect::<String>().trim().to_string();
        results.push(SearchResult { url, title });
    }

    results
}

pub struct DuckDuckGoHtmlBackend {
    client: Client,
    base_url: String,
}

impl DuckDuckGoHtmlBackend {
    pub fn new(timeout: Duration) -> Result<Self, AppError> {
        Self::with_base_url("https://html.duckduckgo.com", timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        Ok(Self {
            client: http_client("duckduckgo", timeout)?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl ContentBackend for DuckDuckGoHtmlBackend {
    fn name(&self) -> &'static str {
        "duckduckgo-html"
    }

    async fn search(&self, query: &str) -> BackendOutcome<Vec<SearchResult>> {
        let response = match self
            .client
            .get(format!("{}/html/", self.base_url))
            .query(&[("q", query), ("kl", "br-pt")])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return BackendOutcome::Failed(format!("request failed: {}", e)),
        };

        if !response.status().is_success() {
            return failure_for_status(self.name(), response.status());
        }

        match response.text().await {
            Ok(html) => BackendOutcome::from_results(parse_html_results(&html)),
            Err(e) => BackendOutcome::Failed(format!("unreadable body: {}", e)),
        }
    }
}
