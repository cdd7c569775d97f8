//! Web discovery: company name + CNPJ → official website and its text.

use crate::backends::{
    first_success, ContentBackend, DuckDuckGoHtmlBackend, FirecrawlBackend, JinaBackend,
};
use crate::config::Config;
use crate::errors::AppError;
use crate::models::{DiscoveredSite, SearchResult, SocialHandles};
use crate::normalizer::format_cnpj;
use async_trait::async_trait;
use std::sync::Arc;

/// Page text handed to AI delegates is cut to this many characters.
pub const MAX_PAGE_CHARS: usize = 12_000;

/// Candidates fetched per discovery before giving up.
const MAX_FETCH_ATTEMPTS: usize = 3;

/// Registry mirrors, aggregators and marketplaces that are never an official site.
const DIRECTORY_HOSTS: [&str; 16] = [
    "cnpj.biz",
    "cnpj.info",
    "cnpja.com",
    "casadosdados.com.br",
    "econodata.com.br",
    "empresascnpj.com",
    "consultacnpj.com",
    "cnpj.services",
    "solutudo.com.br",
    "telelistas.net",
    "guiamais.com.br",
    "apontador.com.br",
    "reclameaqui.com.br",
    "jusbrasil.com.br",
    "mercadolivre.com.br",
    "wikipedia.org",
];

#[async_trait]
pub trait WebDiscovery: Send + Sync {
    /// Official website and page text for a company.
    async fn discover(
        &self,
        company_name: &str,
        cnpj: &str,
        known_website: Option<&str>,
    ) -> Option<DiscoveredSite>;

    /// Page text of an arbitrary URL.
    async fn fetch_page(&self, url: &str) -> Option<String>;

    /// Ranked candidates for a free-form query.
    async fn search(&self, query: &str) -> Vec<SearchResult>;
}

pub struct WebDiscoveryResolver {
    fetch_backends: Vec<Arc<dyn ContentBackend>>,
    search_backends: Vec<Arc<dyn ContentBackend>>,
}

fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_lowercase()))
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{}", domain))
}

/// Social profile URLs among `results`, first hit per network.
pub fn social_from_results(results: &[SearchResult]) -> SocialHandles {
    let mut social = SocialHandles::default();
    for result in results {
        let Some(host) = host_of(&result.url) else {
            continue;
        };
        if host_matches(&host, "instagram.com") && social.instagram.is_none() {
            social.instagram = Some(result.url.clone());
        } else if host_matches(&host, "facebook.com") && social.facebook.is_none() {
            social.facebook = Some(result.url.clone());
        } else if host_matches(&host, "linkedin.com") && social.linkedin.is_none() {
            social.linkedin = Some(result.url.clone());
        }
    }
    social
}

/// True for URLs that can plausibly be the company's own website.
pub fn is_candidate_site(url: &str) -> bool {
    let Some(host) = host_of(url) else {
        return false;
    };
    let social = [
        "instagram.com",
        "facebook.com",
        "linkedin.com",
        "youtube.com",
        "twitter.com",
        "x.com",
    ];
    !DIRECTORY_HOSTS
        .iter()
        .chain(social.iter())
        .any(|domain| host_matches(&host, domain))
}

fn truncate_chars(text: String, max: usize) -> String {
    let cut = text.char_indices().nth(max).map(|(idx, _)| idx);
    match cut {
        Some(idx) => text[..idx].to_string(),
        None => text,
    }
}

fn with_scheme(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

impl WebDiscoveryResolver {
    pub fn new(
        fetch_backends: Vec<Arc<dyn ContentBackend>>,
        search_backends: Vec<Arc<dyn ContentBackend>>,
    ) -> Self {
        Self {
            fetch_backends,
            search_backends,
        }
    }

    /// Builds the default priority lists: paid provider first (when a key is
    /// configured), then the free mirror, then the HTML scraper for search.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let timeout = config.http_timeout();
        let jina: Arc<dyn ContentBackend> =
            Arc::new(JinaBackend::new(config.jina_api_key.clone(), timeout)?);
        let scraper: Arc<dyn ContentBackend> = Arc::new(DuckDuckGoHtmlBackend::new(timeout)?);

        let mut fetch_backends: Vec<Arc<dyn ContentBackend>> = Vec::new();
        let mut search_backends: Vec<Arc<dyn ContentBackend>> = Vec::new();

        if let Some(ref key) = config.firecrawl_api_key {
            let firecrawl: Arc<dyn ContentBackend> =
                Arc::new(FirecrawlBackend::new(key.clone(), timeout)?);
            fetch_backends.push(Arc::clone(&firecrawl));
            search_backends.push(firecrawl);
        }
        fetch_backends.push(Arc::clone(&jina));
        search_backends.push(jina);
        search_backends.push(scraper);

        tracing::info!(
            "Web discovery backends: fetch=[{}] search=[{}]",
            fetch_backends.iter().map(|b| b.name()).collect::<Vec<_>>().join(", "),
            search_backends.iter().map(|b| b.name()).collect::<Vec<_>>().join(", ")
        );

        Ok(Self::new(fetch_backends, search_backends))
    }

    pub fn search_query(company_name: &str, cnpj: &str) -> String {
        format!("\"{}\" site oficial contato CNPJ {}", company_name.trim(), format_cnpj(cnpj))
    }
}

#[async_trait]
impl WebDiscovery for WebDiscoveryResolver {
    async fn discover(
        &self,
        company_name: &str,
        cnpj: &str,
        known_website: Option<&str>,
    ) -> Option<DiscoveredSite> {
        if let Some(site) = known_website.filter(|s| !s.trim().is_empty()) {
            let url = with_scheme(site);
            if let Some(page_text) = self.fetch_page(&url).await {
                tracing::info!("Using registry website for {}: {}", company_name, url);
                return Some(DiscoveredSite {
                    url: Some(url),
                    page_text: Some(page_text),
                    social: SocialHandles::default(),
                });
            }
        }

        let results = self.search(&Self::search_query(company_name, cnpj)).await;
        if results.is_empty() {
            return None;
        }

        let social = social_from_results(&results);

        for candidate in results
            .iter()
            .filter(|r| is_candidate_site(&r.url))
            .take(MAX_FETCH_ATTEMPTS)
        {
            if let Some(page_text) = self.fetch_page(&candidate.url).await {
                tracing::info!("Discovered website for {}: {}", company_name, candidate.url);
                return Some(DiscoveredSite {
                    url: Some(candidate.url.clone()),
                    page_text: Some(page_text),
                    social,
                });
            }
        }

        (!social.is_empty()).then(|| DiscoveredSite {
            url: None,
            page_text: None,
            social,
        })
    }

    async fn fetch_page(&self, url: &str) -> Option<String> {
        let url = url.to_string();
        first_success(&self.fetch_backends, "fetch", |backend| {
            let url = url.clone();
            async move { backend.fetch(&url).await }
        })
        .await
        .map(|text| truncate_chars(text, MAX_PAGE_CHARS))
    }

    async fn search(&self, query: &str) -> Vec<SearchResult> {
        let query = query.to_string();
        first_success(&self.search_backends, "search", |backend| {
            let query = query.clone();
            async move { backend.search(&query).await }
        })
        .await
        .unwrap_or_default()
    }
}
