use serde::Deserialize;
use std::time::Duration;

/// Timing knobs for the batch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Delay applied between two leads.
    pub pacing: Duration,
    /// Granularity of the pacing countdown reported through `on_log`.
    pub pacing_tick: Duration,
    /// Batch pause after a provider signaled quota exhaustion.
    pub rate_limit_backoff: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            pacing: Duration::from_secs(3),
            pacing_tick: Duration::from_secs(1),
            rate_limit_backoff: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub registry_proxy_url: String,
    pub ai_bridge_url: String,
    pub bridge_token: Option<String>,
    pub credentials_url: Option<String>,
    pub firecrawl_api_key: Option<String>,
    pub jina_api_key: Option<String>,
    pub country_calling_code: String,
    pub pacing_secs: u64,
    pub rate_limit_backoff_secs: u64,
    pub http_timeout_secs: u64,
}

fn required_url(name: &str) -> anyhow::Result<String> {
    std::env::var(name)
        .map_err(|_| anyhow::anyhow!("{} environment variable required", name))
        .and_then(|url| {
            if url.trim().is_empty() {
                anyhow::bail!("{} cannot be empty", name);
            }
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{} must start with http:// or https://", name);
            }
            Ok(url.trim_end_matches('/').to_string())
        })
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn number_or(name: &str, default: u64) -> anyhow::Result<u64> {
    match optional(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a non-negative integer", name)),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let credentials_url = match optional("CREDENTIALS_URL") {
            Some(_) => Some(required_url("CREDENTIALS_URL")?),
            None => None,
        };

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            registry_proxy_url: required_url("REGISTRY_PROXY_URL")?,
            ai_bridge_url: required_url("AI_BRIDGE_URL")?,
            bridge_token: optional("BRIDGE_TOKEN"),
            credentials_url,
            firecrawl_api_key: optional("FIRECRAWL_API_KEY"),
            jina_api_key: optional("JINA_API_KEY"),
            country_calling_code: optional("COUNTRY_CALLING_CODE")
                .unwrap_or_else(|| "55".to_string())
                .chars()
                .filter(|c| c.is_ascii_digit())
                .collect(),
            pacing_secs: number_or("PACING_SECS", 3)?,
            rate_limit_backoff_secs: number_or("RATE_LIMIT_BACKOFF_SECS", 60)?,
            http_timeout_secs: number_or("HTTP_TIMEOUT_SECS", 30)?,
        };

        if config.country_calling_code.is_empty() {
            anyhow::bail!("COUNTRY_CALLING_CODE must contain digits");
        }

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Registry proxy URL: {}", config.registry_proxy_url);
        tracing::debug!("AI bridge URL: {}", config.ai_bridge_url);
        if let Some(ref url) = config.credentials_url {
            tracing::info!("Organization credential store configured: {}", url);
        }
        tracing::debug!(
            "Firecrawl backend: {}",
            if config.firecrawl_api_key.is_some() {
                "enabled"
            } else {
                "disabled"
            }
        );
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            pacing: Duration::from_secs(self.pacing_secs),
            pacing_tick: Duration::from_secs(1),
            rate_limit_backoff: Duration::from_secs(self.rate_limit_backoff_secs),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            port: 3000,
            registry_proxy_url: "https://proxy.example.com/cnpj".to_string(),
            ai_bridge_url: "https://proxy.example.com/ai".to_string(),
            bridge_token: None,
            credentials_url: None,
            firecrawl_api_key: None,
            jina_api_key: None,
            country_calling_code: "55".to_string(),
            pacing_secs: 5,
            rate_limit_backoff_secs: 90,
            http_timeout_secs: 10,
        }
    }

    #[test]
    fn test_pipeline_settings_from_config() {
        let settings = sample().pipeline_settings();
        assert_eq!(settings.pacing, Duration::from_secs(5));
        assert_eq!(settings.pacing_tick, Duration::from_secs(1));
        assert_eq!(settings.rate_limit_backoff, Duration::from_secs(90));
    }

    #[test]
    fn test_default_settings_match_provider_limits() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.pacing, Duration::from_secs(3));
        assert_eq!(settings.rate_limit_backoff, Duration::from_secs(60));
    }
}
