//! Per-organization AI credential resolution (bring-your-own-key).

use crate::errors::AppError;
use crate::models::{OrganizationContext, ProviderCredentials};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// The organization's own AI credential, if it registered one.
    async fn ai_credential(
        &self,
        organization_id: &str,
    ) -> Result<Option<ProviderCredentials>, AppError>;
}

/// Reads organization credentials from `{base_url}/organizations/{id}/ai-credential`.
#[derive(Clone)]
pub struct HttpCredentialStore {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpCredentialStore {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AppError::InternalError(format!("Failed to create credential client: {}", e))
        })?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            token,
        })
    }
}

#[async_trait]
impl CredentialStore for HttpCredentialStore {
    async fn ai_credential(
        &self,
        organization_id: &str,
    ) -> Result<Option<ProviderCredentials>, AppError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| AppError::InternalError(format!("Invalid credentials URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| AppError::InternalError("Credentials URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["organizations", organization_id, "ai-credential"]);

        let mut request = self.client.get(url);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            AppError::ExternalApiError(format!("Credential lookup failed: {}", e))
        })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::ExternalApiError(format!(
                "Credential store returned {}",
                status
            )));
        }

        let creds: Option<ProviderCredentials> = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse credential response: {}", e))
        })?;

        Ok(creds.filter(|c| !c.api_key.trim().is_empty()))
    }
}

/// Outcome of resolving the batch credential, kept apart from logging so the
/// orchestrator can report it through the caller's log channel.
#[derive(Debug)]
pub enum CredentialResolution {
    /// No organization context or nothing registered: platform default.
    PlatformDefault,
    /// Caller supplied the key inline.
    Inline(ProviderCredentials),
    /// Found in the credential store.
    Stored(ProviderCredentials),
    /// Store lookup failed; falling back to the platform default.
    Failed(AppError),
}

impl CredentialResolution {
    pub fn into_credentials(self) -> Option<ProviderCredentials> {
        match self {
            CredentialResolution::Inline(c) | CredentialResolution::Stored(c) => Some(c),
            CredentialResolution::PlatformDefault | CredentialResolution::Failed(_) => None,
        }
    }
}

/// Inline credentials first, then the store, then the platform default.
pub async fn resolve_credentials(
    organization: Option<&OrganizationContext>,
    store: Option<&dyn CredentialStore>,
) -> CredentialResolution {
    let Some(org) = organization else {
        return CredentialResolution::PlatformDefault;
    };

    if let Some(ref creds) = org.credentials {
        if !creds.api_key.trim().is_empty() {
            return CredentialResolution::Inline(creds.clone());
        }
    }

    let (Some(store), Some(org_id)) = (store, org.organization_id.as_deref()) else {
        return CredentialResolution::PlatformDefault;
    };

    match store.ai_credential(org_id).await {
        Ok(Some(creds)) => CredentialResolution::Stored(creds),
        Ok(None) => CredentialResolution::PlatformDefault,
        Err(e) => CredentialResolution::Failed(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingStore;

    #[async_trait]
    impl CredentialStore for FailingStore {
        async fn ai_credential(&self, _: &str) -> Result<Option<ProviderCredentials>, AppError> {
            Err(AppError::ExternalApiError("store down".to_string()))
        }
    }

    fn org(with_inline: bool) -> OrganizationContext {
        OrganizationContext {
            organization_id: Some("org-1".to_string()),
            credentials: with_inline.then(|| ProviderCredentials {
                provider: "gemini".to_string(),
                api_key: "inline-key".to_string(),
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_inline_credentials_win() {
        let org = org(true);
        let store: &dyn CredentialStore = &FailingStore;
        let resolved = resolve_credentials(Some(&org), Some(store)).await;
        assert!(matches!(resolved, CredentialResolution::Inline(_)));
    }

    #[tokio::test]
    async fn test_store_failure_falls_back() {
        let org = org(false);
        let store: &dyn CredentialStore = &FailingStore;
        let resolved = resolve_credentials(Some(&org), Some(store)).await;
        assert!(matches!(resolved, CredentialResolution::Failed(_)));
        assert!(resolved.into_credentials().is_none());
    }

    #[tokio::test]
    async fn test_no_context_uses_platform_default() {
        let store: &dyn CredentialStore = &FailingStore;
        let resolved = resolve_credentials(None, Some(store)).await;
        assert!(matches!(resolved, CredentialResolution::PlatformDefault));
    }
}
