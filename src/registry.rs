//! Registry lookup through the caller's credential-hiding proxy.
//!
//! The proxy attaches provider credentials server-side; this client only ever
//! sends the identifier and classifies what comes back.

use crate::errors::AppError;
use crate::models::EnrichmentRecord;
use crate::normalizer::{digits, validate_cnpj};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

/// Markers the proxy places in an error payload when the upstream credential is
/// invalid or revoked. Matched case-insensitively.
pub const AUTH_FAILURE_MARKERS: [&str; 3] = ["terminal_auth", "invalid_api_key", "unauthorized"];

/// Resolves a validated CNPJ to a registry record.
#[async_trait]
pub trait RegistryLookup: Send + Sync {
    /// `Ok(None)` when the registry has no record for the identifier.
    async fn lookup(&self, cnpj: &str) -> Result<Option<EnrichmentRecord>, AppError>;
}

/// True when `body` carries one of the auth-failure markers.
pub fn has_auth_marker(body: &str) -> bool {
    let lower = body.to_lowercase();
    AUTH_FAILURE_MARKERS.iter().any(|m| lower.contains(m))
}

/// Text of the top-level `error` value of a JSON object body, if it is set.
pub(crate) fn error_payload(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("error")? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Shared status classification for the credential-hiding proxies.
///
/// Returns `None` for success statuses.
pub(crate) fn classify_failure(service: &str, status: StatusCode, body: &str) -> Option<AppError> {
    if status.is_success() {
        // A proxy may tunnel an auth failure inside a 200 error payload. Only the
        // top-level `error` value counts; free text elsewhere in the reply is data.
        let tunneled = error_payload(body).is_some_and(|error| has_auth_marker(&error));
        if tunneled {
            return Some(AppError::TerminalAuth(format!(
                "{} reported a credential failure",
                service
            )));
        }
        return None;
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::PAYMENT_REQUIRED => Some(AppError::RateLimited(
            format!("{} returned {}", service, status),
        )),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Some(AppError::TerminalAuth(format!(
            "{} returned {}: {}",
            service, status, body
        ))),
        _ if has_auth_marker(body) => Some(AppError::TerminalAuth(format!(
            "{} returned {}: {}",
            service, status, body
        ))),
        _ => Some(AppError::ExternalApiError(format!(
            "{} returned {}: {}",
            service, status, body
        ))),
    }
}

/// HTTP client for the registry proxy endpoint.
#[derive(Clone)]
pub struct RegistryClient {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl RegistryClient {
    /// Creates a new `RegistryClient`.
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Full URL of the registry proxy.
    /// * `token` - Optional bearer token authenticating this service to the proxy.
    /// * `timeout` - Per-request timeout.
    pub fn new(
        endpoint: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AppError::InternalError(format!("Failed to create registry client: {}", e))
        })?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token,
        })
    }

    fn parse_record(body: &str) -> Result<Option<EnrichmentRecord>, AppError> {
        let value: Value = serde_json::from_str(body).map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse registry response: {}", e))
        })?;

        if let Some(error) = error_payload(body) {
            return Err(AppError::ExternalApiError(format!(
                "Registry proxy reported an error: {}",
                error
            )));
        }

        // Some proxies wrap the record in `data`.
        let value = match value {
            Value::Object(ref map) if map.contains_key("data") => map["data"].clone(),
            other => other,
        };

        match value {
            Value::Null => Ok(None),
            Value::Object(ref map) if map.get("error").is_some_and(|e| !e.is_null()) => {
                Err(AppError::ExternalApiError(format!(
                    "Registry proxy reported an error: {}",
                    map["error"]
                )))
            }
            Value::Object(ref map) if map.get("found") == Some(&Value::Bool(false)) => Ok(None),
            Value::Object(ref map) if map.is_empty() => Ok(None),
            Value::Object(_) => {
                let record: EnrichmentRecord = serde_json::from_value(value).map_err(|e| {
                    AppError::ExternalApiError(format!("Unexpected registry record shape: {}", e))
                })?;
                // No recognised field at all: nothing was found for this identifier.
                if record == EnrichmentRecord::default() {
                    return Ok(None);
                }
                Ok(Some(record))
            }
            other => Err(AppError::ExternalApiError(format!(
                "Unexpected registry response: {}",
                other
            ))),
        }
    }
}

#[async_trait]
impl RegistryLookup for RegistryClient {
    async fn lookup(&self, cnpj: &str) -> Result<Option<EnrichmentRecord>, AppError> {
        if !validate_cnpj(cnpj) {
            return Err(AppError::BadRequest(format!("Invalid CNPJ: {}", cnpj)));
        }
        let cnpj = digits(cnpj);

        tracing::info!("Registry: looking up CNPJ {}", cnpj);

        let mut request = self.client.post(&self.endpoint).json(&json!({ "cnpj": cnpj }));
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Registry request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        if status == StatusCode::NOT_FOUND {
            tracing::info!("Registry: no record for CNPJ {}", cnpj);
            return Ok(None);
        }

        if let Some(err) = classify_failure("Registry proxy", status, &body) {
            tracing::warn!("Registry lookup for {} failed: {}", cnpj, err);
            return Err(err);
        }

        let record = Self::parse_record(&body)?;
        match record {
            Some(ref r) => tracing::info!(
                "✓ Registry record for {}: {}",
                cnpj,
                r.legal_name.as_deref().unwrap_or("<sem razão social>")
            ),
            None => tracing::info!("Registry: empty record for CNPJ {}", cnpj),
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wrapped_and_empty_records() {
        let record = RegistryClient::parse_record(r#"{"data": {"razao_social": "ACME"}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(record.legal_name.as_deref(), Some("ACME"));

        assert!(RegistryClient::parse_record("null").unwrap().is_none());
        assert!(RegistryClient::parse_record(r#"{"found": false}"#)
            .unwrap()
            .is_none());
        assert!(RegistryClient::parse_record("[1,2]").is_err());
    }

    #[test]
    fn test_parse_error_payload_and_unknown_fields() {
        let err = RegistryClient::parse_record(r#"{"error": "Serviço indisponível"}"#).unwrap_err();
        assert!(matches!(err, AppError::ExternalApiError(_)));
        assert!(!err.is_batch_level());

        let err = RegistryClient::parse_record(r#"{"data": {"error": {"code": 503}}}"#).unwrap_err();
        assert!(matches!(err, AppError::ExternalApiError(_)));

        assert!(RegistryClient::parse_record(r#"{"error": null, "razao_social": "ACME"}"#)
            .unwrap()
            .is_some());
        assert!(RegistryClient::parse_record(r#"{"status": "ok", "ts": 1700000000}"#)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_success_reply_only_checks_top_level_error_for_auth() {
        let reply = r#"{"score": 3, "reason": "Site mostra página de error: acesso unauthorized"}"#;
        assert!(classify_failure("AI bridge", StatusCode::OK, reply).is_none());

        let err = classify_failure("AI bridge", StatusCode::OK, r#"{"error": "invalid_api_key"}"#)
            .unwrap();
        assert!(err.is_terminal_auth());

        let err = classify_failure(
            "Registry proxy",
            StatusCode::OK,
            r#"{"error": {"code": "UNAUTHORIZED", "message": "key revoked"}}"#,
        )
        .unwrap();
        assert!(err.is_terminal_auth());

        assert!(classify_failure("AI bridge", StatusCode::OK, "unauthorized error").is_none());
    }

    #[test]
    fn test_classify_failure() {
        let err = classify_failure("Registry", StatusCode::PAYMENT_REQUIRED, "").unwrap();
        assert!(err.is_rate_limited());

        let err = classify_failure(
            "Registry",
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"error": "TERMINAL_AUTH: key revoked"}"#,
        )
        .unwrap();
        assert!(err.is_terminal_auth());

        let err = classify_failure("Registry", StatusCode::BAD_GATEWAY, "upstream down").unwrap();
        assert!(!err.is_batch_level());

        assert!(classify_failure("Registry", StatusCode::OK, r#"{"razao_social": "X"}"#).is_none());
    }

    #[tokio::test]
    async fn test_invalid_cnpj_never_reaches_network() {
        let client = RegistryClient::new(
            "http://127.0.0.1:9/unreachable",
            None,
            Duration::from_secs(1),
        )
        .unwrap();

        let err = client.lookup("11222333000100").await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
