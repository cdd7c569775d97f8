//! Client for the credential-hiding AI bridge.
//!
//! Every AI-assisted step goes through a single call shape,
//! `invoke(action, payload)`; the bridge attaches the real provider credential
//! server-side unless the batch carries a bring-your-own-key credential.

use crate::errors::AppError;
use crate::models::ProviderCredentials;
use crate::registry::classify_failure;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;

/// The fixed set of actions the bridge understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AiAction {
    ParseText,
    DiscoverEmail,
    ScoreLead,
    PersonalizeScript,
    IdentifyNiche,
}

impl AiAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiAction::ParseText => "parseText",
            AiAction::DiscoverEmail => "discoverEmail",
            AiAction::ScoreLead => "scoreLead",
            AiAction::PersonalizeScript => "personalizeScript",
            AiAction::IdentifyNiche => "identifyNiche",
        }
    }
}

impl fmt::Display for AiAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait AiBridge: Send + Sync {
    async fn invoke(
        &self,
        action: AiAction,
        payload: Value,
        credentials: Option<&ProviderCredentials>,
    ) -> Result<Value, AppError>;
}

/// Decodes the bridge's reply into the object the AI produced.
///
/// Handles `{"result": ...}` / `{"data": ...}` envelopes and models that answer
/// with a JSON document inside a string, optionally fenced in ```json.
pub fn unwrap_reply(value: Value) -> Value {
    let inner = match value {
        Value::Object(mut map) => {
            if let Some(inner) = map.remove("result").or_else(|| map.remove("data")) {
                inner
            } else {
                Value::Object(map)
            }
        }
        other => other,
    };

    match inner {
        Value::String(text) => {
            let trimmed = text
                .trim()
                .trim_start_matches("```json")
                .trim_start_matches("```")
                .trim_end_matches("```")
                .trim();
            serde_json::from_str(trimmed).unwrap_or(Value::String(text))
        }
        other => other,
    }
}

/// Lets batch-level signals through and turns every other delegate failure
/// into `Ok(None)`, so the caller moves on to its next fallback stage.
pub fn absorb_failure<T>(
    stage: &str,
    result: Result<Option<T>, AppError>,
) -> Result<Option<T>, AppError> {
    match result {
        Err(e) if e.is_batch_level() => Err(e),
        Err(e) => {
            tracing::warn!("{} failed, continuing without it: {}", stage, e);
            Ok(None)
        }
        ok => ok,
    }
}

/// HTTP implementation of [`AiBridge`].
#[derive(Clone)]
pub struct HttpAiBridge {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpAiBridge {
    /// Creates a new `HttpAiBridge`.
    ///
    /// # Arguments
    ///
    /// * `endpoint` - URL of the bridge function.
    /// * `token` - Optional bearer token for this service.
    /// * `timeout` - Per-request timeout; AI calls are slow, keep it generous.
    pub fn new(
        endpoint: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AppError::InternalError(format!("Failed to create AI bridge client: {}", e))
        })?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token,
        })
    }
}

#[async_trait]
impl AiBridge for HttpAiBridge {
    async fn invoke(
        &self,
        action: AiAction,
        payload: Value,
        credentials: Option<&ProviderCredentials>,
    ) -> Result<Value, AppError> {
        let mut body = json!({
            "action": action,
            "payload": payload,
        });
        if let Some(creds) = credentials {
            body["credentials"] = json!(creds);
        }

        tracing::debug!(
            "AI bridge: invoking {} (byok: {})",
            action,
            credentials.is_some()
        );

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            AppError::ExternalApiError(format!("AI bridge request failed ({}): {}", action, e))
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        if let Some(err) = classify_failure("AI bridge", status, &text) {
            tracing::warn!("AI bridge {} failed: {}", action, err);
            return Err(err);
        }

        let value: Value = serde_json::from_str(&text).map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse AI bridge response: {}", e))
        })?;

        if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
            return Err(AppError::ExternalApiError(format!(
                "AI bridge {} error: {}",
                action, error
            )));
        }

        Ok(unwrap_reply(value))
    }
}
