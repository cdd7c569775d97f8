use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Application-specific error types.
///
/// The pipeline variants map one-to-one onto how the orchestrator routes a
/// failure: `RateLimited` pauses the batch, `TerminalAuth` aborts it, and
/// everything else stays local to the lead being processed.
#[derive(Debug, Clone)]
pub enum AppError {
    /// Registry has no record for a valid identifier.
    NotFound(String),
    /// Invalid input (bad identifier, malformed request). Never reaches the network.
    BadRequest(String),
    /// Generic provider failure.
    ExternalApiError(String),
    /// Provider signaled quota exhaustion. Recoverable after a batch-level backoff.
    RateLimited(String),
    /// Provider signaled invalid or revoked credentials. Aborts the batch.
    TerminalAuth(String),
    /// A single fallback backend failed; absorbed by the fallback chain.
    ProviderUnavailable(String),
    /// Internal server error.
    InternalError(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl AppError {
    /// Strips any `WithContext` layers and returns the innermost error.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// True for the two signals that change batch control flow.
    pub fn is_batch_level(&self) -> bool {
        matches!(
            self.root(),
            AppError::RateLimited(_) | AppError::TerminalAuth(_)
        )
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self.root(), AppError::RateLimited(_))
    }

    pub fn is_terminal_auth(&self) -> bool {
        matches!(self.root(), AppError::TerminalAuth(_))
    }
}

impl fmt::Display for AppError {
    /// Formats the error for display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::ExternalApiError(msg) => write!(f, "External API error: {}", msg),
            AppError::RateLimited(msg) => write!(f, "Rate limited: {}", msg),
            AppError::TerminalAuth(msg) => write!(f, "Terminal auth failure: {}", msg),
            AppError::ProviderUnavailable(msg) => write!(f, "Provider unavailable: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Converts the error into an HTTP response.
    ///
    /// Maps each error variant to an appropriate HTTP status code and JSON body.
    /// Logs errors appropriately based on their severity.
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::ExternalApiError(msg) => {
                tracing::error!("External API error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "External service error".to_string(),
                )
            }
            AppError::RateLimited(msg) => {
                tracing::warn!("Rate limited: {}", msg);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "Rate limit reached".to_string(),
                )
            }
            AppError::TerminalAuth(msg) => {
                tracing::error!("Terminal auth failure: {}", msg);
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            AppError::ProviderUnavailable(msg) => {
                tracing::warn!("Provider unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Provider unavailable".to_string(),
                )
            }
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::WithContext { source, context } => {
                // Log full context chain for debugging
                tracing::error!("Error with context: {} -> {}", context, source);
                // Delegate to underlying error's response
                return source.clone().into_response();
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    /// Converts a `reqwest::Error` into an `AppError`.
    fn from(err: reqwest::Error) -> Self {
        AppError::ExternalApiError(err.to_string())
    }
}

/// Failure of the lead scorer. Carries the underlying bridge error so batch-level
/// signals can still be routed; any other failure resolves to the neutral score.
#[derive(Debug, Clone)]
pub struct ScoringFailure(pub AppError);

impl fmt::Display for ScoringFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scoring failed: {}", self.0)
    }
}

impl std::error::Error for ScoringFailure {}

impl From<AppError> for ScoringFailure {
    fn from(err: AppError) -> Self {
        ScoringFailure(err)
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    ///
    /// # Arguments
    ///
    /// * `context` - The context message to add.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    ///
    /// # Arguments
    ///
    /// * `f` - A closure that produces the context message.
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}
