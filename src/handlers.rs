use crate::errors::AppError;
use crate::models::{BatchSummary, Lead, LogLine, OrganizationContext};
use crate::normalizer::{digits, format_cnpj, validate_cnpj};
use crate::orchestrator::{CollectingObserver, EnrichmentOrchestrator};
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Upper bound on leads per request; each lead costs at least one pacing interval.
pub const MAX_BATCH_SIZE: usize = 500;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<EnrichmentOrchestrator>,
    /// Cancelled on shutdown; every running batch derives a child token from it.
    pub shutdown: CancellationToken,
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-cnpj-enrichment",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

#[derive(Debug, Deserialize)]
pub struct ValidateCnpjRequest {
    pub cnpj: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidateCnpjResponse {
    pub cnpj: String,
    pub formatted: String,
    pub valid: bool,
}

/// POST /api/v1/cnpj/validate
///
/// Pure check-digit validation, no network involved.
pub async fn validate(Json(req): Json<ValidateCnpjRequest>) -> Json<ValidateCnpjResponse> {
    let valid = validate_cnpj(&req.cnpj);
    Json(ValidateCnpjResponse {
        cnpj: digits(&req.cnpj),
        formatted: format_cnpj(&req.cnpj),
        valid,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichBatchRequest {
    pub leads: Vec<Lead>,
    #[serde(default)]
    pub organization_context: Option<OrganizationContext>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichBatchResponse {
    pub batch_id: Uuid,
    pub summary: BatchSummary,
    pub leads: Vec<Lead>,
    pub logs: Vec<LogLine>,
}

/// POST /api/v1/enrich/batch
///
/// Runs the whole batch before answering. If the client goes away mid-batch
/// the handler future is dropped and the batch is cancelled with it.
///
/// # Returns
///
/// * `Result<Json<EnrichBatchResponse>, AppError>` - One entry per processed lead in
///   input order, plus the progress log.
pub async fn enrich_batch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EnrichBatchRequest>,
) -> Result<Json<EnrichBatchResponse>, AppError> {
    if req.leads.len() > MAX_BATCH_SIZE {
        return Err(AppError::BadRequest(format!(
            "Batch too large: {} leads (max {})",
            req.leads.len(),
            MAX_BATCH_SIZE
        )));
    }

    let batch_id = Uuid::new_v4();
    tracing::info!(
        "POST /enrich/batch - batch {} with {} leads (org: {})",
        batch_id,
        req.leads.len(),
        req.organization_context
            .as_ref()
            .and_then(|o| o.organization_id.as_deref())
            .unwrap_or("-")
    );

    let cancel = state.shutdown.child_token();
    let _guard = cancel.clone().drop_guard();

    let mut observer = CollectingObserver::default();
    let summary = state
        .orchestrator
        .process_batch(req.leads, &mut observer, req.organization_context, cancel)
        .await;

    tracing::info!(
        "Batch {} finished: {} enriched, {} failed, {} skipped{}",
        batch_id,
        summary.enriched,
        summary.failed,
        summary.skipped,
        if summary.aborted { " (aborted)" } else { "" }
    );

    Ok(Json(EnrichBatchResponse {
        batch_id,
        summary,
        leads: observer.leads,
        logs: observer.logs,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_reports_service_and_version() {
        let (status, Json(body)) = health().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "rust-cnpj-enrichment");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_validate_reports_formatted_and_validity() {
        let Json(ok) = validate(Json(ValidateCnpjRequest {
            cnpj: "11222333000181".to_string(),
        }))
        .await;
        assert_eq!(
            ok,
            ValidateCnpjResponse {
                cnpj: "11222333000181".to_string(),
                formatted: "11.222.333/0001-81".to_string(),
                valid: true,
            }
        );

        let Json(bad) = validate(Json(ValidateCnpjRequest {
            cnpj: "11.222.333/0001-82".to_string(),
        }))
        .await;
        assert!(!bad.valid);
        assert_eq!(bad.cnpj, "11222333000182");
    }

    #[test]
    fn test_batch_request_wire_format() {
        let req: EnrichBatchRequest = serde_json::from_value(json!({
            "leads": [{"cnpj": "11222333000181"}],
            "organizationContext": {"organizationId": "org-1", "niche": "Varejo"}
        }))
        .unwrap();
        assert_eq!(req.leads.len(), 1);
        assert_eq!(
            req.organization_context.unwrap().organization_id.as_deref(),
            Some("org-1")
        );
    }
}
