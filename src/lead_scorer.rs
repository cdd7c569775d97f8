//! Commercial-potential scoring via the AI bridge.

use crate::ai_bridge::{AiAction, AiBridge};
use crate::errors::{AppError, ScoringFailure};
use crate::models::{BatchContext, Lead, LeadScore};
use serde_json::{json, Value};

pub const MAX_SCORE: u8 = 10;

const SCORING_INSTRUCTION: &str = "Avalie o potencial comercial desta empresa como cliente, \
de 0 a 10, considerando o nicho, o tom e o objetivo da organização quando informados. Responda \
apenas com JSON no formato {\"score\": number, \"reason\": string}.";

/// Reads `{score, reason}`; accepts numeric strings and fractional scores,
/// clamped to 0..=10.
pub fn parse_score(reply: &Value) -> Result<LeadScore, AppError> {
    let raw = reply
        .get("score")
        .ok_or_else(|| AppError::ExternalApiError("Scoring reply has no score".to_string()))?;

    let score = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    }
    .filter(|s| s.is_finite())
    .ok_or_else(|| AppError::ExternalApiError(format!("Unreadable score: {}", raw)))?;

    let reason = reply
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    Ok(LeadScore {
        score: score.round().clamp(0.0, MAX_SCORE as f64) as u8,
        reason,
    })
}

/// Scores an enriched lead, biased by the organization context when present.
///
/// Callers substitute [`LeadScore::neutral`] on failure unless the failure is
/// batch-level.
pub async fn score_lead(
    bridge: &dyn AiBridge,
    ctx: &BatchContext,
    lead: &Lead,
) -> Result<LeadScore, ScoringFailure> {
    let organization = ctx.organization.as_ref().map(|org| {
        json!({
            "niche": org.niche,
            "tone": org.tone,
            "goal": org.goal,
        })
    });

    let payload = json!({
        "instruction": SCORING_INSTRUCTION,
        "lead": {
            "cnpj": lead.cnpj,
            "legalName": lead.legal_name,
            "tradeName": lead.trade_name,
            "activity": lead.activity,
            "registryStatus": lead.registry_status,
            "municipality": lead.municipality,
            "region": lead.region,
            "hasEmail": lead.has_email(),
            "hasPhone": lead.phone.is_some(),
            "website": lead.website,
        },
        "organization": organization,
    });

    let reply = bridge
        .invoke(AiAction::ScoreLead, payload, ctx.credentials())
        .await?;

    Ok(parse_score(&reply)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_score_variants() {
        let s = parse_score(&json!({"score": 8, "reason": "Boa aderência"})).unwrap();
        assert_eq!(s.score, 8);
        assert_eq!(s.reason, "Boa aderência");

        assert_eq!(parse_score(&json!({"score": "7,6"})).unwrap().score, 8);
        assert_eq!(parse_score(&json!({"score": 42})).unwrap().score, 10);
        assert_eq!(parse_score(&json!({"score": -3})).unwrap().score, 0);
    }

    #[test]
    fn test_parse_score_rejects_garbage() {
        assert!(parse_score(&json!({"reason": "sem nota"})).is_err());
        assert!(parse_score(&json!({"score": "alto"})).is_err());
        assert!(parse_score(&json!({"score": [1]})).is_err());
    }
}
