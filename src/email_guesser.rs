//! Last-resort corporate email guess via the AI bridge.

use crate::ai_bridge::{absorb_failure, AiAction, AiBridge};
use crate::errors::AppError;
use crate::models::BatchContext;
use crate::normalizer::{format_cnpj, is_valid_email};
use serde_json::{json, Value};

const GUESS_INSTRUCTION: &str = "Com base na razão social e no CNPJ, proponha o único e-mail \
corporativo mais provável desta empresa (por exemplo contato@dominio). Responda apenas com JSON \
no formato {\"email\": string|null}.";

/// Email in the reply, whether the bridge answered with an object or a bare string.
pub fn parse_guess(reply: &Value) -> Option<String> {
    let raw = match reply {
        Value::String(s) => Some(s.as_str()),
        other => other.get("email").and_then(Value::as_str),
    }?;

    let email = raw.trim();
    is_valid_email(email).then(|| email.to_string())
}

/// Proposes the most probable corporate email for the company.
///
/// `Ok(None)` on any delegate failure other than rate-limit/terminal-auth.
pub async fn guess_email(
    bridge: &dyn AiBridge,
    ctx: &BatchContext,
    legal_name: &str,
    cnpj: &str,
) -> Result<Option<String>, AppError> {
    let payload = json!({
        "instruction": GUESS_INSTRUCTION,
        "companyName": legal_name,
        "cnpj": format_cnpj(cnpj),
    });

    let result = bridge
        .invoke(AiAction::DiscoverEmail, payload, ctx.credentials())
        .await
        .map(|reply| parse_guess(&reply));

    absorb_failure("Email guess", result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_guess_shapes() {
        assert_eq!(
            parse_guess(&json!({"email": "contato@acme.com.br"})).as_deref(),
            Some("contato@acme.com.br")
        );
        assert_eq!(
            parse_guess(&json!(" comercial@acme.com ")).as_deref(),
            Some("comercial@acme.com")
        );
        assert_eq!(parse_guess(&json!({"email": null})), None);
        assert_eq!(parse_guess(&json!({"email": "desconhecido"})), None);
    }
}
