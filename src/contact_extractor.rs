//! Email/phone extraction from scraped page text via the AI bridge.

use crate::ai_bridge::{absorb_failure, AiAction, AiBridge};
use crate::errors::AppError;
use crate::models::{BatchContext, ExtractedContact};
use crate::normalizer::{is_valid_email, validate_br_phone};
use serde_json::{json, Value};

const EXTRACTION_INSTRUCTION: &str = "Extraia do texto abaixo o e-mail comercial e o telefone \
principal da empresa. Responda apenas com JSON no formato {\"email\": string|null, \
\"telefone\": string|null}. Use null quando a informação não estiver presente; não invente dados.";

fn non_empty(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
        .map(str::to_string)
}

/// Reads `{email, telefone}` out of the bridge reply, dropping values that are
/// obviously not contact data.
pub fn parse_contact(reply: &Value) -> Option<ExtractedContact> {
    let email = non_empty(reply.get("email")).filter(|e| is_valid_email(e));
    let telefone = non_empty(reply.get("telefone").or_else(|| reply.get("phone")))
        .filter(|p| validate_br_phone(p).0);

    if email.is_none() && telefone.is_none() {
        return None;
    }
    Some(ExtractedContact { email, telefone })
}

/// Asks the AI bridge for the company's email/phone in `page_text`.
///
/// `Ok(None)` when nothing was found or the delegate failed; only rate-limit and
/// terminal-auth signals come back as errors.
pub async fn extract_contact(
    bridge: &dyn AiBridge,
    ctx: &BatchContext,
    company_name: &str,
    page_text: &str,
) -> Result<Option<ExtractedContact>, AppError> {
    let payload = json!({
        "instruction": EXTRACTION_INSTRUCTION,
        "companyName": company_name,
        "text": page_text,
    });

    let result = bridge
        .invoke(AiAction::ParseText, payload, ctx.credentials())
        .await
        .map(|reply| parse_contact(&reply));

    absorb_failure("Contact extraction", result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_contact_filters_noise() {
        let contact = parse_contact(&json!({
            "email": " vendas@acme.com.br ",
            "telefone": "(11) 3333-4444"
        }))
        .unwrap();
        assert_eq!(contact.email.as_deref(), Some("vendas@acme.com.br"));
        assert_eq!(contact.telefone.as_deref(), Some("(11) 3333-4444"));

        let contact = parse_contact(&json!({"email": "null", "phone": "11987654321"})).unwrap();
        assert!(contact.email.is_none());
        assert!(contact.telefone.is_some());

        assert!(parse_contact(&json!({"email": "não informado", "telefone": "123"})).is_none());
        assert!(parse_contact(&json!("sem dados")).is_none());
    }
}
