//! Identifier and contact normalization.
//!
//! Pure, total functions: nothing here touches the network or fails.

use once_cell::sync::Lazy;
use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use regex::Regex;

/// Brazilian country calling code, used when the caller does not configure one.
pub const DEFAULT_CALLING_CODE: &str = "55";

/// Registry status words that mark a company as inactive or cancelled.
pub const INACTIVE_MARKERS: [&str; 2] = ["BAIXADA", "INAPTA"];

const CNPJ_LEN: usize = 14;

// RFC 5322 simplified email regex
static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("email regex is valid")
});

/// Keeps ASCII digits only.
pub fn digits(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Check digit over `digits` with weights cycling 2..=9 from right to left.
fn check_digit(digits: &[u32]) -> u32 {
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, d)| d * (2 + (i as u32 % 8)))
        .sum();
    let rest = sum % 11;
    if rest < 2 {
        0
    } else {
        11 - rest
    }
}

/// Validates a CNPJ: 14 digits after stripping formatting, not all identical,
/// and both check digits matching.
pub fn validate_cnpj(raw: &str) -> bool {
    let cleaned = digits(raw);
    if cleaned.len() != CNPJ_LEN {
        return false;
    }

    let values: Vec<u32> = cleaned.chars().filter_map(|c| c.to_digit(10)).collect();
    if values.iter().all(|d| *d == values[0]) {
        return false;
    }

    let first = check_digit(&values[..12]);
    if first != values[12] {
        return false;
    }

    let second = check_digit(&values[..13]);
    second == values[13]
}

/// `XX.XXX.XXX/XXXX-XX`; inputs that are not 14 digits come back as given.
pub fn format_cnpj(raw: &str) -> String {
    let d = digits(raw);
    if d.len() != CNPJ_LEN {
        return raw.to_string();
    }
    format!(
        "{}.{}.{}/{}-{}",
        &d[0..2],
        &d[2..5],
        &d[5..8],
        &d[8..12],
        &d[12..14]
    )
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Strips non-digits and prefixes the Brazilian calling code when missing.
pub fn normalize_phone(raw: &str) -> String {
    normalize_phone_with(raw, DEFAULT_CALLING_CODE)
}

/// Strips non-digits (and trunk zeros) and prefixes `calling_code` when missing.
///
/// A number already starting with the calling code only counts as prefixed when
/// it is longer than a national number (area code 55 exists in Brazil).
pub fn normalize_phone_with(raw: &str, calling_code: &str) -> String {
    let cleaned = digits(raw);
    let cleaned = cleaned.trim_start_matches('0');
    if cleaned.is_empty() {
        return String::new();
    }

    if cleaned.starts_with(calling_code) && cleaned.len() > 11 {
        cleaned.to_string()
    } else {
        format!("{}{}", calling_code, cleaned)
    }
}

/// Case-insensitive match of the registry status against the inactive markers.
pub fn is_inactive_status(status: &str) -> bool {
    let upper = status.to_uppercase();
    INACTIVE_MARKERS.iter().any(|marker| upper.contains(marker))
}

/// Validate email address
///
/// Checks for:
/// - Basic email format (contains @ and .)
/// - Fake/placeholder patterns (repeated digits like 9999, 1111)
/// - Valid domain structure
pub fn is_valid_email(email: &str) -> bool {
    if email.len() < 5 || !email.contains('@') || !email.contains('.') {
        return false;
    }

    let fake_patterns = ["999999", "111111", "000000", "123456789"];

    for pattern in &fake_patterns {
        if email.contains(pattern) {
            tracing::warn!(
                "❌ Invalid email detected (fake pattern '{}'): {}",
                pattern,
                email
            );
            return false;
        }
    }

    if !EMAIL_REGEX.is_match(email) {
        tracing::warn!("❌ Invalid email format: {}", email);
        return false;
    }

    true
}

/// Validate and normalize Brazilian phone number
///
/// Parses with the BR region and returns E.164 (`+5511987654321`) when valid.
///
/// Returns: (is_valid, normalized_phone_or_error_msg)
pub fn validate_br_phone(raw: &str) -> (bool, String) {
    if raw.trim().is_empty() || raw.len() < 8 {
        return (false, "Phone too short".to_string());
    }

    match phonenumber::parse(Some(CountryId::BR), raw) {
        Ok(number) => {
            if phonenumber::is_valid(&number) {
                let formatted = number.format().mode(Mode::E164).to_string();
                tracing::debug!("✓ Valid BR phone: {} → {}", raw, formatted);
                (true, formatted)
            } else {
                tracing::warn!("❌ Invalid BR phone number: {}", raw);
                (false, "Invalid Brazilian phone number".to_string())
            }
        }
        Err(e) => {
            tracing::warn!("❌ Failed to parse BR phone '{}': {:?}", raw, e);
            (false, format!("Parse error: {:?}", e))
        }
    }
}
