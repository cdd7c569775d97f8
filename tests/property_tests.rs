/// Property-based tests using proptest
/// Tests invariants of the CNPJ checksum and contact normalization for all inputs
use proptest::prelude::*;
use rust_cnpj_enrichment::normalizer::{
    digits, format_cnpj, is_inactive_status, is_valid_email, normalize_email, normalize_phone,
    normalize_phone_with, validate_br_phone, validate_cnpj,
};

/// Appends both check digits to a 12-digit base.
fn with_check_digits(base: &str) -> String {
    fn check(values: &[u32]) -> u32 {
        let sum: u32 = values
            .iter()
            .rev()
            .enumerate()
            .map(|(i, d)| d * (2 + (i as u32 % 8)))
            .sum();
        match sum % 11 {
            r if r < 2 => 0,
            r => 11 - r,
        }
    }

    let mut values: Vec<u32> = base.chars().filter_map(|c| c.to_digit(10)).collect();
    let first = check(&values);
    values.push(first);
    let second = check(&values);
    values.push(second);
    values.iter().map(|d| char::from(b'0' + *d as u8)).collect()
}

// Property: checksum validation accepts exactly the well-formed identifiers
proptest! {
    #[test]
    fn cnpj_validation_never_panics(raw in "\\PC*") {
        let _ = validate_cnpj(&raw);
    }

    #[test]
    fn generated_cnpjs_validate(base in "[0-9]{12}") {
        let cnpj = with_check_digits(&base);
        let repeated = cnpj.chars().all(|c| c == cnpj.as_bytes()[0] as char);
        prop_assert_eq!(validate_cnpj(&cnpj), !repeated);
    }

    #[test]
    fn formatting_does_not_change_validity(base in "[0-9]{12}") {
        let cnpj = with_check_digits(&base);
        prop_assert_eq!(validate_cnpj(&format_cnpj(&cnpj)), validate_cnpj(&cnpj));
        prop_assert_eq!(digits(&format_cnpj(&cnpj)), cnpj);
    }

    #[test]
    fn altered_check_digit_is_rejected(base in "[0-9]{12}", pos in 12usize..14, bump in 1u32..10) {
        let cnpj = with_check_digits(&base);
        prop_assume!(validate_cnpj(&cnpj));

        let mut chars: Vec<char> = cnpj.chars().collect();
        let old = chars[pos].to_digit(10).unwrap();
        chars[pos] = char::from_digit((old + bump) % 10, 10).unwrap();
        let altered: String = chars.into_iter().collect();

        prop_assert!(!validate_cnpj(&altered));
    }

    #[test]
    fn wrong_length_is_rejected(raw in "[0-9]{0,13}|[0-9]{15,20}") {
        prop_assert!(!validate_cnpj(&raw));
    }
}

// Property: normalization output shape
proptest! {
    #[test]
    fn email_normalization_is_idempotent(email in "\\PC*") {
        let once = normalize_email(&email);
        prop_assert_eq!(normalize_email(&once), once.clone());
        prop_assert_eq!(once.trim(), once.as_str());
    }

    #[test]
    fn email_validation_never_panics(email in "\\PC*") {
        let _ = is_valid_email(&email);
    }

    #[test]
    fn phone_validation_never_panics(phone in "\\PC*") {
        let _ = validate_br_phone(&phone);
    }

    #[test]
    fn normalized_phone_is_prefixed_digits(raw in "\\PC*") {
        let phone = normalize_phone(&raw);
        prop_assert!(phone.chars().all(|c| c.is_ascii_digit()));
        prop_assert!(phone.is_empty() || phone.starts_with("55"));
    }

    #[test]
    fn national_numbers_normalize_once(ddd in 11u8..=99u8, number in 20000000u32..=999999999u32) {
        let raw = format!("({}) {}", ddd, number);
        let phone = normalize_phone(&raw);
        prop_assert_eq!(phone.clone(), format!("55{}{}", ddd, number));
        prop_assert_eq!(normalize_phone(&phone), phone);
    }

    #[test]
    fn custom_calling_code_is_applied(number in "[1-9][0-9]{9}") {
        let phone = normalize_phone_with(&number, "1");
        prop_assert_eq!(phone, format!("1{}", number));
    }

    #[test]
    fn inactive_markers_match_in_any_case(prefix in "[a-z ]{0,8}", upper in any::<bool>()) {
        let status = if upper {
            format!("{}BAIXADA", prefix)
        } else {
            format!("{}inapta", prefix)
        };
        prop_assert!(is_inactive_status(&status));
    }
}
