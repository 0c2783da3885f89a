use std::sync::LazyLock;

use regex::Regex;

pub const DEFAULT_COUNTRY_CODE: &str = "+91";
pub const PHONE_DIGITS: usize = 10;

static NON_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^0-9]").unwrap());
static MOBILE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{10}$").unwrap());
static COUNTRY_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\+\d{1,4}$").unwrap());

pub fn strip_non_digits(text: &str) -> String {
    NON_DIGITS.replace_all(text, "").into_owned()
}

/// Digits only, at most ten of them.
pub fn clean_phone(text: &str) -> String {
    strip_non_digits(text).chars().take(PHONE_DIGITS).collect()
}

pub fn validate_mobile(mobile: &str) -> bool {
    MOBILE.is_match(mobile)
}

pub fn validate_country_code(code: &str) -> bool {
    COUNTRY_CODE.is_match(code)
}

/// `+91 98765 43210`
pub fn format_display_phone(mobile: &str, country_code: &str) -> String {
    if mobile.is_empty() {
        return String::new();
    }

    let country_code = if country_code.is_empty() {
        DEFAULT_COUNTRY_CODE
    } else {
        country_code
    };
    let split = mobile
        .char_indices()
        .nth(5)
        .map(|(index, _)| index)
        .unwrap_or(mobile.len());
    let (head, tail) = mobile.split_at(split);

    format!("{} {} {}", country_code, head, tail)
}
