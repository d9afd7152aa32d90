use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::LazyLock;

static PRICE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());

// Longer symbols first so "US$" is not reported as a bare "$".
const CURRENCY_SYMBOLS: [(&str, &str); 8] = [
    ("US$", "USD"),
    ("円", "JPY"),
    ("¥", "JPY"),
    ("￥", "JPY"),
    ("$", "USD"),
    ("£", "GBP"),
    ("€", "EUR"),
    ("₹", "INR"),
];

/// Extract the first number from a price label such as `¥1,200` or
/// `1,200円（税込）`.
///
/// Thousands separators are dropped before matching and full-width digits
/// are folded to ASCII. Passing the output of [`format_price`] back in
/// yields the same value.
pub fn parse_price(text: &str) -> Option<Decimal> {
    if text.trim().is_empty() {
        return None;
    }

    let normalized: String = text
        .chars()
        .filter_map(|c| match c {
            ',' | '，' => None,
            '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32),
            '．' => Some('.'),
            other => Some(other),
        })
        .collect();

    let matched = PRICE_REGEX.find(&normalized)?;
    Decimal::from_str(matched.as_str()).ok()
}

/// ISO code for the first currency marker found in `text`.
pub fn detect_currency(text: &str) -> Option<&'static str> {
    CURRENCY_SYMBOLS
        .iter()
        .find(|(symbol, _)| text.contains(symbol))
        .map(|(_, code)| *code)
}

/// Plain decimal rendering with at least one fractional digit: `1000.0`,
/// `1299.5`.
pub fn format_price(price: Decimal) -> String {
    let normalized = price.normalize();
    if normalized.scale() == 0 {
        format!("{normalized}.0")
    } else {
        normalized.to_string()
    }
}
