use regex::Regex;
use rust_decimal::Decimal;
use std::sync::LazyLock;
use std::time::Duration;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static INVALID_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*]"#).unwrap());
static REPEATED_UNDERSCORES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_+").unwrap());

const HTML_ENTITIES: [(&str, &str); 7] = [
    ("&amp;", "&"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&yen;", "¥"),
    ("&nbsp;", " "),
];

const MAX_FILENAME_LEN: usize = 100;

/// Collapse runs of whitespace (including ideographic and non-breaking
/// spaces) into a single space and decode the few entities that survive
/// text extraction.
pub fn clean_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut decoded = text.replace(['\u{3000}', '\u{a0}'], " ");
    for (entity, replacement) in HTML_ENTITIES {
        if decoded.contains(entity) {
            decoded = decoded.replace(entity, replacement);
        }
    }

    WHITESPACE.replace_all(decoded.trim(), " ").trim().to_string()
}

/// Replace characters that are not allowed in file names and clamp the
/// length, keeping the extension intact.
pub fn sanitize_filename(filename: &str) -> String {
    let replaced = INVALID_FILENAME_CHARS.replace_all(filename, "_");
    let collapsed = REPEATED_UNDERSCORES.replace_all(&replaced, "_");
    let trimmed = collapsed.trim_matches('_');

    if trimmed.chars().count() <= MAX_FILENAME_LEN {
        return trimmed.to_string();
    }

    let (stem, ext) = match trimmed.rsplit_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (trimmed, None),
    };
    let ext_len = ext.map(|e| e.chars().count() + 1).unwrap_or(0);
    let keep = MAX_FILENAME_LEN.saturating_sub(ext_len);
    let stem: String = stem.chars().take(keep).collect();

    match ext {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem,
    }
}

/// `¥1,200` style formatting, rounded to whole yen.
pub fn format_yen(amount: Decimal) -> String {
    let rounded = amount.round().abs().to_string();
    let mut grouped = String::with_capacity(rounded.len() + rounded.len() / 3);
    for (i, ch) in rounded.chars().enumerate() {
        if i > 0 && (rounded.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if amount.is_sign_negative() && !amount.round().is_zero() {
        format!("-¥{grouped}")
    } else {
        format!("¥{grouped}")
    }
}

pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs < 60.0 {
        format!("{secs:.1}s")
    } else if secs < 3600.0 {
        let whole = elapsed.as_secs();
        format!("{}m {}s", whole / 60, whole % 60)
    } else {
        let whole = elapsed.as_secs();
        format!("{}h {}m", whole / 3600, (whole % 3600) / 60)
    }
}
