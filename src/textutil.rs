use once_cell::sync::Lazy;
use regex::Regex;

static LEADING_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([0-9]+(?:\.[0-9]+)*)").expect("leading number"));

/// Collapse every whitespace run to a single space and trim the ends.
/// Heading comparison and caption matching both run on this form.
pub fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a leading chapter number such as `2`, `6.13` or `1.2.3.` into
/// its numeric parts. A trailing dot is tolerated.
pub fn leading_number_parts(text: &str) -> Option<Vec<u32>> {
    let m = LEADING_NUMBER_RE.captures(text)?;
    let raw = m.get(1)?.as_str().trim_end_matches('.');
    let mut parts = Vec::new();
    for p in raw.split('.') {
        parts.push(p.parse::<u32>().ok()?);
    }
    Some(parts)
}

/// True when `text` starts with `number` followed by a hard boundary,
/// so a query for section `2` does not hit `2.1` or `20`.
pub fn starts_with_number(text: &str, number: &str) -> bool {
    let t = text.trim_start();
    if !t.starts_with(number) {
        return false;
    }
    match t[number.len()..].chars().next() {
        None => true,
        Some(c) => !(c.is_ascii_digit() || c == '.' || c == '-'),
    }
}
