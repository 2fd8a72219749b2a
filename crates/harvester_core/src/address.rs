use std::sync::OnceLock;

use regex::Regex;

// province, city/county, district, town, road or neighbourhood, building number
const ROAD_ADDRESS: &str = concat!(
    r"(\w+[원산남울북천주기시도]\s*)?",
    r"(\w+[구시군]\s*)?",
    r"(\w+[구시]\s*)?",
    r"(\w+[면읍]\s*)?",
    r"(\w+\d*\w*[동리로길]\s*)?",
    r"(\w*\d+-?\d*)?",
);

fn road_address() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(ROAD_ADDRESS).expect("road address pattern"))
}

/// Strip building, floor and unit detail from a Korean road address so it can
/// be geocoded.
///
/// Returns an empty string for empty input and the trimmed input when no part
/// of the address is recognized.
pub fn clean_address(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    match road_address().find(raw) {
        Some(m) if !m.as_str().trim().is_empty() => m.as_str().trim().to_string(),
        _ => raw.to_string(),
    }
}
