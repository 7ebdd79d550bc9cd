//! Instruction-aware field extraction (§4.6 "Data parsing"), applied after
//! each successful extract-kind step. No direct teacher analogue; grounded on
//! the ad-hoc `regex::Regex::new(...)` idiom used throughout the retrieval
//! pack's validation/sanitizer modules (e.g. `mofa-foundation::validation::sanitizer`)
//! rather than a precompiled-pattern crate.

use std::collections::HashMap;

use regex::Regex;
use serde_json::{json, Value};

/// Merges any fields this instruction's keywords ask for into `out`, parsed
/// out of one piece of extracted text.
pub fn apply(instruction: &str, text: &str, out: &mut HashMap<String, Value>) {
    let lowered = instruction.to_lowercase();
    if lowered.contains("roast") || lowered.contains("date") {
        if let Some((roasting_date, all_dates)) = parse_roast_date(text) {
            out.insert("roastingDate".to_string(), json!(roasting_date));
            out.insert("allDatesFound".to_string(), json!(all_dates));
        }
    }
    if lowered.contains("price") || lowered.contains("cost") {
        if let Some((amount, currency)) = parse_price(text) {
            out.insert("price".to_string(), json!(amount));
            out.insert("currency".to_string(), json!(currency));
        }
    }
    if lowered.contains("title") || lowered.contains("name") {
        if let Some(title) = parse_title(text) {
            out.insert("title".to_string(), json!(title));
        }
    }
}

/// `Rostningsdatum YYYY-MM-DD` wins when present; otherwise every
/// `YYYY-MM-DD` date in the text is collected, sorted descending, and the
/// newest becomes `roastingDate`.
fn parse_roast_date(text: &str) -> Option<(String, Vec<String>)> {
    let labeled = Regex::new(r"Rostningsdatum\s+(\d{4}-\d{2}-\d{2})").unwrap();
    if let Some(caps) = labeled.captures(text) {
        let date = caps[1].to_string();
        return Some((date.clone(), vec![date]));
    }

    let any_date = Regex::new(r"\d{4}-\d{2}-\d{2}").unwrap();
    let mut dates: Vec<String> = any_date.find_iter(text).map(|m| m.as_str().to_string()).collect();
    if dates.is_empty() {
        return None;
    }
    dates.sort_by(|a, b| b.cmp(a));
    let newest = dates[0].clone();
    Some((newest, dates))
}

fn parse_price(text: &str) -> Option<(f64, &'static str)> {
    let sek = Regex::new(r"(\d+)\s*kr").unwrap();
    if let Some(caps) = sek.captures(text) {
        let amount: f64 = caps[1].parse().ok()?;
        return Some((amount, "SEK"));
    }
    let usd = Regex::new(r"\$(\d+\.?\d*)").unwrap();
    if let Some(caps) = usd.captures(text) {
        let amount: f64 = caps[1].parse().ok()?;
        return Some((amount, "USD"));
    }
    None
}

fn parse_title(text: &str) -> Option<String> {
    let title_tag = Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap();
    if let Some(caps) = title_tag.captures(text) {
        return Some(caps[1].trim().to_string());
    }
    let h1_tag = Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>").unwrap();
    h1_tag.captures(text).map(|caps| caps[1].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labeled_roast_date_wins_over_bare_dates() {
        let text = "Rostningsdatum 2025-07-10, best before 2025-12-01";
        let (date, all) = parse_roast_date(text).unwrap();
        assert_eq!(date, "2025-07-10");
        assert_eq!(all, vec!["2025-07-10".to_string()]);
    }

    #[test]
    fn bare_dates_sort_descending_and_take_newest() {
        let text = "roasted 2025-07-02, also 2025-07-10 in stock";
        let (date, all) = parse_roast_date(text).unwrap();
        assert_eq!(date, "2025-07-10");
        assert_eq!(all, vec!["2025-07-10".to_string(), "2025-07-02".to_string()]);
    }

    #[test]
    fn sek_price_is_parsed() {
        assert_eq!(parse_price("165 kr").unwrap(), (165.0, "SEK"));
    }

    #[test]
    fn usd_price_is_parsed() {
        assert_eq!(parse_price("$12.50").unwrap(), (12.5, "USD"));
    }

    #[test]
    fn title_tag_preferred_over_h1() {
        let html = "<html><head><title>Shop</title></head><body><h1>Welcome</h1></body></html>";
        assert_eq!(parse_title(html).unwrap(), "Shop");
    }

    #[test]
    fn falls_back_to_h1_when_no_title_tag() {
        let html = "<body><h1>Fallback Name</h1></body>";
        assert_eq!(parse_title(html).unwrap(), "Fallback Name");
    }

    #[test]
    fn apply_merges_only_fields_the_instruction_asks_for() {
        let mut out = HashMap::new();
        apply("get the price", "165 kr", &mut out);
        assert!(out.contains_key("price"));
        assert!(!out.contains_key("roastingDate"));
        assert!(!out.contains_key("title"));
    }
}
