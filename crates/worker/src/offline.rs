use anyhow::Context;
use chrono::{DateTime, Utc};
use otelms_core::extract::{count_matches, parse_calendar};
use serde_json::{json, Value};
use std::path::Path;

/// Selectors reported alongside an offline extraction, broadest first.
const DIAGNOSTIC_SELECTORS: &[&str] = &[
    "div.calendar_item",
    "div.calendar_item[resid]",
    ".calendar_booking_nam",
    ".calendar_booking_info",
];

pub fn extract_file(path: &Path, sample: usize, extra_selector: Option<&str>) -> anyhow::Result<Value> {
    let html = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    summarize(&html, Utc::now(), sample, extra_selector)
}

pub fn summarize(
    html: &str,
    now: DateTime<Utc>,
    sample: usize,
    extra_selector: Option<&str>,
) -> anyhow::Result<Value> {
    let extraction = parse_calendar(html, now);

    let mut selectors = serde_json::Map::new();
    for selector in DIAGNOSTIC_SELECTORS.iter().copied().chain(extra_selector) {
        selectors.insert(selector.to_string(), json!(count_matches(html, selector)?));
    }

    Ok(json!({
        "matched": extraction.matched,
        "data_points": extraction.records.len(),
        "duplicates": extraction.duplicates,
        "invalid": extraction.invalid,
        "extraction_rate": extraction.extraction_rate(),
        "selectors": selectors,
        "sample": extraction.records.iter().take(sample).collect::<Vec<_>>(),
    }))
}
