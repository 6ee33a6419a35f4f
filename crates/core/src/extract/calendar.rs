//! Maps the rendered reservation calendar to [`BookingRecord`]s.
//!
//! Top-level bookings are `div.calendar_item` elements carrying a `resid`
//! attribute. The calendar also nests `div.calendar_item` children without
//! `resid` inside each booking block; those are never selected.

use crate::domain::booking::BookingRecord;
use crate::domain::utc_stamp;
use crate::selector;
use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub records: Vec<BookingRecord>,
    /// Elements matched by the booking selector.
    pub matched: usize,
    pub duplicates: usize,
    pub invalid: usize,
}

impl Extraction {
    pub fn extraction_rate(&self) -> f64 {
        if self.matched == 0 {
            return 0.0;
        }
        self.records.len() as f64 / self.matched as f64
    }
}

pub fn parse_calendar(html: &str, extracted_at: DateTime<Utc>) -> Extraction {
    let document = Html::parse_document(html);
    let stamp = utc_stamp(extracted_at);

    let mut out = Extraction::default();
    let mut seen = HashSet::<String>::new();

    for element in document.select(selector!("div.calendar_item[resid]")) {
        out.matched += 1;

        let attrs = element.value();
        let Some(resid) = attrs
            .attr("resid")
            .map(str::trim)
            .filter(|s| !s.is_empty())
        else {
            out.invalid += 1;
            continue;
        };

        if !seen.insert(resid.to_string()) {
            out.duplicates += 1;
            continue;
        }

        match parse_booking(element, resid, &stamp) {
            Some(record) => {
                tracing::debug!(
                    resid,
                    booking_id = %record.booking_id,
                    guest = %record.guest,
                    "extracted booking"
                );
                out.records.push(record);
            }
            None => {
                tracing::warn!(resid, "skipping calendar item: no booking id or guest found");
                out.invalid += 1;
            }
        }
    }

    tracing::info!(
        matched = out.matched,
        records = out.records.len(),
        duplicates = out.duplicates,
        invalid = out.invalid,
        "calendar extraction finished"
    );
    out
}

/// Number of elements in `html` matching an arbitrary CSS selector.
pub fn count_matches(html: &str, selector: &str) -> anyhow::Result<usize> {
    let parsed = Selector::parse(selector)
        .map_err(|e| anyhow::anyhow!("invalid selector {selector:?}: {e:?}"))?;
    Ok(Html::parse_document(html).select(&parsed).count())
}

fn parse_booking(element: ElementRef<'_>, resid: &str, extracted_at: &str) -> Option<BookingRecord> {
    let (booking_id, guest) = first_text(element, selector!(".calendar_booking_nam"))
        .map(|text| split_booking_name(&text))
        .unwrap_or_default();

    if booking_id.is_empty() && guest.is_empty() {
        return None;
    }

    let source = first_text(element, selector!(".calendar_booking_info"))
        .map(|text| text.trim_end_matches(',').trim_end().to_string())
        .unwrap_or_default();

    let balance = first_text(
        element,
        selector!(".balance_negative span, .balance_positive span"),
    )
    .unwrap_or_default();

    let attrs = element.value();
    Some(BookingRecord {
        resid: resid.to_string(),
        booking_id: if booking_id.is_empty() {
            resid.to_string()
        } else {
            booking_id
        },
        guest,
        source,
        balance,
        status: attrs.attr("status").unwrap_or_default().trim().to_string(),
        element_id: attrs.attr("id").unwrap_or_default().trim().to_string(),
        extracted_at: extracted_at.to_string(),
    })
}

/// Splits `"B:7296,  Guest Name, "` into `("7296", "Guest Name")`.
///
/// Only the segment between the first `B:` and any following `B:` is
/// considered; fewer than two comma-separated parts yields empty strings.
pub fn split_booking_name(text: &str) -> (String, String) {
    let Some(after_marker) = text.split("B:").nth(1) else {
        return Default::default();
    };

    let mut parts = after_marker.split(',');
    match (parts.next(), parts.next()) {
        (Some(id), Some(guest)) => (id.trim().to_string(), guest.trim().to_string()),
        _ => Default::default(),
    }
}

fn first_text(element: ElementRef<'_>, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .next()
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 27, 10, 0, 0).unwrap()
    }

    fn item(resid: &str, name: &str, info: &str, balance: &str) -> String {
        format!(
            r#"<div class="calendar_item" resid="{resid}" status="2" id="item_{resid}">
                 <div class="calendar_item inner">
                   <span class="calendar_booking_nam">{name}</span>
                   <span class="calendar_booking_info">{info}</span>
                   {balance}
                 </div>
               </div>"#
        )
    }

    fn page(items: &[String]) -> String {
        format!("<html><body><div id=\"calendar\">{}</div></body></html>", items.concat())
    }

    #[test]
    fn split_booking_name_handles_padding_and_trailing_comma() {
        assert_eq!(
            split_booking_name("B:7296,  ჯაბა პაშკოვსკი, "),
            ("7296".to_string(), "ჯაბა პაშკოვსკი".to_string())
        );
    }

    #[test]
    fn split_booking_name_requires_marker_and_two_parts() {
        assert_eq!(split_booking_name("7296, Guest"), Default::default());
        assert_eq!(split_booking_name("B:7296"), Default::default());
    }

    #[test]
    fn split_booking_name_ignores_text_after_second_marker() {
        assert_eq!(
            split_booking_name("B:1, First, B:2, Second"),
            ("1".to_string(), "First".to_string())
        );
    }

    #[test]
    fn extracts_all_fields_from_one_item() {
        let html = page(&[item(
            "88123",
            "B:7296,  ჯაბა პაშკოვსკი, ",
            "whatsapp 577250205, ",
            r#"<div class="balance_negative"><span> -120 </span></div>"#,
        )]);

        let out = parse_calendar(&html, at());
        assert_eq!(out.matched, 1);
        assert_eq!(out.records.len(), 1);

        let r = &out.records[0];
        assert_eq!(r.resid, "88123");
        assert_eq!(r.booking_id, "7296");
        assert_eq!(r.guest, "ჯაბა პაშკოვსკი");
        assert_eq!(r.source, "whatsapp 577250205");
        assert_eq!(r.balance, "-120");
        assert_eq!(r.status, "2");
        assert_eq!(r.element_id, "item_88123");
        assert_eq!(r.extracted_at, "2026-01-27T10:00:00.000000Z");
    }

    #[test]
    fn nested_items_without_resid_are_not_selected() {
        let html = page(&[
            item("1", "B:1, A, ", "direct, ", ""),
            item("2", "B:2, B, ", "direct, ", ""),
        ]);
        assert_eq!(count_matches(&html, "div.calendar_item").unwrap(), 4);
        assert_eq!(parse_calendar(&html, at()).matched, 2);
    }

    #[test]
    fn duplicate_resid_yields_one_record() {
        let html = page(&[
            item("5", "B:10, Guest, ", "", ""),
            item("5", "B:10, Guest, ", "", ""),
        ]);
        let out = parse_calendar(&html, at());
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.duplicates, 1);
    }

    #[test]
    fn item_without_name_or_id_is_skipped() {
        let html = page(&[item("9", "blocked", "maintenance, ", "")]);
        let out = parse_calendar(&html, at());
        assert!(out.records.is_empty());
        assert_eq!(out.invalid, 1);
        assert_eq!(out.extraction_rate(), 0.0);
    }

    #[test]
    fn empty_booking_id_falls_back_to_resid() {
        let html = page(&[item("77", "B:, Walk-in Guest, ", "", "")]);
        let out = parse_calendar(&html, at());
        assert_eq!(out.records[0].booking_id, "77");
        assert_eq!(out.records[0].guest, "Walk-in Guest");
        assert_eq!(out.records[0].balance, "");
    }

    #[test]
    fn blank_resid_is_counted_invalid() {
        let html = page(&[item("  ", "B:1, A, ", "", "")]);
        let out = parse_calendar(&html, at());
        assert_eq!(out.matched, 1);
        assert_eq!(out.invalid, 1);
    }

    #[test]
    fn positive_balance_is_read_too() {
        let html = page(&[item(
            "3",
            "B:3, C, ",
            "booking.com, ",
            r#"<div class="balance_positive"><span>0</span></div>"#,
        )]);
        assert_eq!(parse_calendar(&html, at()).records[0].balance, "0");
    }

    #[test]
    fn count_matches_rejects_bad_selector() {
        assert!(count_matches("<p></p>", "div[").is_err());
    }
}
