use chrono::{TimeZone, Utc};
use otelms_core::extract::{count_matches, parse_calendar};
use std::collections::HashSet;

const FIXTURE: &str = include_str!("fixtures/calendar_116758.html");

#[test]
fn broad_selector_also_matches_nested_children() {
    assert_eq!(count_matches(FIXTURE, "div.calendar_item").unwrap(), 102);
    assert_eq!(count_matches(FIXTURE, "div.calendar_item[resid]").unwrap(), 51);
}

#[test]
fn every_booking_block_yields_a_record() {
    let at = Utc.with_ymd_and_hms(2026, 1, 27, 10, 0, 0).unwrap();
    let out = parse_calendar(FIXTURE, at);

    assert_eq!(out.matched, 51);
    assert_eq!(out.records.len(), 51);
    assert_eq!(out.duplicates, 0);
    assert_eq!(out.invalid, 0);
    assert_eq!(out.extraction_rate(), 1.0);

    let resids: HashSet<_> = out.records.iter().map(|r| r.resid.as_str()).collect();
    assert_eq!(resids.len(), 51);

    assert!(out
        .records
        .iter()
        .all(|r| !r.booking_id.is_empty() && !r.guest.is_empty() && !r.source.ends_with(',')));
}

#[test]
fn first_record_matches_markup() {
    let at = Utc.with_ymd_and_hms(2026, 1, 27, 10, 0, 0).unwrap();
    let out = parse_calendar(FIXTURE, at);
    let first = &out.records[0];

    assert_eq!(first.resid, "90029");
    assert_eq!(first.booking_id, "7209");
    assert_eq!(first.guest, "ლუკა Novak");
    assert_eq!(first.source, "Expedia");
    assert_eq!(first.balance, "80");
    assert_eq!(first.status, "3");
    assert_eq!(first.element_id, "cal_item_90029");
}
