use cheesetrace_core::{DateRange, LotNumber};
use chrono::NaiveDate;

#[test]
fn every_date_in_a_month_yields_a_distinct_parseable_lot_number() {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).expect("start");
    let end = NaiveDate::from_ymd_opt(2024, 1, 31).expect("end");
    let range = DateRange::new(start, end).expect("range");

    let numbers: Vec<String> = range
        .dates()
        .map(|date| LotNumber::new("TAL", date).expect("lot").to_string())
        .collect();

    assert_eq!(numbers.len(), 31);
    let mut sorted = numbers.clone();
    sorted.dedup();
    assert_eq!(sorted.len(), 31);

    for (text, date) in numbers.iter().zip(range.dates()) {
        let parsed: LotNumber = text.parse().expect("parse");
        assert_eq!(parsed.date(), date);
        assert_eq!(parsed.prefix(), "TAL");
    }
}

#[test]
fn lot_number_serializes_as_plain_string() {
    let lot = LotNumber::parse("TAL-2024-03-09").expect("lot");
    let json = serde_json::to_string(&lot).expect("serialize");
    assert_eq!(json, "\"TAL-2024-03-09\"");
    let back: LotNumber = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, lot);
    assert!(serde_json::from_str::<LotNumber>("\"tal-2024-03-09\"").is_err());
}

#[test]
fn like_pattern_matches_prefix_convention() {
    assert_eq!(LotNumber::like_pattern("TAL"), "TAL-%");
}
