/// Frontend navigation-timing decoder.
///
/// Parses the comma-separated `rts` field into the 16 (frontend) or 2 (ajax) raw timings
/// documented in SPEC_FULL.md §4.4, and reduces them to the derived durations downstream
/// consumers expect.
use serde_json::{json, Value};

use crate::error::FeMsgDropReason;

pub const NAVIGATION_START: usize = 0;
pub const FETCH_START: usize = 1;
pub const DOMAIN_LOOKUP_START: usize = 2;
pub const DOMAIN_LOOKUP_END: usize = 3;
pub const CONNECT_START: usize = 4;
pub const CONNECT_END: usize = 5;
pub const REQUEST_START: usize = 6;
pub const RESPONSE_START: usize = 7;
pub const RESPONSE_END: usize = 8;
pub const DOM_LOADING: usize = 9;
pub const DOM_INTERACTIVE: usize = 10;
pub const DOM_CONTENT_LOADED_EVENT_START: usize = 11;
pub const DOM_CONTENT_LOADED_EVENT_END: usize = 12;
pub const DOM_COMPLETE: usize = 13;
pub const LOAD_EVENT_START: usize = 14;
pub const LOAD_EVENT_END: usize = 15;
pub const NUM_FRONTEND_TIMINGS: usize = 16;
pub const NUM_AJAX_TIMINGS: usize = 2;

/// Parses a strictly-digits-and-commas `rts` string into exactly `expected_len` `i64`s.
fn parse_rts(rts: &str, expected_len: usize) -> Result<Vec<i64>, FeMsgDropReason> {
    let mut values = Vec::with_capacity(expected_len);
    for part in rts.split(',') {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(FeMsgDropReason::Corrupted);
        }
        let value: i64 = part.parse().map_err(|_| FeMsgDropReason::Corrupted)?;
        values.push(value);
    }
    if values.len() != expected_len {
        return Err(FeMsgDropReason::Corrupted);
    }
    Ok(values)
}

/// Decodes the 16-value frontend `rts` field, canonicalizes it relative to navigation start,
/// validates monotonicity, and writes the derived durations back into `record`.
///
/// Returns `Ok(())` when the record was folded into aggregates, or the drop reason otherwise.
pub fn decode_frontend_timings(record: &mut Value) -> Result<(), FeMsgDropReason> {
    let obj = record.as_object_mut().expect("record must be a JSON object");
    let rts = obj
        .get("rts")
        .and_then(|v| v.as_str())
        .ok_or(FeMsgDropReason::Corrupted)?
        .to_string();

    let mut timings = parse_rts(&rts, NUM_FRONTEND_TIMINGS)?;

    let mut base = timings[NAVIGATION_START];
    if base == 0 {
        base = timings[FETCH_START];
        timings[NAVIGATION_START] = base;
        if base == 0 {
            if timings.iter().all(|&t| t == 0) {
                return Err(FeMsgDropReason::NavTiming);
            }
            return Err(FeMsgDropReason::Invalid);
        }
    }

    for t in timings.iter_mut() {
        if *t > 0 {
            *t -= base;
        }
    }

    let milestones = [
        timings[NAVIGATION_START],
        timings[REQUEST_START],
        timings[RESPONSE_START],
        timings[RESPONSE_END],
        timings[DOM_COMPLETE],
    ];
    let ascending = milestones.windows(2).all(|w| w[0] <= w[1]);
    if !ascending || timings[NAVIGATION_START] < 0 || timings[DOM_INTERACTIVE] <= 0 {
        return Err(FeMsgDropReason::Invalid);
    }

    let navigation_time = timings[FETCH_START];
    let connect_time = timings[REQUEST_START] - timings[FETCH_START];
    let request_time = timings[RESPONSE_START] - timings[REQUEST_START];
    let response_time = timings[RESPONSE_END] - timings[RESPONSE_START];
    let processing_time = timings[DOM_COMPLETE] - timings[RESPONSE_END];
    let load_time = timings[LOAD_EVENT_END] - timings[DOM_COMPLETE];
    let page_time = timings[LOAD_EVENT_END];
    let dom_interactive = timings[DOM_INTERACTIVE];

    obj.insert("navigation_time".to_string(), json!(navigation_time));
    obj.insert("connect_time".to_string(), json!(connect_time));
    obj.insert("request_time".to_string(), json!(request_time));
    obj.insert("response_time".to_string(), json!(response_time));
    obj.insert("processing_time".to_string(), json!(processing_time));
    obj.insert("load_time".to_string(), json!(load_time));
    obj.insert("page_time".to_string(), json!(page_time));
    obj.insert("dom_interactive".to_string(), json!(dom_interactive));

    Ok(())
}

/// Decodes the 2-value ajax `rts` field (`[start, end]`) into `ajax_time`.
pub fn decode_ajax_timings(record: &mut Value) -> Result<(), FeMsgDropReason> {
    let obj = record.as_object_mut().expect("record must be a JSON object");
    let rts = obj
        .get("rts")
        .and_then(|v| v.as_str())
        .ok_or(FeMsgDropReason::Corrupted)?
        .to_string();

    let timings = parse_rts(&rts, NUM_AJAX_TIMINGS)?;
    let ajax_time = timings[1] - timings[0];
    if ajax_time < 0 {
        return Err(FeMsgDropReason::Invalid);
    }
    obj.insert("ajax_time".to_string(), json!(ajax_time));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s5_frontend_timing_derivation() {
        let mut record = json!({
            "rts": "100,100,110,110,120,120,140,160,180,190,200,210,220,230,240,300",
        });
        decode_frontend_timings(&mut record).unwrap();
        assert_eq!(record["page_time"], json!(200));
        assert_eq!(record["navigation_time"], json!(0));
        assert_eq!(record["connect_time"], json!(40));
        assert_eq!(record["request_time"], json!(20));
        assert_eq!(record["response_time"], json!(20));
        assert_eq!(record["processing_time"], json!(50));
        assert_eq!(record["load_time"], json!(70));
        assert_eq!(record["dom_interactive"], json!(100));
    }

    #[test]
    fn s6_ajax_negative_is_invalid() {
        let mut record = json!({"rts": "500,400"});
        assert_eq!(decode_ajax_timings(&mut record), Err(FeMsgDropReason::Invalid));
    }

    #[test]
    fn all_zero_timings_is_nav_timing() {
        let rts = vec!["0"; NUM_FRONTEND_TIMINGS].join(",");
        let mut record = json!({"rts": rts});
        assert_eq!(decode_frontend_timings(&mut record), Err(FeMsgDropReason::NavTiming));
    }

    #[test]
    fn missing_rts_is_corrupted() {
        let mut record = json!({});
        assert_eq!(decode_frontend_timings(&mut record), Err(FeMsgDropReason::Corrupted));
    }

    #[test]
    fn non_digit_rts_is_corrupted() {
        let mut record = json!({"rts": "1,2,x,4"});
        assert_eq!(decode_ajax_timings(&mut record), Err(FeMsgDropReason::Corrupted));
    }

    #[test]
    fn ajax_non_negative_is_accepted() {
        let mut record = json!({"rts": "100,350"});
        decode_ajax_timings(&mut record).unwrap();
        assert_eq!(record["ajax_time"], json!(250));
    }
}
