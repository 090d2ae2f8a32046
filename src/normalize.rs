/// Per-field repair/derivation rules applied to an incoming request record.
///
/// Every function here mutates a `serde_json::Value` in place and returns the derived scalar,
/// mirroring the `processor_setup_*` family in the upstream importer-processor: malformed or
/// missing fields are repaired with a documented default rather than rejected (SPEC_FULL.md §7
/// "malformed field").
use serde_json::{json, Value};

use crate::config::ProcessorConfig;
use crate::increments::OTHER_TIME_RESOURCES;

/// Reads `action` (falling back to `logjam_action`), repairs it into a canonical
/// `"Controller#method"` shape, and stores it under `page`.
pub fn setup_page(record: &mut Value) -> String {
    let obj = record.as_object_mut().expect("record must be a JSON object");

    let raw = obj
        .remove("action")
        .or_else(|| obj.remove("logjam_action"))
        .and_then(|v| v.as_str().map(|s| s.to_string()))
        .unwrap_or_else(|| "Unknown#unknown_method".to_string());

    let page = repair_page(&raw);
    obj.insert("page".to_string(), json!(page));
    page
}

/// Same page-derivation as [`setup_page`], but only ever reads `logjam_action` (used by the
/// JS-exception pipeline, which has no `action` field to prefer).
pub fn setup_page_from_logjam_action(record: &mut Value) -> String {
    let obj = record.as_object_mut().expect("record must be a JSON object");
    let raw = obj
        .remove("logjam_action")
        .and_then(|v| v.as_str().map(|s| s.to_string()))
        .unwrap_or_else(|| "Unknown#unknown_method".to_string());
    let page = repair_page(&raw);
    obj.insert("page".to_string(), json!(page));
    page
}

fn repair_page(raw: &str) -> String {
    if raw.is_empty() {
        "Unknown#unknown_method".to_string()
    } else if !raw.contains('#') {
        format!("{}#unknown_method", raw)
    } else if raw.ends_with('#') {
        format!("{}unknown_method", raw)
    } else {
        raw.to_string()
    }
}

/// Derives the module namespace for `page` and interns it via `store`.
///
/// Rule: if `page` contains a `:` that isn't the first character, the module is
/// `"::" + page[..first_colon]`. Otherwise, if `page` contains a `#`, the module is
/// `"::" + page[..first_hash]`. Otherwise the module stays `"::"`.
pub fn setup_module(store: &mut crate::store::AggregationStore, page: &str) -> std::sync::Arc<str> {
    let module_body: &str = match page.find(':') {
        Some(idx) if idx != 0 => &page[..idx],
        _ => match page.find('#') {
            Some(idx) => &page[..idx],
            None => "",
        },
    };
    store.setup_module(&format!("::{}", module_body))
}

/// Reads `code` (default 500), removes it, and stores the result under `response_code`.
pub fn setup_response_code(record: &mut Value) -> i64 {
    let obj = record.as_object_mut().expect("record must be a JSON object");
    let code = obj.remove("code").and_then(|v| v.as_i64()).unwrap_or(500);
    obj.insert("response_code".to_string(), json!(code));
    code
}

/// Severity extraction. If `severity` is absent, scans `lines` (`[[level, message], ...]`)
/// for the maximum level seen. A level greater than 5 is treated as unknown/malformed and
/// the default of 1 is used instead — preserved verbatim from the upstream behavior rather
/// than clamped, since downstream consumers rely on the "5 means highest known, else default"
/// contract.
pub fn setup_severity(record: &mut Value) -> i64 {
    let obj = record.as_object_mut().expect("record must be a JSON object");

    let severity = if let Some(existing) = obj.get("severity").and_then(|v| v.as_i64()) {
        existing
    } else {
        let extracted = obj
            .get("lines")
            .and_then(|v| v.as_array())
            .and_then(|lines| {
                lines
                    .iter()
                    .filter_map(|line| line.as_array().and_then(|l| l.first()).and_then(|v| v.as_i64()))
                    .max()
            });
        match extracted {
            Some(level) if level <= 5 => level,
            _ => 1,
        }
    };

    obj.insert("severity".to_string(), json!(severity));
    severity
}

/// Derives `minute` (0..=1439) from byte offsets 11-12 (hours) and 14-15 (minutes) of
/// `started_at`. `started_at`'s overall validity is assumed to have been checked upstream;
/// this only indexes into the expected positions.
pub fn setup_minute(record: &mut Value) -> i64 {
    let obj = record.as_object_mut().expect("record must be a JSON object");
    let minute = obj
        .get("started_at")
        .and_then(|v| v.as_str())
        .and_then(|s| {
            let bytes = s.as_bytes();
            if bytes.len() < 16 {
                return None;
            }
            let hours: i64 = std::str::from_utf8(&bytes[11..13]).ok()?.parse().ok()?;
            let minutes: i64 = std::str::from_utf8(&bytes[14..16]).ok()?.parse().ok()?;
            Some(60 * hours + minutes)
        })
        .unwrap_or(0);
    obj.insert("minute".to_string(), json!(minute));
    minute
}

/// Reads `time_name` (default/substitute 1.0 when missing or zero), writes it back, and
/// optionally duplicates it into `duplicate`.
pub fn setup_time(record: &mut Value, time_name: &str, duplicate: Option<&str>) -> f64 {
    let obj = record.as_object_mut().expect("record must be a JSON object");

    let existing = obj.get(time_name).and_then(|v| v.as_f64());
    let total_time = match existing {
        Some(v) if v != 0.0 => v,
        _ => 1.0,
    };
    obj.insert(time_name.to_string(), json!(total_time));
    if let Some(dup) = duplicate {
        obj.insert(dup.to_string(), json!(total_time));
    }
    total_time
}

/// `other_time = total_time - sum(known time resources present in the record)`.
pub fn setup_other_time(record: &mut Value, total_time: f64) -> f64 {
    let obj = record.as_object_mut().expect("record must be a JSON object");
    let mut other_time = total_time;
    for resource in OTHER_TIME_RESOURCES {
        if let Some(v) = obj.get(*resource).and_then(|v| v.as_f64()) {
            other_time -= v;
        }
    }
    obj.insert("other_time".to_string(), json!(other_time));
    other_time
}

/// `allocated_memory = allocated_bytes + 40 * allocated_objects`, only when `allocated_memory`
/// is absent and both source fields are present.
pub fn setup_allocated_memory(record: &mut Value) {
    let obj = record.as_object_mut().expect("record must be a JSON object");
    if obj.contains_key("allocated_memory") {
        return;
    }
    let Some(allocated_objects) = obj.get("allocated_objects").and_then(|v| v.as_i64()) else {
        return;
    };
    let Some(allocated_bytes) = obj.get("allocated_bytes").and_then(|v| v.as_i64()) else {
        return;
    };
    let allocated_memory = allocated_bytes + allocated_objects * 40;
    obj.insert("allocated_memory".to_string(), json!(allocated_memory));
}

/// Reads `heap_growth` (default 0). Not written back.
pub fn setup_heap_growth(record: &Value) -> i64 {
    record.get("heap_growth").and_then(|v| v.as_i64()).unwrap_or(0)
}

/// Removes `exceptions` if it is present and empty, returning `None` in that case; otherwise
/// returns the array.
pub fn setup_exceptions(record: &mut Value) -> Option<Vec<Value>> {
    setup_exception_field(record, "exceptions")
}

pub fn setup_soft_exceptions(record: &mut Value) -> Option<Vec<Value>> {
    setup_exception_field(record, "soft_exceptions")
}

fn setup_exception_field(record: &mut Value, field: &str) -> Option<Vec<Value>> {
    let obj = record.as_object_mut().expect("record must be a JSON object");
    match obj.get(field).and_then(|v| v.as_array()) {
        Some(arr) if arr.is_empty() => {
            obj.remove(field);
            None
        }
        Some(arr) => Some(arr.clone()),
        None => None,
    }
}

/// Extracts `request_info.url`, skips over a leading `scheme://host` prefix if present, and
/// returns the slice starting at the first `/` (possibly the empty suffix).
pub fn extract_request_path(record: &Value) -> Option<&str> {
    let url = record.get("request_info")?.get("url")?.as_str()?;
    let after_scheme = match url.find("://") {
        Some(idx) => &url[idx + 3..],
        None => url,
    };
    let path = match after_scheme.find('/') {
        Some(idx) => &after_scheme[idx..],
        None => "",
    };
    Some(path)
}

/// Validates `config`'s apdex attribute choice is reflected when deriving page apdex input;
/// exposed for callers that need to read, not just set, the active attribute name.
pub fn frontend_apdex_attribute_field(config: &ProcessorConfig) -> &'static str {
    match config.frontend_apdex_attribute() {
        crate::config::FrontendApdexAttribute::DomInteractive => "dom_interactive",
        crate::config::FrontendApdexAttribute::LoadEventEnd => "page_time",
    }
}
