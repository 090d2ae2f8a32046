/// Correlates backend requests with the frontend/ajax records that describe the same
/// browser-side page load.
///
/// Backend requests register their id under `"{stream_key}-{request_id}"`; a later frontend or
/// ajax record is only folded into the aggregates if it can find (and consume) a matching
/// registration (SPEC_FULL.md §4.6). Backed by `dashmap`, the same concurrent-map crate the
/// wider example pack reaches for when a counter or cache needs to be shared across workers
/// without a surrounding lock (see `driftdb-server`'s `PerformanceMonitor`).
use dashmap::DashMap;
use serde_json::Value;

#[derive(Debug, Default)]
pub struct RequestTracker {
    inflight: DashMap<String, ()>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `request_id` as having arrived on `stream_key`, so a later frontend/ajax
    /// record can be matched against it.
    pub fn register(&self, stream_key: &str, request_id: &str) {
        self.inflight.insert(tracker_key(stream_key, request_id), ());
    }

    /// Removes and reports whether a registration existed for `uuid` on `stream_key`.
    pub fn take(&self, stream_key: &str, uuid: &str) -> bool {
        self.inflight.remove(&tracker_key(stream_key, uuid)).is_some()
    }

    pub fn len(&self) -> usize {
        self.inflight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inflight.is_empty()
    }
}

fn tracker_key(stream_key: &str, uuid: &str) -> String {
    format!("{}-{}", stream_key, uuid)
}

/// A frontend/ajax record prefers its own `logjam_request_id`, falling back to `request_id`
/// when the former is absent.
pub fn extract_request_uuid(record: &Value) -> Option<&str> {
    record
        .get("logjam_request_id")
        .and_then(|v| v.as_str())
        .or_else(|| record.get("request_id").and_then(|v| v.as_str()))
}

/// A backend record only ever carries `request_id`.
pub fn extract_backend_request_id(record: &Value) -> Option<&str> {
    record.get("request_id").and_then(|v| v.as_str())
}

/// Looks up and consumes the tracker registration a frontend/ajax record should match.
/// Returns `false` (and leaves the tracker untouched) if the record carries no id, or if no
/// matching backend request was ever registered.
pub fn check_request_validity(tracker: &RequestTracker, stream_key: &str, record: &Value) -> bool {
    match extract_request_uuid(record) {
        Some(uuid) => tracker.take(stream_key, uuid),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registration_is_consumed_on_first_match() {
        let tracker = RequestTracker::new();
        tracker.register("orders", "abc-123");
        let record = json!({"request_id": "abc-123"});
        assert!(check_request_validity(&tracker, "orders", &record));
        assert!(!check_request_validity(&tracker, "orders", &record));
    }

    #[test]
    fn logjam_request_id_is_preferred_over_request_id() {
        let tracker = RequestTracker::new();
        tracker.register("orders", "preferred");
        let record = json!({"logjam_request_id": "preferred", "request_id": "other"});
        assert!(check_request_validity(&tracker, "orders", &record));
    }

    #[test]
    fn falls_back_to_request_id_when_logjam_request_id_missing() {
        let tracker = RequestTracker::new();
        tracker.register("orders", "fallback");
        let record = json!({"request_id": "fallback"});
        assert!(check_request_validity(&tracker, "orders", &record));
    }

    #[test]
    fn missing_uuid_never_matches() {
        let tracker = RequestTracker::new();
        let record = json!({});
        assert!(!check_request_validity(&tracker, "orders", &record));
    }

    #[test]
    fn registrations_are_scoped_per_stream() {
        let tracker = RequestTracker::new();
        tracker.register("orders", "shared-id");
        let record = json!({"request_id": "shared-id"});
        assert!(!check_request_validity(&tracker, "checkout", &record));
        assert!(check_request_validity(&tracker, "orders", &record));
    }
}
