/// The increment vector folded into aggregates on every accepted record.
///
/// `importer-resources.h` (the upstream resource table) was not part of the retrieved C
/// source, so the resource menu below is reconstructed from the fields the pipelines in
/// SPEC_FULL.md §4 actually read and write. Indices are dense and contiguous: time
/// resources first, then the two heap resources, then the frontend-timing resources.
use std::collections::HashMap;

/// Resources whose value is a duration in milliseconds, tracked by [`Increment::metrics`].
pub const TIME_RESOURCES: &[&str] =
    &["total_time", "gc_time", "view_time", "db_time", "wait_time", "other_time"];
pub const LAST_TIME_RESOURCE_OFFSET: usize = TIME_RESOURCES.len() - 1;

/// Heap/memory resources.
pub const HEAP_RESOURCES: &[&str] = &["allocated_objects", "allocated_bytes"];
pub const ALLOCATED_OBJECTS_INDEX: usize = LAST_TIME_RESOURCE_OFFSET + 1;
pub const ALLOCATED_BYTES_INDEX: usize = LAST_TIME_RESOURCE_OFFSET + 2;
pub const LAST_HEAP_RESOURCE_OFFSET: usize = ALLOCATED_BYTES_INDEX;

/// Frontend-timing derived durations (see [`crate::frontend`]).
pub const FRONTEND_RESOURCES: &[&str] = &[
    "navigation_time",
    "connect_time",
    "request_time",
    "response_time",
    "processing_time",
    "load_time",
    "page_time",
    "ajax_time",
    "dom_interactive",
];
pub const LAST_FRONTEND_RESOURCE_OFFSET: usize = LAST_HEAP_RESOURCE_OFFSET + FRONTEND_RESOURCES.len();
pub const LAST_RESOURCE_OFFSET: usize = LAST_FRONTEND_RESOURCE_OFFSET;

/// Dense `index -> field name` table backing [`Increment::fill_metrics`], in the same order
/// as the offset constants above: time resources, then heap, then frontend.
pub const ALL_RESOURCES: &[&str] = &[
    "total_time",
    "gc_time",
    "view_time",
    "db_time",
    "wait_time",
    "other_time",
    "allocated_objects",
    "allocated_bytes",
    "navigation_time",
    "connect_time",
    "request_time",
    "response_time",
    "processing_time",
    "load_time",
    "page_time",
    "ajax_time",
    "dom_interactive",
];

/// `processor_setup_other_time` sums over this table.
pub const OTHER_TIME_RESOURCES: &[&str] = &["gc_time", "view_time", "db_time", "wait_time"];

/// A single resource slot: running total plus sum-of-squares (for variance/stddev).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceSlot {
    pub val: f64,
    pub val_squared: f64,
}

impl ResourceSlot {
    fn add(&mut self, v: f64) {
        self.val += v;
        self.val_squared += v * v;
    }
}

/// Apdex outcome bucket (Apdex-style satisfied/tolerating/frustrated split).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApdexBucket {
    pub satisfied: u64,
    pub tolerating: u64,
    pub frustrated: u64,
}

impl ApdexBucket {
    fn fill(&mut self, millis: f64) {
        if millis <= 100.0 {
            self.satisfied += 1;
        } else if millis <= 400.0 {
            self.tolerating += 1;
        } else {
            self.frustrated += 1;
        }
    }
}

/// The per-record delta folded into [`crate::store::AggregationStore`] maps.
///
/// `merge` (the `increments_add` equivalent) is commutative/associative; cloning produces an
/// independent deep copy, matching SPEC_FULL.md §3's invariants.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Increment {
    pub backend_request_count: u64,
    pub page_request_count: u64,
    pub ajax_request_count: u64,

    pub metrics: [ResourceSlot; LAST_RESOURCE_OFFSET + 1],

    pub backend_apdex: ApdexBucket,
    pub frontend_apdex: ApdexBucket,
    pub ajax_apdex: ApdexBucket,
    pub page_apdex: ApdexBucket,

    /// Index 0..=5 (0 = unused, 1..=5 map to severity levels; see [`crate::error`]).
    pub severity_histogram: [u64; 6],
    pub response_code_histogram: HashMap<i64, u64>,

    pub exceptions: HashMap<String, u64>,
    pub soft_exceptions: HashMap<String, u64>,
    pub js_exceptions: HashMap<String, u64>,
    pub caller_info: HashMap<String, u64>,
    pub sender_info: HashMap<String, u64>,
}

impl Increment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fill_metric(&mut self, index: usize, value: f64) {
        self.metrics[index].add(value);
    }

    pub fn fill_backend_apdex(&mut self, millis: f64) {
        self.backend_apdex.fill(millis);
    }

    pub fn fill_frontend_apdex(&mut self, millis: f64) {
        self.frontend_apdex.fill(millis);
    }

    pub fn fill_ajax_apdex(&mut self, millis: f64) {
        self.ajax_apdex.fill(millis);
    }

    pub fn fill_page_apdex(&mut self, millis: f64) {
        self.page_apdex.fill(millis);
    }

    pub fn fill_severity(&mut self, severity: i64) {
        if (0..self.severity_histogram.len() as i64).contains(&severity) {
            self.severity_histogram[severity as usize] += 1;
        }
    }

    pub fn fill_response_code(&mut self, code: i64) {
        *self.response_code_histogram.entry(code).or_insert(0) += 1;
    }

    pub fn add_exception(&mut self, name: &str) {
        *self.exceptions.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn add_soft_exception(&mut self, name: &str) {
        *self.soft_exceptions.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn add_js_exception(&mut self, name: &str) {
        *self.js_exceptions.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn add_caller(&mut self, name: &str) {
        *self.caller_info.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn add_sender(&mut self, name: &str) {
        *self.sender_info.entry(name.to_string()).or_insert(0) += 1;
    }

    /// Fills every known resource slot present (and non-zero) in `record`. Resource names and
    /// indices follow the dense table declared at the top of this module.
    pub fn fill_metrics(&mut self, record: &serde_json::Value) {
        for (index, name) in ALL_RESOURCES.iter().enumerate() {
            if let Some(value) = record.get(*name).and_then(|v| v.as_f64()) {
                if value > 0.0 {
                    self.fill_metric(index, value);
                }
            }
        }
    }

    /// Additive merge, used when folding this increment into a stored aggregate.
    pub fn merge(&mut self, other: &Increment) {
        self.backend_request_count += other.backend_request_count;
        self.page_request_count += other.page_request_count;
        self.ajax_request_count += other.ajax_request_count;

        for i in 0..=LAST_RESOURCE_OFFSET {
            self.metrics[i].val += other.metrics[i].val;
            self.metrics[i].val_squared += other.metrics[i].val_squared;
        }

        merge_apdex(&mut self.backend_apdex, &other.backend_apdex);
        merge_apdex(&mut self.frontend_apdex, &other.frontend_apdex);
        merge_apdex(&mut self.ajax_apdex, &other.ajax_apdex);
        merge_apdex(&mut self.page_apdex, &other.page_apdex);

        for i in 0..self.severity_histogram.len() {
            self.severity_histogram[i] += other.severity_histogram[i];
        }
        for (code, count) in &other.response_code_histogram {
            *self.response_code_histogram.entry(*code).or_insert(0) += count;
        }
        for (bag_self, bag_other) in [
            (&mut self.exceptions, &other.exceptions),
            (&mut self.soft_exceptions, &other.soft_exceptions),
            (&mut self.js_exceptions, &other.js_exceptions),
            (&mut self.caller_info, &other.caller_info),
            (&mut self.sender_info, &other.sender_info),
        ] {
            for (k, v) in bag_other {
                *bag_self.entry(k.clone()).or_insert(0) += v;
            }
        }
    }
}

fn merge_apdex(target: &mut ApdexBucket, other: &ApdexBucket) {
    target.satisfied += other.satisfied;
    target.tolerating += other.tolerating;
    target.frustrated += other.frustrated;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_is_elementwise_additive() {
        let mut a = Increment::new();
        a.backend_request_count = 2;
        a.fill_metric(0, 10.0);
        a.add_exception("Boom");

        let mut b = Increment::new();
        b.backend_request_count = 3;
        b.fill_metric(0, 5.0);
        b.add_exception("Boom");

        a.merge(&b);
        assert_eq!(a.backend_request_count, 5);
        assert_eq!(a.metrics[0].val, 15.0);
        assert_eq!(a.exceptions["Boom"], 2);
    }

    #[test]
    fn apdex_buckets_classify_correctly() {
        let mut inc = Increment::new();
        inc.fill_backend_apdex(50.0);
        inc.fill_backend_apdex(200.0);
        inc.fill_backend_apdex(1000.0);
        assert_eq!(
            inc.backend_apdex,
            ApdexBucket { satisfied: 1, tolerating: 1, frustrated: 1 }
        );
    }

    #[test]
    fn severity_out_of_range_is_ignored() {
        let mut inc = Increment::new();
        inc.fill_severity(99);
        assert_eq!(inc.severity_histogram.iter().sum::<u64>(), 0);
    }

    #[test]
    fn fill_metrics_skips_absent_and_non_positive_fields() {
        let record = serde_json::json!({"total_time": 12.5, "gc_time": 0.0, "allocated_bytes": 900});
        let mut inc = Increment::new();
        inc.fill_metrics(&record);
        assert_eq!(inc.metrics[0].val, 12.5);
        assert_eq!(inc.metrics[1].val, 0.0);
        assert_eq!(inc.metrics[ALLOCATED_BYTES_INDEX].val, 900.0);
    }

    #[test]
    fn clone_is_independent() {
        let mut a = Increment::new();
        a.backend_request_count = 1;
        let b = a.clone();
        a.backend_request_count += 1;
        assert_eq!(b.backend_request_count, 1);
    }
}
