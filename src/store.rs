/// Keyed aggregation maps owned by a single [`crate::processor::Processor`].
///
/// Composite keys stay plain `String`s (not a typed tuple) for bit-for-bit interop with
/// downstream consumers of the historic encoding — see `SPEC_FULL.md` Design Notes.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::buckets::HISTOGRAM_SIZE;
use crate::error::FeMsgDropReason;
use crate::increments::{Increment, LAST_RESOURCE_OFFSET};

/// The synthetic namespace every record is additionally folded into.
pub const ALL_PAGES_NAMESPACE: &str = "all_pages";

/// Per-minute, per-resource, per-namespace distribution of raw values.
pub type Histogram = [u64; HISTOGRAM_SIZE];

/// Per-bucket, per-resource counts (quantile approximation).
pub type QuantRow = [u64; LAST_RESOURCE_OFFSET + 1];

/// Per-user-agent counters.
#[derive(Debug, Clone, Default)]
pub struct AgentStats {
    pub received_backend: u64,
    pub received_frontend: u64,
    pub fe_dropped: u64,
    pub fe_drop_reasons: HashMap<FeMsgDropReason, u64>,
}

impl AgentStats {
    pub fn record_drop(&mut self, reason: FeMsgDropReason) {
        *self.fe_drop_reasons.entry(reason).or_insert(0) += 1;
        if reason != FeMsgDropReason::Accepted {
            self.fe_dropped += 1;
        }
    }
}

/// Everything a [`crate::processor::Processor`] accumulates for one (stream, database) pair.
///
/// Deliberately a plain, non-thread-safe struct: a `Processor` is owned by exactly one
/// worker and never shared (SPEC_FULL.md §5).
#[derive(Debug, Default)]
pub struct AggregationStore {
    modules: HashSet<Arc<str>>,
    totals: HashMap<String, Increment>,
    minutes: HashMap<String, Increment>,
    quants: HashMap<String, QuantRow>,
    histograms: HashMap<String, Histogram>,
    agents: HashMap<String, AgentStats>,
}

impl AggregationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `module`, returning a cheap, stable handle shared by every caller that has
    /// seen this module string before.
    pub fn setup_module(&mut self, module: &str) -> Arc<str> {
        if let Some(existing) = self.modules.get(module) {
            return Arc::clone(existing);
        }
        let interned: Arc<str> = Arc::from(module);
        self.modules.insert(Arc::clone(&interned));
        interned
    }

    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(|m| m.as_ref())
    }

    pub fn add_totals(&mut self, namespace: &str, inc: &Increment) {
        self.totals
            .entry(namespace.to_string())
            .or_insert_with(Increment::new)
            .merge(inc);
    }

    pub fn totals(&self, namespace: &str) -> Option<&Increment> {
        self.totals.get(namespace)
    }

    pub fn add_minutes(&mut self, namespace: &str, minute: i64, inc: &Increment) {
        let key = format!("{}-{}", minute, namespace);
        self.minutes.entry(key).or_insert_with(Increment::new).merge(inc);
    }

    pub fn minutes(&self, namespace: &str, minute: i64) -> Option<&Increment> {
        self.minutes.get(&format!("{}-{}", minute, namespace))
    }

    /// `kind` is one of `'t'` (time), `'m'` (memory) or `'f'` (frontend); `bucket` is the
    /// pre-scaled boundary value (see `crate::store::quant_key` historic quirk).
    pub fn add_quant(&mut self, namespace: &str, kind: char, bucket: u64, resource_index: usize) {
        let key = format!("{}-{}-{}", kind, bucket, namespace);
        let row = self.quants.entry(key).or_insert([0; LAST_RESOURCE_OFFSET + 1]);
        row[resource_index] += 1;
    }

    pub fn quants(&self, namespace: &str, kind: char, bucket: u64) -> Option<&QuantRow> {
        self.quants.get(&format!("{}-{}-{}", kind, bucket, namespace))
    }

    /// Bumps the histogram bucket `find_bucket_index(value)` for `resource` at `minute` in
    /// `namespace`. Silently no-ops when `value == 0` (fail-soft, matching the historic
    /// behavior of skipping zero-driven histogram inserts).
    pub fn add_histogram(&mut self, namespace: &str, minute: i64, resource: &str, value: u64) {
        if value == 0 {
            tracing::warn!(resource, namespace, "skipping zero-valued histogram insert");
            return;
        }
        let key = format!("{}-{}-{}", minute, resource, namespace);
        let bucket_index = crate::buckets::find_bucket_index(value as f64);
        let histogram = self.histograms.entry(key).or_insert([0; HISTOGRAM_SIZE]);
        histogram[bucket_index] += 1;
    }

    pub fn histogram(&self, namespace: &str, minute: i64, resource: &str) -> Option<&Histogram> {
        self.histograms.get(&format!("{}-{}-{}", minute, resource, namespace))
    }

    pub fn agent_mut(&mut self, user_agent: &str) -> &mut AgentStats {
        self.agents.entry(user_agent.to_string()).or_default()
    }

    pub fn agent(&self, user_agent: &str) -> Option<&AgentStats> {
        self.agents.get(user_agent)
    }
}
