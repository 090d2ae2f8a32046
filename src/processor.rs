/// The five ingest pipelines, wired together from every other module in this crate.
///
/// A `Processor` is the Rust shape of the upstream `processor_state_t`: it owns one stream's
/// [`AggregationStore`] and is driven by exactly one worker (SPEC_FULL.md §5 "Concurrency &
/// Resource Model") — nothing in here is `Sync`, and nothing needs to be. Each `add_*` method
/// corresponds to one `processor_add_*` entry point upstream.
use std::sync::Arc;

use serde_json::Value;

use crate::config::ProcessorConfig;
use crate::error::FeMsgDropReason;
use crate::frontend;
use crate::increments::{self, Increment};
use crate::metrics;
use crate::normalize;
use crate::sampling::{self, RandomSource, SamplingInput, ThreadRandom};
use crate::store::{self, AggregationStore};
use crate::stream::{FrontendTimingsSink, MessageKind, NoopFrontendTimingsSink, OutboundMessage, OutboundQueue, StreamInfo};
use crate::tracker::{self, RequestTracker};

/// Everything a `Processor` needs but doesn't own outright: collaborators shared across every
/// stream's processor (the tracker correlates requests *across* streams, and the queue/sink
/// are wired to the same downstream regardless of which stream produced a record).
///
/// `frontend_timings_sink` is the typed replacement for the historic `frontend_timings` CSV:
/// it's a collaborator injected alongside the queue and tracker rather than a field on
/// `ProcessorConfig`, since `Box<dyn FrontendTimingsSink>` isn't `Clone` and `ProcessorConfig`
/// otherwise is (SPEC_FULL.md §9 "Global mutable sink").
pub struct ProcessorDeps {
    pub tracker: Arc<RequestTracker>,
    pub queue: Arc<dyn OutboundQueue>,
    pub frontend_timings_sink: Arc<dyn FrontendTimingsSink>,
}

impl ProcessorDeps {
    /// Convenience constructor for callers that don't need a `frontend_timings_sink`.
    pub fn new(tracker: Arc<RequestTracker>, queue: Arc<dyn OutboundQueue>) -> Self {
        Self { tracker, queue, frontend_timings_sink: Arc::new(NoopFrontendTimingsSink) }
    }
}

pub struct Processor {
    pub stream: Arc<StreamInfo>,
    pub db_name: String,
    pub config: ProcessorConfig,
    pub store: AggregationStore,
    pub request_count: u64,
    deps: ProcessorDeps,
    random: Box<dyn RandomSource + Send>,
}

impl Processor {
    pub fn new(stream: Arc<StreamInfo>, db_name: String, config: ProcessorConfig, deps: ProcessorDeps) -> Self {
        Self {
            stream,
            db_name,
            config,
            store: AggregationStore::new(),
            request_count: 0,
            deps,
            random: Box::new(ThreadRandom),
        }
    }

    /// Swaps in a deterministic random source, for tests that need reproducible sampling and
    /// throttling decisions.
    pub fn with_random_source(mut self, random: Box<dyn RandomSource + Send>) -> Self {
        self.random = random;
        self
    }

    fn queue_send(&self, kind: MessageKind, module: Arc<str>, record: Value, sampling_reason: Option<sampling::SamplingReason>) {
        let message = OutboundMessage {
            db_name: self.db_name.clone(),
            kind,
            module,
            record,
            stream_key: self.stream.key.clone(),
            sampling_reason,
        };
        match self.deps.queue.send(message) {
            Ok(()) => metrics::record_queued_insert(&self.stream.key, kind.tag()),
            Err(err) => tracing::warn!(stream = %self.stream.key, kind = kind.tag(), %err, "outbound send failed"),
        }
    }

    /// Folds `inc` into `page`, `module` and the synthetic `all_pages` namespace's totals and
    /// per-minute maps.
    fn fold_totals_and_minutes(&mut self, page: &str, module: &str, minute: i64, inc: &Increment) {
        self.store.add_totals(page, inc);
        self.store.add_totals(module, inc);
        self.store.add_totals(store::ALL_PAGES_NAMESPACE, inc);

        self.store.add_minutes(page, minute, inc);
        self.store.add_minutes(module, minute, inc);
        self.store.add_minutes(store::ALL_PAGES_NAMESPACE, minute, inc);
    }

    /// Bumps the quantile-approximation buckets for every non-zero resource `inc` carries,
    /// under both `namespace` and `all_pages`. Historic quirk: the `'m'` (memory) kind divides
    /// `allocated_bytes` by 1024 before bucketing, then re-scales the bucket back up, so
    /// stored bucket boundaries stay byte-denominated (SPEC_FULL.md §4.3).
    fn add_quants(&mut self, namespace: &str, inc: &Increment) {
        for i in 0..=increments::LAST_RESOURCE_OFFSET {
            let val = inc.metrics[i].val;
            if val <= 0.0 {
                continue;
            }
            let Some((kind, bucket)) = resource_quant(i, val) else { continue };
            self.store.add_quant(namespace, kind, bucket, i);
            self.store.add_quant(store::ALL_PAGES_NAMESPACE, kind, bucket, i);
        }
    }

    fn add_histograms(&mut self, page: &str, module: &str, minute: i64, resource: &str, inc: &Increment) {
        let index = resource_index(resource);
        let value = inc.metrics[index].val.max(0.0) as u64;
        self.store.add_histogram(page, minute, resource, value);
        self.store.add_histogram(module, minute, resource, value);
        self.store.add_histogram(store::ALL_PAGES_NAMESPACE, minute, resource, value);
    }

    fn record_backend_agent(&mut self, record: &Value) {
        if let Some(agent) = extract_backend_agent(record) {
            self.store.agent_mut(agent).received_backend += 1;
        }
    }

    fn record_frontend_agent(&mut self, record: &Value, reason: FeMsgDropReason) {
        if let Some(agent) = extract_frontend_agent(record) {
            let stats = self.store.agent_mut(agent);
            stats.received_frontend += 1;
            stats.record_drop(reason);
        }
        if reason != FeMsgDropReason::Accepted {
            metrics::record_frontend_drop(&self.stream.key, reason.as_str());
        }
    }

    /// `request#add_request`: full backend pipeline (SPEC_FULL.md §4.7.1).
    pub fn add_request(&mut self, mut record: Value) {
        self.request_count += 1;

        let path = normalize::extract_request_path(&record).map(str::to_string);
        if ignore_request(&record, path.as_deref(), &self.stream) {
            return;
        }

        let page = normalize::setup_page(&mut record);
        let module = normalize::setup_module(&mut self.store, &page);
        let response_code = normalize::setup_response_code(&mut record);
        let severity = normalize::setup_severity(&mut record);
        let minute = normalize::setup_minute(&mut record);
        let total_time = normalize::setup_time(&mut record, "total_time", None);

        let exceptions = normalize::setup_exceptions(&mut record);
        let soft_exceptions = normalize::setup_soft_exceptions(&mut record);
        normalize::setup_other_time(&mut record, total_time);
        normalize::setup_allocated_memory(&mut record);
        let heap_growth = normalize::setup_heap_growth(&record);

        let mut inc = Increment::new();
        inc.backend_request_count = 1;
        inc.fill_metrics(&record);
        inc.fill_backend_apdex(total_time);
        inc.fill_response_code(response_code);
        inc.fill_severity(severity);
        fill_caller_and_sender_info(&mut inc, &record);
        if let Some(exceptions) = &exceptions {
            for name in exceptions.iter().filter_map(Value::as_str) {
                inc.add_exception(name);
            }
        }
        if let Some(soft_exceptions) = &soft_exceptions {
            for name in soft_exceptions.iter().filter_map(Value::as_str) {
                inc.add_soft_exception(name);
            }
        }

        self.fold_totals_and_minutes(&page, &module, minute, &inc);
        self.add_quants(&page, &inc);
        self.add_histograms(&page, &module, minute, "total_time", &inc);

        self.record_backend_agent(&record);

        if !sampling::backend_only_request(&page, &self.stream) {
            if let Some(request_id) = tracker::extract_backend_request_id(&record) {
                self.deps.tracker.register(&self.stream.key, request_id);
            }
        }

        let sampling_input = SamplingInput {
            total_time,
            severity,
            response_code,
            has_exceptions: exceptions.is_some(),
            heap_growth,
        };
        let reason = sampling::interesting_request(&sampling_input, &module, &self.stream, &self.config, self.random.as_mut());
        if reason.is_empty() {
            return;
        }

        let verdict = sampling::throttle_request(&self.stream, &self.config, self.random.as_mut());
        if verdict.is_throttled() {
            metrics::record_throttled_insert(&self.stream.key, verdict.as_str());
            return;
        }

        self.queue_send(MessageKind::Request, module, record, Some(reason));
    }

    /// `js_exception#add_js_exception` (SPEC_FULL.md §4.7.2).
    pub fn add_js_exception(&mut self, mut record: Value) {
        let page = normalize::setup_page_from_logjam_action(&mut record);
        let key = extract_jse_key(&record);
        if key.is_empty() {
            tracing::warn!("dropping js exception with empty description key");
            return;
        }

        let minute = normalize::setup_minute(&mut record);
        let module = normalize::setup_module(&mut self.store, &page);

        let mut inc = Increment::new();
        inc.add_js_exception(&key);

        self.store.add_totals(store::ALL_PAGES_NAMESPACE, &inc);
        self.store.add_minutes(store::ALL_PAGES_NAMESPACE, minute, &inc);

        if !page.contains("#unknown_method") {
            self.store.add_totals(&page, &inc);
            self.store.add_minutes(&page, minute, &inc);
        }
        if &*module != "Unknown" {
            self.store.add_totals(&module, &inc);
            self.store.add_minutes(&module, minute, &inc);
        }

        self.queue_send(MessageKind::JsException, module, record, None);
    }

    /// `event#add_event` (SPEC_FULL.md §4.7.5): no aggregation beyond the minute timestamp,
    /// always forwarded.
    pub fn add_event(&mut self, mut record: Value) {
        normalize::setup_minute(&mut record);
        let module: Arc<str> = Arc::from("");
        self.queue_send(MessageKind::Event, module, record, None);
    }

    /// `frontend#add_frontend_data` (SPEC_FULL.md §4.7.3).
    pub fn add_frontend_data(&mut self, mut record: Value) {
        let reason = self.process_frontend_data(&mut record);
        self.record_frontend_agent(&record, reason);
        if reason == FeMsgDropReason::Accepted {
            let page = record.get("page").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let module = normalize::setup_module(&mut self.store, &page);
            self.queue_send(MessageKind::Frontend, module, record, None);
        }
    }

    fn process_frontend_data(&mut self, record: &mut Value) -> FeMsgDropReason {
        if let Err(reason) = frontend::decode_frontend_timings(record) {
            return reason;
        }
        if !tracker::check_request_validity(&self.deps.tracker, &self.stream.key, record) {
            return FeMsgDropReason::Invalid;
        }

        let page = normalize::setup_page(record);
        let module = normalize::setup_module(&mut self.store, &page);
        let minute = normalize::setup_minute(record);
        let total_time = normalize::setup_time(record, "page_time", Some("frontend_time"));

        if total_time > self.config.fe_msg_outlier_threshold_ms {
            return FeMsgDropReason::Outlier;
        }

        let page_apdex_field = normalize::frontend_apdex_attribute_field(&self.config);
        let page_apdex_value = record.get(page_apdex_field).and_then(|v| v.as_f64()).unwrap_or(total_time);

        let mut inc = Increment::new();
        inc.page_request_count = 1;
        inc.fill_metrics(record);
        inc.fill_frontend_apdex(total_time);
        inc.fill_page_apdex(page_apdex_value);

        self.fold_totals_and_minutes(&page, &module, minute, &inc);
        self.add_quants(&page, &inc);
        self.add_histograms(&page, &module, minute, "page_time", &inc);

        self.record_frontend_timings_row(&page, record);

        FeMsgDropReason::Accepted
    }

    /// Writes one row to the configured [`FrontendTimingsSink`] for an accepted frontend
    /// record: the seven derived milestone offsets plus the user-agent and raw `rts` string
    /// (SPEC_FULL.md §4.4's typed replacement for the historic `frontend_timings` CSV).
    fn record_frontend_timings_row(&self, page: &str, record: &Value) {
        let Some(user_agent) = extract_frontend_agent(record) else { return };
        let Some(rts) = record.get("rts").and_then(Value::as_str) else { return };
        let row = serde_json::json!({
            "navigation_time": record.get("navigation_time"),
            "connect_time": record.get("connect_time"),
            "request_time": record.get("request_time"),
            "response_time": record.get("response_time"),
            "processing_time": record.get("processing_time"),
            "load_time": record.get("load_time"),
            "page_time": record.get("page_time"),
            "user_agent": user_agent,
            "rts": rts,
        });
        self.deps.frontend_timings_sink.record(&self.stream.key, page, &row);
    }

    /// `ajax#add_ajax_data` (SPEC_FULL.md §4.7.4). Note the asymmetry with the frontend
    /// pipeline: a tracker miss here is `Illegal`, not `Invalid`.
    pub fn add_ajax_data(&mut self, mut record: Value) {
        let reason = self.process_ajax_data(&mut record);
        self.record_frontend_agent(&record, reason);
        if reason == FeMsgDropReason::Accepted {
            let page = record.get("page").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let module = normalize::setup_module(&mut self.store, &page);
            self.queue_send(MessageKind::Ajax, module, record, None);
        }
    }

    fn process_ajax_data(&mut self, record: &mut Value) -> FeMsgDropReason {
        if let Err(reason) = frontend::decode_ajax_timings(record) {
            return reason;
        }
        if !tracker::check_request_validity(&self.deps.tracker, &self.stream.key, record) {
            return FeMsgDropReason::Illegal;
        }

        let page = normalize::setup_page(record);
        let module = normalize::setup_module(&mut self.store, &page);
        let minute = normalize::setup_minute(record);
        let total_time = normalize::setup_time(record, "ajax_time", Some("frontend_time"));

        if total_time > self.config.fe_msg_outlier_threshold_ms {
            return FeMsgDropReason::Outlier;
        }

        let mut inc = Increment::new();
        inc.ajax_request_count = 1;
        inc.fill_metrics(record);
        inc.fill_frontend_apdex(total_time);
        inc.fill_ajax_apdex(total_time);

        self.fold_totals_and_minutes(&page, &module, minute, &inc);
        self.add_quants(&page, &inc);
        self.add_histograms(&page, &module, minute, "ajax_time", &inc);

        FeMsgDropReason::Accepted
    }
}

/// `ignore_request`: drops records flagged `logjam_ignore_message: true`, or whose path starts
/// with the stream's configured ignore prefix. Ignored records are dropped before anything is
/// aggregated — not even an agent stat is recorded for them.
fn ignore_request(record: &Value, path: Option<&str>, stream: &StreamInfo) -> bool {
    if record.get("logjam_ignore_message").and_then(Value::as_bool).unwrap_or(false) {
        return true;
    }
    match (path, &stream.ignored_request_prefix) {
        (Some(path), Some(prefix)) => path.starts_with(prefix.as_str()),
        _ => false,
    }
}

/// Backend requests carry their user agent under `request_info.headers["User-Agent"]`.
fn extract_backend_agent(record: &Value) -> Option<&str> {
    record.get("request_info")?.get("headers")?.get("User-Agent")?.as_str()
}

/// Frontend/ajax records carry their user agent at the top level.
fn extract_frontend_agent(record: &Value) -> Option<&str> {
    record.get("user_agent")?.as_str()
}

/// `description`, defaulting to `"unknown_exception"` when absent (but not when present-and-empty
/// — an empty description is a deliberate drop signal, handled by the caller).
fn extract_jse_key(record: &Value) -> String {
    match record.get("description").and_then(Value::as_str) {
        Some(description) => description.to_string(),
        None => "unknown_exception".to_string(),
    }
}

/// Caller/sender attribution isn't documented anywhere in the retrieved upstream source beyond
/// its call sites; `caller_id`/`sender_id` are the two fields every other pipeline's "who made
/// this request" convention uses, so that's what gets folded here (see DESIGN.md).
fn fill_caller_and_sender_info(inc: &mut Increment, record: &Value) {
    if let Some(caller) = record.get("caller_id").and_then(Value::as_str) {
        inc.add_caller(caller);
    }
    if let Some(sender) = record.get("sender_id").and_then(Value::as_str) {
        inc.add_sender(sender);
    }
}

/// Maps a resource index to its quant `(kind, bucket)`, or `None` if the resource isn't
/// quantile-tracked at all (SPEC_FULL.md §4.3's bucket-kind table).
///
/// The `val / d` division happens in `f64` before bucketing, matching the original C's
/// floating-point division (`importer-processor.c`'s quant insertion) — truncating to an
/// integer first would misbucket non-multiple-of-`d` values (SPEC_FULL.md §4.3 "preserve
/// exactly").
fn resource_quant(index: usize, val: f64) -> Option<(char, u64)> {
    let raw = val.max(0.0);
    if index <= increments::LAST_TIME_RESOURCE_OFFSET {
        Some(('t', crate::buckets::find_bucket(raw) as u64))
    } else if index == increments::ALLOCATED_OBJECTS_INDEX {
        Some(('m', crate::buckets::find_bucket(raw) as u64))
    } else if index == increments::ALLOCATED_BYTES_INDEX {
        let scaled = raw / 1024.0;
        Some(('m', (crate::buckets::find_bucket(scaled) * 1024.0) as u64))
    } else if index > increments::LAST_HEAP_RESOURCE_OFFSET && index <= increments::LAST_FRONTEND_RESOURCE_OFFSET {
        Some(('f', crate::buckets::find_bucket(raw) as u64))
    } else {
        None
    }
}

fn resource_index(name: &str) -> usize {
    increments::ALL_RESOURCES
        .iter()
        .position(|&candidate| candidate == name)
        .unwrap_or_else(|| panic!("unknown resource: {}", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct CollectingQueue {
        sent: Mutex<Vec<OutboundMessage>>,
    }

    impl CollectingQueue {
        fn new() -> Self {
            Self { sent: Mutex::new(Vec::new()) }
        }

        fn drain(&self) -> Vec<OutboundMessage> {
            std::mem::take(&mut self.sent.lock().unwrap())
        }
    }

    impl OutboundQueue for CollectingQueue {
        fn send(&self, message: OutboundMessage) -> Result<(), crate::stream::OutboundQueueError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
    }

    fn test_processor() -> (Processor, Arc<CollectingQueue>) {
        let queue = Arc::new(CollectingQueue::new());
        let deps = ProcessorDeps::new(Arc::new(RequestTracker::new()), queue.clone());
        let stream = Arc::new(StreamInfo::new("test-stream".to_string()));
        let processor = Processor::new(stream, "test_db".to_string(), ProcessorConfig::default(), deps)
            .with_random_source(Box::new(sampling::FixedRandom(0)));
        (processor, queue)
    }

    #[test]
    fn s7_request_forwarded_on_500_with_sampling_reason() {
        let (mut processor, queue) = test_processor();
        let record = json!({
            "action": "Orders#show",
            "code": 500,
            "started_at": "2024-01-02T03:04:05Z",
            "total_time": 42.0,
            "request_info": {"url": "/orders/1"},
        });
        processor.add_request(record);
        let sent = queue.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, MessageKind::Request);
        assert!(sent[0].sampling_reason.unwrap().contains(sampling::SamplingReason::RESPONSE_500));
        assert_eq!(processor.store.totals("::Orders").unwrap().backend_request_count, 1);
        assert_eq!(processor.store.totals(store::ALL_PAGES_NAMESPACE).unwrap().backend_request_count, 1);
    }

    #[test]
    fn uninteresting_request_is_aggregated_but_not_forwarded() {
        let (mut processor, queue) = test_processor();
        let record = json!({
            "action": "Orders#show",
            "code": 200,
            "started_at": "2024-01-02T03:04:05Z",
            "total_time": 5.0,
            "request_info": {"url": "/orders/1"},
        });
        processor.add_request(record);
        assert!(queue.drain().is_empty());
        assert_eq!(processor.store.totals("::Orders").unwrap().backend_request_count, 1);
    }

    #[test]
    fn ignored_request_prefix_drops_before_any_aggregation() {
        let (mut processor, queue) = test_processor();
        let mut stream = StreamInfo::new("test-stream".to_string());
        stream.ignored_request_prefix = Some("/health".to_string());
        processor.stream = Arc::new(stream);
        let record = json!({
            "action": "Health#check",
            "code": 200,
            "total_time": 900.0,
            "request_info": {"url": "/health/check"},
        });
        processor.add_request(record);
        assert!(queue.drain().is_empty());
        assert!(processor.store.totals(store::ALL_PAGES_NAMESPACE).is_none());
    }

    #[test]
    fn backend_only_request_skips_tracker_registration() {
        let (mut processor, _queue) = test_processor();
        let mut stream = StreamInfo::new("test-stream".to_string());
        stream.all_requests_are_backend_only_requests = true;
        processor.stream = Arc::new(stream);
        let record = json!({
            "action": "Health#check",
            "code": 200,
            "total_time": 1.0,
            "request_id": "abc-1",
        });
        processor.add_request(record);
        assert!(!tracker::check_request_validity(&processor.deps.tracker, "test-stream", &json!({"request_id": "abc-1"})));
    }

    #[test]
    fn js_exception_folds_into_all_pages_and_forwards() {
        let (mut processor, queue) = test_processor();
        let record = json!({
            "logjam_action": "Foo::Bar#show",
            "description": "BoomError",
            "started_at": "2024-01-02T03:04:05Z",
        });
        processor.add_js_exception(record);
        let sent = queue.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, MessageKind::JsException);
        assert_eq!(processor.store.totals(store::ALL_PAGES_NAMESPACE).unwrap().js_exceptions["BoomError"], 1);
        assert_eq!(processor.store.totals("Foo::Bar#show").unwrap().js_exceptions["BoomError"], 1);
    }

    #[test]
    fn js_exception_with_empty_description_is_dropped() {
        let (mut processor, queue) = test_processor();
        let record = json!({"logjam_action": "Foo::Bar#show", "description": ""});
        processor.add_js_exception(record);
        assert!(queue.drain().is_empty());
        assert!(processor.store.totals(store::ALL_PAGES_NAMESPACE).is_none());
    }

    #[test]
    fn event_pipeline_always_forwards() {
        let (mut processor, queue) = test_processor();
        processor.add_event(json!({"started_at": "2024-01-02T03:04:05Z"}));
        let sent = queue.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, MessageKind::Event);
    }

    #[test]
    fn frontend_data_dropped_as_invalid_without_tracker_match() {
        let (mut processor, queue) = test_processor();
        let record = json!({
            "rts": "100,100,110,110,120,120,140,160,180,190,200,210,220,230,240,300",
            "request_id": "unregistered",
            "user_agent": "curl/8",
        });
        processor.add_frontend_data(record);
        assert!(queue.drain().is_empty());
        let stats = processor.store.agent("curl/8").unwrap();
        assert_eq!(stats.fe_drop_reasons[&FeMsgDropReason::Invalid], 1);
    }

    #[test]
    fn frontend_data_accepted_when_tracker_matches() {
        let (mut processor, queue) = test_processor();
        processor.deps.tracker.register("test-stream", "req-1");
        let record = json!({
            "rts": "100,100,110,110,120,120,140,160,180,190,200,210,220,230,240,300",
            "request_id": "req-1",
            "user_agent": "curl/8",
            "action": "Foo::Bar#show",
        });
        processor.add_frontend_data(record);
        let sent = queue.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, MessageKind::Frontend);
        let stats = processor.store.agent("curl/8").unwrap();
        assert_eq!(stats.fe_drop_reasons[&FeMsgDropReason::Accepted], 1);
        assert_eq!(stats.fe_dropped, 0);
    }

    struct CollectingSink {
        rows: Mutex<Vec<(String, String, serde_json::Value)>>,
    }

    impl crate::stream::FrontendTimingsSink for CollectingSink {
        fn record(&self, stream_key: &str, page: &str, timings: &Value) {
            self.rows.lock().unwrap().push((stream_key.to_string(), page.to_string(), timings.clone()));
        }
    }

    #[test]
    fn frontend_data_accepted_writes_a_frontend_timings_row() {
        let queue = Arc::new(CollectingQueue::new());
        let sink = Arc::new(CollectingSink { rows: Mutex::new(Vec::new()) });
        let deps = ProcessorDeps {
            tracker: Arc::new(RequestTracker::new()),
            queue: queue.clone(),
            frontend_timings_sink: sink.clone(),
        };
        let stream = Arc::new(StreamInfo::new("test-stream".to_string()));
        let mut processor = Processor::new(stream, "test_db".to_string(), ProcessorConfig::default(), deps)
            .with_random_source(Box::new(sampling::FixedRandom(0)));
        processor.deps.tracker.register("test-stream", "req-1");
        let record = json!({
            "rts": "100,100,110,110,120,120,140,160,180,190,200,210,220,230,240,300",
            "request_id": "req-1",
            "user_agent": "curl/8",
            "action": "Foo::Bar#show",
        });
        processor.add_frontend_data(record);

        let rows = sink.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        let (stream_key, page, timings) = &rows[0];
        assert_eq!(stream_key, "test-stream");
        assert_eq!(page, "Foo::Bar#show");
        assert_eq!(timings["page_time"], json!(200));
        assert_eq!(timings["user_agent"], json!("curl/8"));
        assert_eq!(timings["rts"], json!("100,100,110,110,120,120,140,160,180,190,200,210,220,230,240,300"));
    }

    #[test]
    fn ajax_tracker_miss_is_illegal_not_invalid() {
        let (mut processor, queue) = test_processor();
        let record = json!({"rts": "100,350", "request_id": "unregistered", "user_agent": "curl/8"});
        processor.add_ajax_data(record);
        assert!(queue.drain().is_empty());
        let stats = processor.store.agent("curl/8").unwrap();
        assert_eq!(stats.fe_drop_reasons[&FeMsgDropReason::Illegal], 1);
    }

    #[test]
    fn ajax_data_accepted_when_tracker_matches() {
        let (mut processor, queue) = test_processor();
        processor.deps.tracker.register("test-stream", "req-2");
        let record = json!({
            "rts": "100,350",
            "request_id": "req-2",
            "user_agent": "curl/8",
            "action": "Foo::Bar#show",
        });
        processor.add_ajax_data(record);
        let sent = queue.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, MessageKind::Ajax);
    }

    #[test]
    fn outlier_threshold_drops_frontend_data() {
        let (mut processor, queue) = test_processor();
        processor.deps.tracker.register("test-stream", "req-3");
        processor.config.fe_msg_outlier_threshold_ms = 1.0;
        let record = json!({
            "rts": "100,100,110,110,120,120,140,160,180,190,200,210,220,230,240,300",
            "request_id": "req-3",
            "user_agent": "curl/8",
        });
        processor.add_frontend_data(record);
        assert!(queue.drain().is_empty());
        let stats = processor.store.agent("curl/8").unwrap();
        assert_eq!(stats.fe_drop_reasons[&FeMsgDropReason::Outlier], 1);
    }
}
