/// Per-stream configuration and the downstream collaborators a [`crate::processor::Processor`]
/// talks to.
///
/// `StreamInfo` is the Rust shape of the upstream `stream_info_t`: everything a stream's
/// configuration file supplies, plus the handles (rate gate, outbound queue) a processor needs
/// to act on a record once it has decided to forward it. Loading stream configuration from
/// disk is an external collaborator's job (SPEC_FULL.md §6); this module only defines the
/// shape and the trait seams.
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::sampling::{NoRateLimit, RateGate, SamplingReason};

/// One stream's tunables and live collaborators.
#[derive(Debug)]
pub struct StreamInfo {
    pub key: String,
    /// Milliseconds. A backend request slower than this is "interesting" (see
    /// [`crate::sampling::slow_request`]), unless `module_thresholds` overrides it.
    pub import_threshold: f64,
    /// Per-module override thresholds, keyed by the module name without its leading `::`.
    pub module_thresholds: HashMap<String, f64>,
    /// A request whose `action` starts with one of these prefixes never gets a matching
    /// frontend/ajax record and is skipped during tracker registration.
    pub backend_only_requests: Vec<String>,
    /// When set, every request on this stream is treated as backend-only.
    pub all_requests_are_backend_only_requests: bool,
    /// Draw threshold (0..=[`crate::sampling::MAX_RANDOM`]) for the randomized 400-class /
    /// warn-severity sampling checks.
    pub sampling_rate_400s_threshold: u64,
    /// Current on-disk size of this stream's output, consulted by the throttling chain.
    pub storage_size: u64,
    /// Requests whose path starts with this prefix are ignored outright (not even counted).
    pub ignored_request_prefix: Option<String>,
    pub rate_gate: Box<dyn RateGate + Send + Sync>,
}

impl StreamInfo {
    pub fn new(key: String) -> Self {
        Self {
            key,
            import_threshold: f64::MAX,
            module_thresholds: HashMap::new(),
            backend_only_requests: Vec::new(),
            all_requests_are_backend_only_requests: false,
            sampling_rate_400s_threshold: crate::sampling::MAX_RANDOM,
            storage_size: 0,
            ignored_request_prefix: None,
            rate_gate: Box::new(NoRateLimit),
        }
    }
}

/// Which pipeline produced an [`OutboundMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    JsException,
    Event,
    Frontend,
    Ajax,
}

impl MessageKind {
    /// The single-character wire tag the upstream importer used for this message kind.
    pub fn tag(&self) -> &'static str {
        match self {
            MessageKind::Request => "r",
            MessageKind::JsException => "j",
            MessageKind::Event => "e",
            MessageKind::Frontend => "f",
            MessageKind::Ajax => "a",
        }
    }
}

/// A single forwarded record, ready to be handed to an [`OutboundQueue`].
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub db_name: String,
    pub kind: MessageKind,
    pub module: Arc<str>,
    pub record: Value,
    pub stream_key: String,
    /// Only set for [`MessageKind::Request`]; other kinds are always forwarded unconditionally.
    pub sampling_reason: Option<SamplingReason>,
}

/// The downstream sink a [`crate::processor::Processor`] forwards accepted records to.
///
/// A real implementation hands the message to a worker queue or writes it to a socket;
/// returning `Err` tells the processor the send failed so it can account for the drop instead
/// of counting the record as queued.
pub trait OutboundQueue: Send + Sync {
    fn send(&self, message: OutboundMessage) -> Result<(), OutboundQueueError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundQueueError(pub String);

impl std::fmt::Display for OutboundQueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "outbound queue send failed: {}", self.0)
    }
}

impl std::error::Error for OutboundQueueError {}

/// Optional sink for the raw per-request frontend-timing row (SPEC_FULL.md §4.4), mirroring
/// the upstream's `frontend_timings` CSV output. Most deployments don't need this; the default
/// no-op implementation below is what processors use unless a caller supplies their own.
pub trait FrontendTimingsSink: Send + Sync {
    fn record(&self, stream_key: &str, page: &str, timings: &Value);
}

#[derive(Debug, Default)]
pub struct NoopFrontendTimingsSink;

impl FrontendTimingsSink for NoopFrontendTimingsSink {
    fn record(&self, _stream_key: &str, _page: &str, _timings: &Value) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_stream_has_permissive_defaults() {
        let stream = StreamInfo::new("orders".to_string());
        assert_eq!(stream.storage_size, 0);
        assert!(!stream.rate_gate.is_tripped());
        assert_eq!(stream.sampling_rate_400s_threshold, crate::sampling::MAX_RANDOM);
    }

    #[test]
    fn message_kind_tags_match_the_wire_protocol() {
        assert_eq!(MessageKind::Request.tag(), "r");
        assert_eq!(MessageKind::JsException.tag(), "j");
        assert_eq!(MessageKind::Event.tag(), "e");
        assert_eq!(MessageKind::Frontend.tag(), "f");
        assert_eq!(MessageKind::Ajax.tag(), "a");
    }

    #[test]
    fn noop_sink_accepts_anything() {
        let sink = NoopFrontendTimingsSink;
        sink.record("orders", "Foo#bar", &serde_json::json!({}));
    }
}
