/// Which requests get forwarded downstream, and which get throttled before they are.
///
/// Mirrors the upstream importer-processor's `interesting_request`/`throttle_request`/
/// `slow_request` chain (SPEC_FULL.md §4.5): every accepted backend record is scored for
/// "interestingness" via a bitmask, and only interesting records are subject to the
/// storage-size/rate-limit throttling checks below.
use bitflags::bitflags;

use crate::config::ProcessorConfig;
use crate::stream::StreamInfo;

bitflags! {
    /// Reasons a backend request was forwarded downstream rather than only aggregated.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SamplingReason: u32 {
        const SLOW_REQUEST = 1 << 0;
        const LOG_SEVERITY = 1 << 1;
        const RESPONSE_500 = 1 << 2;
        const RESPONSE_400 = 1 << 3;
        const RESPONSE_000 = 1 << 4;
        const EXCEPTIONS   = 1 << 5;
        const HEAP_GROWTH  = 1 << 6;
    }
}

/// The full range a random draw is compared against. `RandomSource::sample` must return a
/// value uniformly distributed over `0..=MAX_RANDOM`.
pub const MAX_RANDOM: u64 = u64::MAX;

/// Injected randomness, so sampling decisions stay deterministic in tests.
pub trait RandomSource {
    fn sample(&mut self) -> u64;
}

/// The production [`RandomSource`], backed by `rand`'s thread-local generator.
#[derive(Debug, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn sample(&mut self) -> u64 {
        rand::random()
    }
}

/// A `RandomSource` that always returns the same value, for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(pub u64);

impl RandomSource for FixedRandom {
    fn sample(&mut self) -> u64 {
        self.0
    }
}

/// `threshold == MAX_RANDOM` always samples; otherwise a fresh draw must fall at or below it.
pub fn random_sample(random: &mut dyn RandomSource, threshold: u64) -> bool {
    if threshold == MAX_RANDOM {
        return true;
    }
    random.sample() <= threshold
}

/// Backend-request fields the sampling decision reads. Collected up front so the scoring
/// functions below don't need the raw JSON record.
#[derive(Debug, Clone, Copy)]
pub struct SamplingInput {
    pub total_time: f64,
    pub severity: i64,
    pub response_code: i64,
    pub has_exceptions: bool,
    pub heap_growth: i64,
}

/// A request is slow if it exceeds the stream's blanket import threshold; only when it
/// doesn't is a per-module override threshold consulted. The blanket check always wins first
/// — an override does not pardon a request that already blew the blanket threshold, it only
/// gives modules a *lower* bar to clear (`importer-processor.c`'s `slow_request` fallthrough
/// order).
pub fn slow_request(total_time: f64, module: &str, stream: &StreamInfo) -> bool {
    if total_time > stream.import_threshold {
        return true;
    }
    let module_name = module.strip_prefix("::").unwrap_or(module);
    stream.module_thresholds.get(module_name).is_some_and(|&threshold| total_time > threshold)
}

/// Computes the full sampling bitmask for one backend request (SPEC_FULL.md §4.5).
///
/// Severity and response-code checks only ever add bits as their inputs grow (Testable
/// Property 8): raising `severity` from warn to fatal can only add `LOG_SEVERITY`, never
/// remove it, and the same holds for `response_code` against the 400/500 bits.
pub fn interesting_request(
    input: &SamplingInput,
    module: &str,
    stream: &StreamInfo,
    config: &ProcessorConfig,
    random: &mut dyn RandomSource,
) -> SamplingReason {
    let mut reason = SamplingReason::empty();

    if slow_request(input.total_time, module, stream) {
        reason |= SamplingReason::SLOW_REQUEST;
    }

    if input.severity >= config.log_severity_fatal {
        reason |= SamplingReason::LOG_SEVERITY;
    } else if input.severity >= config.log_severity_error
        && (input.response_code >= 500 || random_sample(random, stream.sampling_rate_400s_threshold))
    {
        reason |= SamplingReason::LOG_SEVERITY;
    } else if input.severity >= config.log_severity_warn
        && random_sample(random, stream.sampling_rate_400s_threshold)
    {
        reason |= SamplingReason::LOG_SEVERITY;
    }

    if input.response_code >= 500 {
        reason |= SamplingReason::RESPONSE_500;
    } else if input.response_code >= 400 && random_sample(random, stream.sampling_rate_400s_threshold) {
        reason |= SamplingReason::RESPONSE_400;
    } else if input.response_code == 0 {
        reason |= SamplingReason::RESPONSE_000;
    }

    if input.has_exceptions {
        reason |= SamplingReason::EXCEPTIONS;
    }
    if input.heap_growth > 0 {
        reason |= SamplingReason::HEAP_GROWTH;
    }

    reason
}

/// Why a request was held back rather than forwarded downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleVerdict {
    NotThrottled,
    MaxInsertsPerSecond,
    HardLimitStorageSize,
    SoftLimitStorageSize,
}

impl ThrottleVerdict {
    pub fn is_throttled(&self) -> bool {
        !matches!(self, ThrottleVerdict::NotThrottled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThrottleVerdict::NotThrottled => "not_throttled",
            ThrottleVerdict::MaxInsertsPerSecond => "max_inserts_per_second",
            ThrottleVerdict::HardLimitStorageSize => "hard_limit_storage_size",
            ThrottleVerdict::SoftLimitStorageSize => "soft_limit_storage_size",
        }
    }
}

/// A stream's per-second insert rate gate, consulted before anything else in
/// [`throttle_request`]. Implementations decide their own windowing strategy.
pub trait RateGate: std::fmt::Debug {
    /// Returns `true` when the stream has exceeded its configured inserts-per-second budget.
    fn is_tripped(&self) -> bool;
}

/// A gate that never trips, for streams with no rate limit configured.
#[derive(Debug, Default)]
pub struct NoRateLimit;

impl RateGate for NoRateLimit {
    fn is_tripped(&self) -> bool {
        false
    }
}

/// Evaluates the throttling verdict chain for one stream (SPEC_FULL.md §4.5):
/// rate limit, then hard storage limit, then a randomized soft storage limit.
pub fn throttle_request(stream: &StreamInfo, config: &ProcessorConfig, random: &mut dyn RandomSource) -> ThrottleVerdict {
    if stream.rate_gate.is_tripped() {
        return ThrottleVerdict::MaxInsertsPerSecond;
    }
    if stream.storage_size > config.hard_limit_storage_size {
        return ThrottleVerdict::HardLimitStorageSize;
    }
    if stream.storage_size > config.soft_limit_storage_size && random.sample() > config.ten_percent_of_max_random {
        return ThrottleVerdict::SoftLimitStorageSize;
    }
    ThrottleVerdict::NotThrottled
}

/// Whether `action` should skip tracker registration entirely because the stream only ever
/// emits backend requests for it (no matching frontend/ajax record will ever arrive).
pub fn backend_only_request(action: &str, stream: &StreamInfo) -> bool {
    if stream.all_requests_are_backend_only_requests {
        return true;
    }
    stream.backend_only_requests.iter().any(|prefix| action.starts_with(prefix.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamInfo;

    fn stream() -> StreamInfo {
        StreamInfo::new("test-stream".to_string())
    }

    #[test]
    fn random_sample_always_true_at_max_threshold() {
        let mut random = FixedRandom(u64::MAX);
        assert!(random_sample(&mut random, MAX_RANDOM));
    }

    #[test]
    fn random_sample_compares_against_threshold() {
        let mut low = FixedRandom(10);
        let mut high = FixedRandom(1000);
        assert!(random_sample(&mut low, 500));
        assert!(!random_sample(&mut high, 500));
    }

    #[test]
    fn slow_request_uses_module_override_when_under_blanket_threshold() {
        let mut stream = stream();
        stream.import_threshold = 1000.0;
        stream.module_thresholds.insert("Payments".to_string(), 10.0);
        assert!(slow_request(20.0, "::Payments", &stream));
        assert!(!slow_request(5.0, "::Other", &stream));
    }

    #[test]
    fn slow_request_blanket_threshold_wins_even_over_a_higher_override() {
        let mut stream = stream();
        stream.import_threshold = 1000.0;
        stream.module_thresholds.insert("Payments".to_string(), 5000.0);
        assert!(slow_request(2000.0, "::Payments", &stream));
    }

    #[test]
    fn severity_monotone_never_loses_the_bit() {
        let stream = stream();
        let config = ProcessorConfig::default();
        let mut random = FixedRandom(u64::MAX);
        let warn = interesting_request(
            &SamplingInput { total_time: 0.0, severity: 2, response_code: 200, has_exceptions: false, heap_growth: 0 },
            "::Foo",
            &stream,
            &config,
            &mut random,
        );
        let fatal = interesting_request(
            &SamplingInput { total_time: 0.0, severity: 4, response_code: 200, has_exceptions: false, heap_growth: 0 },
            "::Foo",
            &stream,
            &config,
            &mut random,
        );
        assert!(!warn.is_empty());
        assert!(fatal.contains(SamplingReason::LOG_SEVERITY));
        assert!(fatal.contains(warn));
    }

    #[test]
    fn response_code_500_always_sets_bit_regardless_of_random() {
        let stream = stream();
        let config = ProcessorConfig::default();
        let mut random = FixedRandom(0);
        let reason = interesting_request(
            &SamplingInput { total_time: 0.0, severity: 0, response_code: 503, has_exceptions: false, heap_growth: 0 },
            "::Foo",
            &stream,
            &config,
            &mut random,
        );
        assert!(reason.contains(SamplingReason::RESPONSE_500));
    }

    #[test]
    fn exceptions_and_heap_growth_bits_are_independent() {
        let stream = stream();
        let config = ProcessorConfig::default();
        let mut random = FixedRandom(u64::MAX);
        let reason = interesting_request(
            &SamplingInput { total_time: 0.0, severity: 0, response_code: 200, has_exceptions: true, heap_growth: 5 },
            "::Foo",
            &stream,
            &config,
            &mut random,
        );
        assert_eq!(reason, SamplingReason::EXCEPTIONS | SamplingReason::HEAP_GROWTH);
    }

    #[test]
    fn throttle_request_respects_rate_gate_first() {
        #[derive(Debug)]
        struct AlwaysTripped;
        impl RateGate for AlwaysTripped {
            fn is_tripped(&self) -> bool {
                true
            }
        }
        let mut stream = stream();
        stream.rate_gate = Box::new(AlwaysTripped);
        let config = ProcessorConfig::default();
        let mut random = FixedRandom(0);
        assert_eq!(throttle_request(&stream, &config, &mut random), ThrottleVerdict::MaxInsertsPerSecond);
    }

    #[test]
    fn throttle_request_hard_limit_beats_soft_limit() {
        let mut stream = stream();
        stream.storage_size = 6_000_000_000;
        let config = ProcessorConfig::default();
        let mut random = FixedRandom(0);
        assert_eq!(throttle_request(&stream, &config, &mut random), ThrottleVerdict::HardLimitStorageSize);
    }

    #[test]
    fn throttle_request_soft_limit_is_a_losing_random_draw() {
        let mut stream = stream();
        stream.storage_size = 4_500_000_000;
        let config = ProcessorConfig::default();
        let mut above_threshold = FixedRandom(u64::MAX);
        assert_eq!(
            throttle_request(&stream, &config, &mut above_threshold),
            ThrottleVerdict::SoftLimitStorageSize
        );
        let mut below_threshold = FixedRandom(0);
        assert_eq!(throttle_request(&stream, &config, &mut below_threshold), ThrottleVerdict::NotThrottled);
    }

    #[test]
    fn backend_only_request_matches_prefix() {
        let mut stream = stream();
        stream.backend_only_requests.push("Healthcheck".to_string());
        assert!(backend_only_request("Healthcheck#ping", &stream));
        assert!(!backend_only_request("Orders#show", &stream));
    }

    #[test]
    fn backend_only_request_flag_overrides_prefixes() {
        let mut stream = stream();
        stream.all_requests_are_backend_only_requests = true;
        assert!(backend_only_request("anything#here", &stream));
    }
}
