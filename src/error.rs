use std::fmt;

/// Why a frontend/ajax record was not folded into the aggregates.
///
/// Recorded per user-agent (see [`crate::store::AgentStats::fe_drop_reasons`]) and returned
/// by [`crate::frontend::decode_frontend_timings`] / [`crate::frontend::decode_ajax_timings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeMsgDropReason {
    /// Not actually a drop — the record was folded into the aggregates.
    Accepted,
    /// Total time exceeded the configured outlier threshold.
    Outlier,
    /// All navigation timings were zero — no useful timing data at all.
    NavTiming,
    /// The timing sequence failed the ascending/positivity check.
    Illegal,
    /// The `rts` field could not be parsed.
    Corrupted,
    /// Parsed, but a derived value made no sense (e.g. negative ajax time).
    Invalid,
}

impl FeMsgDropReason {
    pub const ALL: [FeMsgDropReason; 6] = [
        FeMsgDropReason::Accepted,
        FeMsgDropReason::Outlier,
        FeMsgDropReason::NavTiming,
        FeMsgDropReason::Illegal,
        FeMsgDropReason::Corrupted,
        FeMsgDropReason::Invalid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeMsgDropReason::Accepted => "accepted",
            FeMsgDropReason::Outlier => "outlier",
            FeMsgDropReason::NavTiming => "nav_timing",
            FeMsgDropReason::Illegal => "illegal",
            FeMsgDropReason::Corrupted => "corrupted",
            FeMsgDropReason::Invalid => "invalid",
        }
    }
}

impl fmt::Display for FeMsgDropReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors surfaced by configuration setters (the only fallible, caller-visible operation in
/// this crate outside of per-record drop reasons).
#[derive(Debug, Clone)]
pub enum ConfigError {
    UnknownFrontendApdexAttribute(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::UnknownFrontendApdexAttribute(name) => {
                write!(f, "unknown frontend apdex attribute: {}", name)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
