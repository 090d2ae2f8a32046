/// Processor configuration knobs.
///
/// No file-format or CLI parsing lives here — loading configuration from disk or argv is the
/// caller's job (an external collaborator, per `SPEC_FULL.md`). This module is deliberately a
/// plain struct with documented defaults, unlike the rest of this codebase's original `config`
/// module, which layered the `config` crate over a global `OnceCell`; see `DESIGN.md` for why
/// that pattern was dropped here.
use crate::error::ConfigError;

/// Which frontend timing milestone drives the page apdex bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontendApdexAttribute {
    DomInteractive,
    LoadEventEnd,
}

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    frontend_apdex_attribute: FrontendApdexAttribute,
    pub hard_limit_storage_size: u64,
    pub soft_limit_storage_size: u64,
    /// Chance (0..=max) that a soft-limit-storage-exceeding record is still admitted.
    pub ten_percent_of_max_random: u64,
    pub fe_msg_outlier_threshold_ms: f64,
    pub log_severity_warn: i64,
    pub log_severity_error: i64,
    pub log_severity_fatal: i64,
}

impl Default for ProcessorConfig {
    /// Defaults mirror the upstream importer-processor's compiled-in constants.
    fn default() -> Self {
        Self {
            frontend_apdex_attribute: FrontendApdexAttribute::LoadEventEnd,
            hard_limit_storage_size: 5_000_000_000,
            soft_limit_storage_size: 4_000_000_000,
            ten_percent_of_max_random: u64::MAX / 10,
            fe_msg_outlier_threshold_ms: 60_000.0,
            log_severity_warn: 2,
            log_severity_error: 3,
            log_severity_fatal: 4,
        }
    }
}

impl ProcessorConfig {
    pub fn frontend_apdex_attribute(&self) -> FrontendApdexAttribute {
        self.frontend_apdex_attribute
    }

    /// Accepts `"dom_interactive"` or `"load_event_end"` (case-insensitive); any other name
    /// is rejected and the configuration is left unchanged.
    pub fn set_frontend_apdex_attribute(&mut self, name: &str) -> Result<(), ConfigError> {
        self.frontend_apdex_attribute = match name.to_ascii_lowercase().as_str() {
            "dom_interactive" => FrontendApdexAttribute::DomInteractive,
            "load_event_end" => FrontendApdexAttribute::LoadEventEnd,
            _ => return Err(ConfigError::UnknownFrontendApdexAttribute(name.to_string())),
        };
        Ok(())
    }
}
