//! Engine configuration.
//!
//! A `RangeRequestConfig` is shared read-only by a client; variations are
//! built by value with the `with_*` methods.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Tuning knobs for the range-request engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeRequestConfig {
    /// Bytes requested per range GET. Also the flush threshold of the file sink.
    pub chunk_size: u64,
    /// Maximum number of overlapping range requests per fetch.
    pub max_concurrent_requests: usize,
    /// Extra headers sent with every request (HEAD and GET).
    pub headers: HashMap<String, String>,
    /// Retries per range after the first attempt fails.
    pub max_retries: u32,
    /// Base backoff delay; the first retry waits twice this, doubling after.
    pub retry_delay_ms: u64,
    /// Suffix appended to the final filename while a download is in flight.
    pub temp_file_extension: String,
    /// Per-request timeout (connect plus stalled-transfer guard).
    pub connection_timeout_ms: u64,
    /// Tick interval of the periodic progress callback.
    pub progress_interval_ms: u64,
    /// Compare the `Accept-Ranges` value case-insensitively. Off by default:
    /// the stock comparison treats only the literal `none` as unsupported.
    pub relaxed_accept_ranges: bool,
}

impl Default for RangeRequestConfig {
    fn default() -> Self {
        Self {
            chunk_size: 10 * 1024 * 1024,
            max_concurrent_requests: 8,
            headers: HashMap::new(),
            max_retries: 3,
            retry_delay_ms: 1000,
            temp_file_extension: ".tmp".to_string(),
            connection_timeout_ms: 30_000,
            progress_interval_ms: 500,
            relaxed_accept_ranges: false,
        }
    }
}

impl RangeRequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_max_concurrent_requests(mut self, max: usize) -> Self {
        self.max_concurrent_requests = max;
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay_ms(mut self, retry_delay_ms: u64) -> Self {
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    pub fn with_temp_file_extension(mut self, extension: impl Into<String>) -> Self {
        self.temp_file_extension = extension.into();
        self
    }

    pub fn with_connection_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.connection_timeout_ms = timeout_ms;
        self
    }

    pub fn with_progress_interval_ms(mut self, interval_ms: u64) -> Self {
        self.progress_interval_ms = interval_ms;
        self
    }

    pub fn with_relaxed_accept_ranges(mut self, relaxed: bool) -> Self {
        self.relaxed_accept_ranges = relaxed;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = RangeRequestConfig::default();
        assert_eq!(cfg.chunk_size, 10 * 1024 * 1024);
        assert_eq!(cfg.max_concurrent_requests, 8);
        assert!(cfg.headers.is_empty());
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.retry_delay_ms, 1000);
        assert_eq!(cfg.temp_file_extension, ".tmp");
        assert_eq!(cfg.connection_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.progress_interval(), Duration::from_millis(500));
        assert!(!cfg.relaxed_accept_ranges);
    }

    #[test]
    fn clone_is_field_wise_equal() {
        let cfg = RangeRequestConfig::default();
        assert_eq!(cfg.clone(), cfg);
    }

    #[test]
    fn builders_change_only_their_field() {
        let cfg = RangeRequestConfig::default()
            .with_chunk_size(1024)
            .with_max_concurrent_requests(2);
        assert_eq!(cfg.chunk_size, 1024);
        assert_eq!(cfg.max_concurrent_requests, 2);
        assert_eq!(cfg.max_retries, RangeRequestConfig::default().max_retries);
        assert_eq!(
            cfg.temp_file_extension,
            RangeRequestConfig::default().temp_file_extension
        );
    }

    #[test]
    fn config_toml_roundtrip() {
        let mut cfg = RangeRequestConfig::default().with_max_retries(7);
        cfg.headers
            .insert("Authorization".to_string(), "Bearer x".to_string());
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: RangeRequestConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn config_toml_partial_uses_defaults() {
        let toml = r#"
            chunk_size = 4096
            max_concurrent_requests = 3
        "#;
        let cfg: RangeRequestConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.chunk_size, 4096);
        assert_eq!(cfg.max_concurrent_requests, 3);
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.temp_file_extension, ".tmp");
    }
}
