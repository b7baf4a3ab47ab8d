//! Replay configuration.

use crate::dispatch::Family;
use serde::{Deserialize, Serialize};

/// How captured threads map onto replay threads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadMode {
    /// Replay every call on the driving thread
    #[default]
    Single,
    /// One replay worker per captured thread id
    PerCaptureThread,
}

/// Replay engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Swap buffers at frame boundaries; flush when false
    pub double_buffered: bool,
    /// Skip every driver error check
    pub benchmarking: bool,
    /// Take a state snapshot at `capture_at_call`
    pub capture_state: bool,
    /// Call index at which to snapshot
    pub capture_at_call: Option<u64>,
    /// Stop issuing calls once the snapshot is taken
    pub stop_after_capture: bool,
    /// Record per-call timing and GPU queries for draws
    pub profiling: bool,
    /// Log every dispatched call
    pub verbose: bool,
    /// Thread mapping
    pub thread_mode: ThreadMode,
    /// Windowing-system family; detected from the stream when unset
    pub family: Option<Family>,
    /// Maximum calls to replay (0 = unlimited)
    pub max_calls: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            double_buffered: true,
            benchmarking: false,
            capture_state: false,
            capture_at_call: None,
            stop_after_capture: true,
            profiling: false,
            verbose: false,
            thread_mode: ThreadMode::Single,
            family: None,
            max_calls: 0,
        }
    }
}

impl ReplayConfig {
    /// Create the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Select swap (true) or flush (false) at frame boundaries
    #[must_use]
    pub fn with_double_buffered(mut self, double_buffered: bool) -> Self {
        self.double_buffered = double_buffered;
        self
    }

    /// Enable or disable benchmarking mode
    #[must_use]
    pub fn with_benchmarking(mut self, benchmarking: bool) -> Self {
        self.benchmarking = benchmarking;
        self
    }

    /// Snapshot state at the given call index
    #[must_use]
    pub fn with_capture_at(mut self, call_index: u64) -> Self {
        self.capture_state = true;
        self.capture_at_call = Some(call_index);
        self
    }

    /// Keep replaying after the snapshot
    #[must_use]
    pub fn with_stop_after_capture(mut self, stop: bool) -> Self {
        self.stop_after_capture = stop;
        self
    }

    /// Enable or disable profiling
    #[must_use]
    pub fn with_profiling(mut self, profiling: bool) -> Self {
        self.profiling = profiling;
        self
    }

    /// Enable or disable per-call logging
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set the thread mapping
    #[must_use]
    pub fn with_thread_mode(mut self, mode: ThreadMode) -> Self {
        self.thread_mode = mode;
        self
    }

    /// Force a windowing-system family
    #[must_use]
    pub fn with_family(mut self, family: Family) -> Self {
        self.family = Some(family);
        self
    }

    /// Limit the number of replayed calls
    #[must_use]
    pub fn with_max_calls(mut self, max_calls: u64) -> Self {
        self.max_calls = max_calls;
        self
    }

    /// Whether the snapshot is due after the given call
    #[must_use]
    pub fn capture_due(&self, call_index: u64) -> bool {
        self.capture_state
            && self
                .capture_at_call
                .is_some_and(|target| call_index >= target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_config_default() {
        let config = ReplayConfig::default();
        assert!(config.double_buffered);
        assert!(!config.benchmarking);
        assert!(!config.capture_state);
        assert!(config.stop_after_capture);
        assert_eq!(config.thread_mode, ThreadMode::Single);
        assert_eq!(config.max_calls, 0);
    }

    #[test]
    fn test_capture_due() {
        let config = ReplayConfig::new().with_capture_at(2);
        assert!(!config.capture_due(1));
        assert!(config.capture_due(2));
        assert!(config.capture_due(3));

        let disabled = ReplayConfig {
            capture_state: false,
            capture_at_call: Some(2),
            ..Default::default()
        };
        assert!(!disabled.capture_due(2));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ReplayConfig =
            serde_json::from_str(r#"{"benchmarking": true, "family": "glx"}"#).unwrap();
        assert!(config.benchmarking);
        assert!(config.double_buffered);
        assert_eq!(config.family, Some(Family::Glx));
    }

    #[test]
    fn test_thread_mode_serialization() {
        let json = serde_json::to_string(&ThreadMode::PerCaptureThread).unwrap();
        assert_eq!(json, "\"per_capture_thread\"");
    }
}
