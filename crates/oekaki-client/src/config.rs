use std::time::Duration;

use serde::Deserialize;

/// Who asks the coordinator to advance when the local countdown runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvancePolicy {
    /// Only the host's client sends `advance_round`.
    HostOnly,
    /// Every client does; the coordinator collapses the duplicates.
    #[default]
    AnyClient,
}

/// Client-side tuning, deserializable from any serde source.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Coordinator root, e.g. `http://localhost:8080`.
    pub base_url: String,
    /// How long feed-triggered refreshes are ignored after a decisive event.
    pub suppression_window_ms: u64,
    /// How long a round result stays on screen.
    pub result_display_ms: u64,
    pub advance_policy: AdvancePolicy,
    /// Extra wait before asking again when an advance request was a no-op.
    pub advance_grace_ms: u64,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
    pub request_timeout_secs: u64,
    /// Capacity of the inbound feed queue.
    pub feed_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            suppression_window_ms: 5_500,
            result_display_ms: 5_000,
            advance_policy: AdvancePolicy::default(),
            advance_grace_ms: 1_000,
            retry_attempts: 3,
            retry_backoff_ms: 250,
            request_timeout_secs: 10,
            feed_buffer: 256,
        }
    }
}

impl ClientConfig {
    pub fn suppression_window(&self) -> Duration {
        Duration::from_millis(self.suppression_window_ms)
    }

    pub fn result_display(&self) -> Duration {
        Duration::from_millis(self.result_display_ms)
    }

    pub fn advance_grace(&self) -> Duration {
        Duration::from_millis(self.advance_grace_ms)
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base_url.trim_end_matches('/'))
    }
}
