//! Configuration knobs recognized by the core, per spec.md §6.
//!
//! Only `offline`, `all_attributes_private`, and `private_attribute_names`
//! affect evaluation. The rest are inputs to external collaborators (the
//! fetchers and the event pipeline) and are carried here only so a single
//! `Config` value can be threaded through `DefaultClient::new` without the
//! caller juggling two structs.

use std::time::Duration;

/// Evaluation-affecting and ambient SDK configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Short-circuits all evaluations to `default` + `ERROR{CLIENT_NOT_READY}`.
    pub offline: bool,
    /// Redacts every user attribute in emitted events.
    pub all_attributes_private: bool,
    /// Redacts the named attributes in emitted events.
    pub private_attribute_names: Vec<String>,

    /// Base URI for the polling fetcher. No effect on evaluation.
    pub base_uri: String,
    /// Base URI for the streaming fetcher. No effect on evaluation.
    pub stream_uri: String,
    /// Base URI for the event pipeline. No effect on evaluation.
    pub events_uri: String,
    /// Polling interval, when polling rather than streaming. No effect on evaluation.
    pub poll_interval: Duration,
    /// Event batch flush interval. No effect on evaluation.
    pub flush_interval: Duration,
    /// Event buffer capacity. No effect on evaluation.
    pub events_capacity: usize,
    /// LRU size for deduplicating identify events. No effect on evaluation.
    pub user_keys_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            offline: false,
            all_attributes_private: false,
            private_attribute_names: Vec::new(),
            base_uri: "https://app.launchdarkly.com".to_string(),
            stream_uri: "https://stream.launchdarkly.com".to_string(),
            events_uri: "https://events.launchdarkly.com".to_string(),
            poll_interval: Duration::from_secs(30),
            flush_interval: Duration::from_secs(5),
            events_capacity: 10_000,
            user_keys_capacity: 1_000,
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder(Self::default())
    }
}

#[allow(dead_code)]
pub struct ConfigBuilder(Config);

impl ConfigBuilder {
    pub fn offline(mut self, v: bool) -> Self {
        self.0.offline = v;
        self
    }

    pub fn all_attributes_private(mut self, v: bool) -> Self {
        self.0.all_attributes_private = v;
        self
    }

    pub fn private_attribute_names(mut self, v: Vec<String>) -> Self {
        self.0.private_attribute_names = v;
        self
    }

    pub fn base_uri(mut self, v: impl Into<String>) -> Self {
        self.0.base_uri = v.into();
        self
    }

    pub fn stream_uri(mut self, v: impl Into<String>) -> Self {
        self.0.stream_uri = v.into();
        self
    }

    pub fn poll_interval(mut self, v: Duration) -> Self {
        self.0.poll_interval = v;
        self
    }

    pub fn build(self) -> Config {
        self.0
    }
}
