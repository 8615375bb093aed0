use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

/// Runtime settings of a [`crate::CardFeed`].
///
/// Every key is optional in the JSON form; missing keys take the defaults below.
/// Intervals are whole seconds for the heartbeat timers and milliseconds everywhere else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct FeedConfig {
    server_url: String,
    client_version: String,
    heartbeat_sending_interval: u64,
    heartbeat_log_interval: u64,
    recovery_margin: u64,
    snapshot_debounce: u64,
    snapshot_sample_interval: u64,
    snapshot_burst_threshold: usize,
    projection_debounce: u64,
    reconnect_initial_backoff: u64,
    reconnect_max_backoff: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:2002/".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            heartbeat_sending_interval: 30,
            heartbeat_log_interval: 60,
            recovery_margin: 120_000,
            snapshot_debounce: 200,
            snapshot_sample_interval: 1_000,
            snapshot_burst_threshold: 20,
            projection_debounce: 50,
            reconnect_initial_backoff: 1_000,
            reconnect_max_backoff: 30_000,
        }
    }
}

impl FeedConfig {
    pub fn new() -> Self { Self::default() }

    /// Parse a (possibly partial) JSON document and validate it
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: FeedConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("heartbeatSendingInterval", self.heartbeat_sending_interval),
            ("heartbeatLogInterval", self.heartbeat_log_interval),
            ("snapshotDebounce", self.snapshot_debounce),
            ("snapshotSampleInterval", self.snapshot_sample_interval),
            ("projectionDebounce", self.projection_debounce),
            ("reconnectInitialBackoff", self.reconnect_initial_backoff),
            ("reconnectMaxBackoff", self.reconnect_max_backoff),
        ];
        if let Some((key, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::ZeroInterval(key));
        }
        if self.reconnect_max_backoff < self.reconnect_initial_backoff {
            return Err(ConfigError::Invalid("reconnectMaxBackoff is below reconnectInitialBackoff".into()));
        }
        if self.server_url.is_empty() {
            return Err(ConfigError::Invalid("serverUrl is empty".into()));
        }
        Ok(())
    }

    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    pub fn with_client_version(mut self, version: impl Into<String>) -> Self {
        self.client_version = version.into();
        self
    }

    /// Fails unless `interval` is a non-zero whole number of seconds
    pub fn with_heartbeat_sending_interval(mut self, interval: Duration) -> Result<Self, ConfigError> {
        self.heartbeat_sending_interval = whole_seconds("heartbeatSendingInterval", interval)?;
        Ok(self)
    }

    /// Fails unless `interval` is a non-zero whole number of seconds
    pub fn with_heartbeat_log_interval(mut self, interval: Duration) -> Result<Self, ConfigError> {
        self.heartbeat_log_interval = whole_seconds("heartbeatLogInterval", interval)?;
        Ok(self)
    }

    pub fn with_recovery_margin(mut self, margin: Duration) -> Self {
        self.recovery_margin = margin.as_millis() as u64;
        self
    }

    pub fn with_snapshot_debounce(mut self, debounce: Duration) -> Self {
        self.snapshot_debounce = debounce.as_millis() as u64;
        self
    }

    pub fn with_snapshot_sampling(mut self, interval: Duration, burst_threshold: usize) -> Self {
        self.snapshot_sample_interval = interval.as_millis() as u64;
        self.snapshot_burst_threshold = burst_threshold;
        self
    }

    pub fn with_projection_debounce(mut self, debounce: Duration) -> Self {
        self.projection_debounce = debounce.as_millis() as u64;
        self
    }

    pub fn with_reconnect_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.reconnect_initial_backoff = initial.as_millis() as u64;
        self.reconnect_max_backoff = max.as_millis() as u64;
        self
    }

    pub fn server_url(&self) -> &str { &self.server_url }
    pub fn client_version(&self) -> &str { &self.client_version }
    pub fn heartbeat_sending_interval(&self) -> Duration { Duration::from_secs(self.heartbeat_sending_interval) }
    pub fn heartbeat_log_interval(&self) -> Duration { Duration::from_secs(self.heartbeat_log_interval) }
    /// How far before the last received heartbeat a recovery replay starts, in milliseconds
    pub fn recovery_margin_millis(&self) -> i64 { self.recovery_margin as i64 }
    pub fn snapshot_debounce(&self) -> Duration { Duration::from_millis(self.snapshot_debounce) }
    pub fn snapshot_sample_interval(&self) -> Duration { Duration::from_millis(self.snapshot_sample_interval) }
    pub fn snapshot_burst_threshold(&self) -> usize { self.snapshot_burst_threshold }
    pub fn projection_debounce(&self) -> Duration { Duration::from_millis(self.projection_debounce) }
    pub fn reconnect_initial_backoff(&self) -> Duration { Duration::from_millis(self.reconnect_initial_backoff) }
    pub fn reconnect_max_backoff(&self) -> Duration { Duration::from_millis(self.reconnect_max_backoff) }
}

fn whole_seconds(key: &'static str, interval: Duration) -> Result<u64, ConfigError> {
    if interval.subsec_nanos() != 0 {
        return Err(ConfigError::FractionalSeconds(key));
    }
    match interval.as_secs() {
        0 => Err(ConfigError::ZeroInterval(key)),
        secs => Ok(secs),
    }
}
