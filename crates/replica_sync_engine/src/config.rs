//! Configuration for the sync engine.

use replica_core::reflect_struct;
use std::time::Duration;

/// Configuration for a client [`Connection`](crate::Connection).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Bound on the initial ping.
    pub connect_timeout: Duration,
    /// Interval between heartbeat pings.
    pub heartbeat_interval: Duration,
    /// Bound on each heartbeat ping.
    pub ping_timeout: Duration,
    /// Interval between local diffs in a push-pull session.
    pub poll_interval: Duration,
    /// Capacity of outbound entry streams.
    pub stream_buffer: usize,
}

impl SyncConfig {
    /// Creates a new sync configuration with default values.
    pub fn new() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(5),
            ping_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(250),
            stream_buffer: 64,
        }
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the heartbeat ping timeout.
    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    /// Sets the push-pull poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the outbound stream capacity.
    pub fn with_stream_buffer(mut self, capacity: usize) -> Self {
        self.stream_buffer = capacity.max(1);
        self
    }

    /// Adopts the intervals a server advertises. Zero values are ignored.
    pub fn with_settings(mut self, settings: &SessionSettings) -> Self {
        if settings.poll_interval_ms > 0 {
            self.poll_interval = Duration::from_millis(settings.poll_interval_ms);
        }
        if settings.heartbeat_interval_ms > 0 {
            self.heartbeat_interval = Duration::from_millis(settings.heartbeat_interval_ms);
        }
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Session parameters a server advertises through `Pull(Settings)`.
///
/// Travels as ordinary change records, so a client injects it into its own
/// instance like any other synchronized value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSettings {
    /// Push-pull poll interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Heartbeat interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Coordinator debounce window in milliseconds.
    pub debounce_ms: u64,
}

reflect_struct!(SessionSettings {
    poll_interval_ms,
    heartbeat_interval_ms,
    debounce_ms,
});

impl SessionSettings {
    /// Builds settings from the given intervals.
    pub fn new(poll_interval: Duration, heartbeat_interval: Duration, debounce: Duration) -> Self {
        Self {
            poll_interval_ms: millis(poll_interval),
            heartbeat_interval_ms: millis(heartbeat_interval),
            debounce_ms: millis(debounce),
        }
    }

    /// Returns the debounce window.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
