//! Server configuration.

use replica_sync_engine::wire::DEFAULT_MAX_FRAME_SIZE;
use replica_sync_engine::SessionSettings;
use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Interval between local diffs in a push-pull session.
    pub poll_interval: Duration,
    /// Capacity of entry streams.
    pub stream_buffer: usize,
    /// Largest frame accepted from a peer.
    pub max_frame_size: usize,
    /// Settings advertised through `Pull(Settings)`.
    pub settings: SessionSettings,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        let poll_interval = Duration::from_millis(250);
        Self {
            bind_addr,
            max_connections: 1000,
            poll_interval,
            stream_buffer: 64,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            settings: SessionSettings::new(
                poll_interval,
                Duration::from_secs(5),
                Duration::from_millis(100),
            ),
        }
    }

    /// Sets the maximum concurrent connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the session poll interval, and advertises it.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self.settings.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the entry stream capacity.
    pub fn with_stream_buffer(mut self, capacity: usize) -> Self {
        self.stream_buffer = capacity.max(1);
        self
    }

    /// Sets the maximum frame size.
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Sets the advertised session settings.
    pub fn with_settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 7400)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 7400);
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.settings.poll_interval_ms, 250);
        assert_eq!(config.settings.heartbeat_interval_ms, 5000);
        assert_eq!(config.settings.debounce_ms, 100);
    }

    #[test]
    fn builder_pattern() {
        let config = ServerConfig::default()
            .with_max_connections(2)
            .with_poll_interval(Duration::from_millis(40));
        assert_eq!(config.max_connections, 2);
        assert_eq!(config.poll_interval, Duration::from_millis(40));
        assert_eq!(config.settings.poll_interval_ms, 40);
    }
}
