//! Cross-crate integration test helpers.
//!
//! [`SyncHarness`] runs a [`SyncServer`] behind a TCP listener on a free local
//! port and hands out clients connected to it, either over TCP or in-process.

use replica_core::{Coordinator, CoordinatorConfig, Reflect, Scope};
use replica_sync_engine::{Connection, SyncConfig, SyncTransport, TcpTransport};
use replica_sync_server::{ServerConfig, ServerHandle, SyncServer, TcpServer};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Poll interval used by harness servers and clients.
pub const FAST_POLL: Duration = Duration::from_millis(20);

/// Creates a coordinator over `value` with a short debounce window.
pub fn coordinator<T: Reflect + Clone + Default>(scope: &Scope, value: T) -> Arc<Coordinator<T>> {
    Arc::new(Coordinator::new(
        scope,
        Arc::new(Mutex::new(value)),
        CoordinatorConfig::new().debounce(Duration::from_millis(10)),
    ))
}

/// Client configuration matching the harness server.
pub fn fast_config() -> SyncConfig {
    SyncConfig::new()
        .with_poll_interval(FAST_POLL)
        .with_connect_timeout(Duration::from_secs(2))
        .with_heartbeat_interval(Duration::from_millis(200))
        .with_ping_timeout(Duration::from_millis(500))
}

/// A running server plus helpers to connect clients to it.
pub struct SyncHarness<T> {
    /// Root scope; cancelling it stops everything the harness started.
    pub scope: Scope,
    /// The served value's server.
    pub server: Arc<SyncServer<T>>,
    handle: ServerHandle,
}

impl<T: Reflect + Clone + Default> SyncHarness<T> {
    /// Starts a server over `initial` on a free local port.
    pub async fn start(initial: T) -> Self {
        let scope = Scope::new();
        let config = ServerConfig::new(SocketAddr::from(([127, 0, 0, 1], 0)))
            .with_poll_interval(FAST_POLL);
        let server = Arc::new(SyncServer::new(
            coordinator(&scope, initial),
            config.clone(),
        ));
        let handle = TcpServer::bind(&config, Arc::clone(&server) as Arc<dyn SyncTransport>)
            .await
            .expect("Failed to bind sync server");
        Self {
            scope,
            server,
            handle,
        }
    }

    /// Returns the server's listening address.
    pub fn addr(&self) -> SocketAddr {
        self.handle.local_addr()
    }

    /// Returns the server's coordinator.
    pub fn server_coordinator(&self) -> &Arc<Coordinator<T>> {
        self.server.coordinator()
    }

    /// Connects a client holding `initial` over TCP.
    pub async fn tcp_client(&self, initial: T) -> (Connection<T>, Arc<Coordinator<T>>) {
        let transport = TcpTransport::connect(&self.addr().to_string(), Duration::from_secs(2))
            .await
            .expect("Failed to reach sync server");
        self.client_over(Arc::new(transport), initial).await
    }

    /// Connects a client holding `initial` directly to the server object.
    pub async fn local_client(&self, initial: T) -> (Connection<T>, Arc<Coordinator<T>>) {
        self.client_over(Arc::clone(&self.server) as Arc<dyn SyncTransport>, initial)
            .await
    }

    async fn client_over(
        &self,
        transport: Arc<dyn SyncTransport>,
        initial: T,
    ) -> (Connection<T>, Arc<Coordinator<T>>) {
        let coordinator = coordinator(&self.scope, initial);
        let connection = Connection::connect(transport, Arc::clone(&coordinator), fast_config())
            .await
            .expect("Failed to connect client");
        (connection, coordinator)
    }

    /// Stops the listener and every task started through the harness.
    pub fn stop(mut self) {
        self.handle.shutdown();
        self.scope.cancel();
    }
}

/// Re-checks `check` until it holds or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Counter;

    #[tokio::test]
    async fn harness_serves_local_and_tcp_clients() {
        let harness = SyncHarness::start(Counter { value: 3 }).await;
        let (tcp, _) = harness.tcp_client(Counter::default()).await;
        let (local, _) = harness.local_client(Counter::default()).await;
        assert!(tcp.ping().await.unwrap().is_ok());
        assert!(local.ping().await.unwrap().is_ok());
        harness.stop();
        assert!(!tcp.is_alive());
        assert!(!local.is_alive());
    }

    #[tokio::test]
    async fn eventually_times_out() {
        assert!(!eventually(Duration::from_millis(30), || async { false }).await);
        assert!(eventually(Duration::from_millis(30), || async { true }).await);
    }
}
