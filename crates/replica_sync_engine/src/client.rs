//! Client side of a sync connection.

use crate::config::{SessionSettings, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::session::run_push_pull;
use crate::transport::{Streaming, SyncTransport};
use replica_core::{BatchReport, Coordinator, Extractor, Injector, Reflect, Scope};
use replica_sync_protocol::{ControlMessage, ControlReply, Entry, PullMode, PullRequest, StatusCode};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

/// A live connection to one sync peer.
///
/// A heartbeat runs on the connection scope from [`connect`](Self::connect)
/// until the scope is cancelled. A failed heartbeat cancels the scope, which
/// ends every call and session started on this connection.
pub struct Connection<T> {
    transport: Arc<dyn SyncTransport>,
    coordinator: Arc<Coordinator<T>>,
    config: SyncConfig,
    scope: Scope,
}

impl<T: Reflect + Clone + Default> Connection<T> {
    /// Pings the peer and starts the heartbeat.
    ///
    /// Fails with [`SyncError::Unavailable`] when the peer does not answer
    /// within `config.connect_timeout`.
    pub async fn connect(
        transport: Arc<dyn SyncTransport>,
        coordinator: Arc<Coordinator<T>>,
        config: SyncConfig,
    ) -> SyncResult<Self> {
        let reply = tokio::time::timeout(
            config.connect_timeout,
            transport.control(ControlMessage::ping()),
        )
        .await
        .map_err(|_| {
            SyncError::Unavailable(format!(
                "no reply to ping within {:?}",
                config.connect_timeout
            ))
        })?
        .map_err(|err| match err {
            SyncError::Unavailable(_) | SyncError::Setup(_) => err,
            other => SyncError::Unavailable(other.to_string()),
        })?;
        if !reply.is_ok() {
            return Err(SyncError::Unavailable(
                reply.message.unwrap_or_else(|| "peer refused ping".into()),
            ));
        }

        let scope = coordinator.scope().child();
        tokio::spawn(heartbeat(
            Arc::clone(&transport),
            scope.clone(),
            config.heartbeat_interval,
            config.ping_timeout,
        ));
        info!(
            heartbeat_ms = config.heartbeat_interval.as_millis() as u64,
            "sync connection established"
        );
        Ok(Self {
            transport,
            coordinator,
            config,
            scope,
        })
    }

    /// Sends a ping.
    pub async fn ping(&self) -> SyncResult<ControlReply> {
        self.guarded(self.transport.control(ControlMessage::ping()))
            .await
    }

    /// Asks the peer to end every active session.
    pub async fn shutdown_remote(&self) -> SyncResult<ControlReply> {
        self.guarded(self.transport.control(ControlMessage::shutdown()))
            .await
    }

    /// Pulls the peer's full state and applies it.
    pub async fn pull_init(&self) -> SyncResult<BatchReport> {
        self.pull_and_apply(PullMode::Init).await
    }

    /// Pulls the peer's changes since its last pull and applies them.
    pub async fn pull_changes(&self) -> SyncResult<BatchReport> {
        self.pull_and_apply(PullMode::Changes).await
    }

    /// Pulls the session settings the peer advertises.
    pub async fn pull_settings(&self) -> SyncResult<SessionSettings> {
        let mut stream = self
            .guarded(self.transport.pull(PullRequest::new(PullMode::Settings)))
            .await?;
        let mut settings = SessionSettings::default();
        let injector = Injector::new();
        while let Some(entry) = self.guarded(stream.message()).await? {
            injector.apply(&mut settings, &entry)?;
        }
        debug!(?settings, "session settings received");
        Ok(settings)
    }

    /// Streams the local changes since the previous extraction.
    pub async fn push(&self) -> SyncResult<ControlReply> {
        let entries = self.coordinator.entries().await?;
        self.push_entries(entries).await
    }

    /// Streams the given entries.
    pub async fn push_entries(&self, entries: Vec<Entry>) -> SyncResult<ControlReply> {
        let count = entries.len();
        let reply = self
            .guarded(self.transport.push(Streaming::from_entries(entries)))
            .await?;
        if reply.is_ok() {
            debug!(count, "push accepted");
        } else {
            warn!(count, message = ?reply.message, "push partially rejected");
        }
        Ok(reply)
    }

    /// Opens a push-pull session and runs it on a spawned task.
    ///
    /// The session stops when either side closes, on the first failure, or
    /// when the connection scope is cancelled.
    pub async fn push_pull(&self) -> SyncResult<JoinHandle<SyncResult<()>>> {
        let session = self.scope.child();
        let (outbound_tx, outbound) = Streaming::channel(self.config.stream_buffer);
        let inbound = self.guarded(self.transport.push_pull(outbound)).await?;
        let coordinator = Arc::clone(&self.coordinator);
        let poll_interval = self.config.poll_interval;
        info!("push-pull session started");
        Ok(tokio::spawn(async move {
            let result = run_push_pull(
                coordinator,
                Arc::new(Extractor::new()),
                outbound_tx,
                inbound,
                session,
                poll_interval,
            )
            .await;
            match &result {
                Ok(()) => info!("push-pull session ended"),
                Err(err) => err.log_termination("push-pull session"),
            }
            result
        }))
    }

    /// Returns the connection scope.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Returns the connection configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns true until the connection is closed or its heartbeat fails.
    pub fn is_alive(&self) -> bool {
        !self.scope.is_cancelled()
    }

    /// Closes the connection, ending the heartbeat and every session.
    pub fn close(&self) {
        if self.is_alive() {
            self.scope.cancel();
            info!("sync connection closed");
        }
    }

    async fn pull_and_apply(&self, mode: PullMode) -> SyncResult<BatchReport> {
        let mut stream = self
            .guarded(self.transport.pull(PullRequest::new(mode)))
            .await?;
        let mut report = BatchReport::default();
        while let Some(entry) = self.guarded(stream.message()).await? {
            let mut guard = self.coordinator.lock().await;
            report.merge(guard.add_all(std::slice::from_ref(&entry))?);
        }
        if !report.is_clean() {
            warn!(
                ?mode,
                applied = report.applied,
                failed = report.failures.len(),
                "pull applied with failures"
            );
        }
        debug!(?mode, applied = report.applied, "pull finished");
        Ok(report)
    }

    /// Runs `call` unless the connection scope is cancelled first.
    async fn guarded<F, R>(&self, call: F) -> SyncResult<R>
    where
        F: Future<Output = SyncResult<R>>,
    {
        if self.scope.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        tokio::select! {
            () = self.scope.cancelled() => Err(SyncError::Cancelled),
            result = call => result,
        }
    }
}

impl<T> Drop for Connection<T> {
    fn drop(&mut self) {
        self.scope.cancel();
    }
}

async fn heartbeat(
    transport: Arc<dyn SyncTransport>,
    scope: Scope,
    interval: Duration,
    ping_timeout: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; connect already pinged.
    ticker.tick().await;
    loop {
        tokio::select! {
            () = scope.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let outcome = match tokio::time::timeout(
            ping_timeout,
            transport.control(ControlMessage::ping()),
        )
        .await
        {
            Err(_) => Err(SyncError::Timeout),
            Ok(Err(err)) => Err(err),
            Ok(Ok(reply)) if !reply.is_ok() => Err(SyncError::status(
                StatusCode::Unavailable,
                reply.message.unwrap_or_else(|| "ping refused".into()),
            )),
            Ok(Ok(_)) => Ok(()),
        };
        if let Err(err) = outcome {
            warn!(error = %err, "heartbeat failed, closing connection");
            scope.cancel();
            break;
        }
        trace!("heartbeat ok");
    }
    debug!("heartbeat stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use replica_core::{reflect_struct, CoordinatorConfig, Key};
    use tokio::sync::Mutex as AsyncMutex;

    #[derive(Debug, Clone, Default)]
    struct Counter {
        value: i64,
    }

    reflect_struct!(Counter { value });

    fn set(value: i64) -> Entry {
        Entry::set(vec![Key::new("Counter"), Key::new("value")], value)
    }

    fn coordinator() -> Arc<Coordinator<Counter>> {
        Arc::new(Coordinator::new(
            &Scope::new(),
            Arc::new(AsyncMutex::new(Counter::default())),
            CoordinatorConfig::new(),
        ))
    }

    fn config() -> SyncConfig {
        SyncConfig::new()
            .with_heartbeat_interval(Duration::from_millis(100))
            .with_ping_timeout(Duration::from_millis(50))
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_keeps_pinging() {
        let transport = Arc::new(MockTransport::new());
        let connection = Connection::connect(transport.clone(), coordinator(), config())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(connection.is_alive());
        assert_eq!(transport.pings(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_error_reply_cancels_the_connection() {
        let transport = Arc::new(MockTransport::new());
        let connection = Connection::connect(transport.clone(), coordinator(), config())
            .await
            .unwrap();
        transport.set_ping_reply(ControlReply::error("draining"));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!connection.is_alive());
        assert!(matches!(connection.ping().await, Err(SyncError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_timeout_cancels_the_connection() {
        let transport = Arc::new(MockTransport::new());
        let connection = Connection::connect(transport.clone(), coordinator(), config())
            .await
            .unwrap();
        transport.set_ping_delay(Duration::from_millis(80));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!connection.is_alive());
    }

    #[tokio::test]
    async fn unreachable_peer_fails_to_connect() {
        let transport = Arc::new(MockTransport::new());
        transport.set_connected(false);
        let result = Connection::connect(transport, coordinator(), config()).await;
        assert!(matches!(result, Err(SyncError::Unavailable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_initial_ping_is_unavailable() {
        let transport = Arc::new(MockTransport::new());
        transport.set_ping_delay(Duration::from_secs(10));
        let result = Connection::connect(transport, coordinator(), config()).await;
        assert!(matches!(result, Err(SyncError::Unavailable(_))));
    }

    #[tokio::test]
    async fn pull_applies_every_entry() {
        let transport = Arc::new(MockTransport::new());
        let bad = Entry::set(vec![Key::new("Other"), Key::new("value")], 1i64);
        transport.set_pull_entries(vec![set(3), bad, set(5)]);
        let coordinator = coordinator();
        let connection = Connection::connect(transport, Arc::clone(&coordinator), config())
            .await
            .unwrap();

        let report = connection.pull_changes().await.unwrap();
        assert_eq!(report.applied, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, 1);
        assert_eq!(coordinator.data().lock().await.value, 5);
    }

    #[tokio::test]
    async fn push_sends_local_changes() {
        let transport = Arc::new(MockTransport::new());
        let coordinator = coordinator();
        let connection = Connection::connect(transport.clone(), Arc::clone(&coordinator), config())
            .await
            .unwrap();

        coordinator.lock().await.state_mut().value = 8;
        assert!(connection.push().await.unwrap().is_ok());
        assert_eq!(transport.pushed(), [set(8)]);
    }

    #[tokio::test]
    async fn closed_connection_rejects_calls() {
        let transport = Arc::new(MockTransport::new());
        let connection = Connection::connect(transport, coordinator(), config())
            .await
            .unwrap();
        connection.close();
        assert!(!connection.is_alive());
        assert!(matches!(
            connection.pull_init().await,
            Err(SyncError::Cancelled)
        ));
    }
}
