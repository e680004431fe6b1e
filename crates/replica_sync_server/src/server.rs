//! The sync server.

use crate::config::ServerConfig;
use async_trait::async_trait;
use parking_lot::Mutex;
use replica_core::{BatchReport, Coordinator, Extractor, Reflect, Scope};
use replica_sync_engine::{run_push_pull, Streaming, SyncResult, SyncTransport};
use replica_sync_protocol::{
    ControlAction, ControlMessage, ControlReply, PullMode, PullRequest,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Serves one coordinator's value to sync peers.
///
/// The server implements [`SyncTransport`] itself, so in-process peers can
/// use it directly; [`TcpServer`](crate::TcpServer) exposes it over TCP.
///
/// # Example
///
/// ```
/// use replica_core::{reflect_struct, Coordinator, CoordinatorConfig, Scope};
/// use replica_sync_server::{ServerConfig, SyncServer};
/// use std::sync::Arc;
/// use tokio::sync::Mutex;
///
/// #[derive(Debug, Clone, Default)]
/// struct Doc {
///     title: String,
/// }
///
/// reflect_struct!(Doc { title });
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let coordinator = Arc::new(Coordinator::new(
///     &Scope::new(),
///     Arc::new(Mutex::new(Doc::default())),
///     CoordinatorConfig::new(),
/// ));
/// let server = SyncServer::new(coordinator, ServerConfig::default());
/// assert_eq!(server.active_sessions(), 0);
/// # });
/// ```
pub struct SyncServer<T> {
    coordinator: Arc<Coordinator<T>>,
    config: ServerConfig,
    /// Parent of every live session; replaced on remote shutdown.
    sessions: Mutex<Scope>,
    active: Arc<AtomicUsize>,
}

impl<T: Reflect + Clone + Default> SyncServer<T> {
    /// Creates a new sync server.
    pub fn new(coordinator: Arc<Coordinator<T>>, config: ServerConfig) -> Self {
        let sessions = Mutex::new(coordinator.scope().child());
        Self {
            coordinator,
            config,
            sessions,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the served coordinator.
    pub fn coordinator(&self) -> &Arc<Coordinator<T>> {
        &self.coordinator
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the number of push-pull sessions still running.
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Ends every active session. New sessions are still accepted.
    pub fn shutdown_sessions(&self) {
        let fresh = self.coordinator.scope().child();
        let previous = std::mem::replace(&mut *self.sessions.lock(), fresh);
        previous.cancel();
        info!(active = self.active_sessions(), "active sessions cancelled");
    }

    fn session_scope(&self) -> Scope {
        self.sessions.lock().child()
    }
}

#[async_trait]
impl<T: Reflect + Clone + Default> SyncTransport for SyncServer<T> {
    async fn control(&self, message: ControlMessage) -> SyncResult<ControlReply> {
        match message.action {
            ControlAction::Ping => debug!("ping"),
            ControlAction::Shutdown => self.shutdown_sessions(),
        }
        Ok(ControlReply::ok())
    }

    async fn pull(&self, request: PullRequest) -> SyncResult<Streaming> {
        let entries = match request.mode {
            PullMode::Init => self.coordinator.resync().await?,
            PullMode::Changes => self.coordinator.entries().await?,
            PullMode::Settings => Extractor::new().entries(&self.config.settings),
        };
        debug!(mode = ?request.mode, count = entries.len(), "serving pull");
        Ok(Streaming::from_entries(entries))
    }

    async fn push(&self, mut entries: Streaming) -> SyncResult<ControlReply> {
        let mut report = BatchReport::default();
        while let Some(entry) = entries.message().await? {
            report.merge(
                self.coordinator
                    .add_all(std::slice::from_ref(&entry))
                    .await?,
            );
        }
        if report.is_clean() {
            debug!(applied = report.applied, "push applied");
            return Ok(ControlReply::ok());
        }
        warn!(
            applied = report.applied,
            failed = report.failures.len(),
            "push applied with failures"
        );
        Ok(ControlReply::error(format!(
            "{} of {} entries failed",
            report.failures.len(),
            report.total()
        )))
    }

    async fn push_pull(&self, entries: Streaming) -> SyncResult<Streaming> {
        let scope = self.session_scope();
        let (outbound_tx, outbound) = Streaming::channel(self.config.stream_buffer);
        let coordinator = Arc::clone(&self.coordinator);
        let poll_interval = self.config.poll_interval;
        let active = Arc::clone(&self.active);
        let count = active.fetch_add(1, Ordering::SeqCst) + 1;
        info!(active = count, "push-pull session opened");

        tokio::spawn(async move {
            let result = run_push_pull(
                coordinator,
                Arc::new(Extractor::new()),
                outbound_tx,
                entries,
                scope,
                poll_interval,
            )
            .await;
            let remaining = active.fetch_sub(1, Ordering::SeqCst) - 1;
            match result {
                Ok(()) => info!(active = remaining, "push-pull session closed"),
                Err(err) => err.log_termination("push-pull session"),
            }
        });
        Ok(outbound)
    }
}
