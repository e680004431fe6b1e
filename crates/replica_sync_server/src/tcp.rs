//! TCP front end for a [`SyncTransport`].
//!
//! Listens on the configured address, accepts connections, and serves one
//! call per connection. The first frame names the call; the rest follows the
//! framing in [`replica_sync_engine::wire`].

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use replica_sync_engine::wire::{self, read_frame, write_frame};
use replica_sync_engine::{SyncError, SyncResult, SyncTransport};
use replica_sync_protocol::{CallKind, ControlReply, Frame};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Handle to a running TCP server. Dropping shuts down the server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    conn_shutdown_tx: watch::Sender<bool>,
    task_handle: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Returns the address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections and closes every open one.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.conn_shutdown_tx.send(true);
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Limits {
    max_connections: usize,
    max_frame_size: usize,
    stream_buffer: usize,
}

/// TCP server for sync peers.
pub struct TcpServer;

impl TcpServer {
    /// Binds `config.bind_addr` and serves `service` on background tasks.
    ///
    /// Use port 0 to let the OS pick a port; the chosen address is on the
    /// returned handle.
    pub async fn bind(
        config: &ServerConfig,
        service: Arc<dyn SyncTransport>,
    ) -> ServerResult<ServerHandle> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.bind_addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "sync server listening");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (conn_shutdown_tx, conn_shutdown_rx) = watch::channel(false);
        let limits = Limits {
            max_connections: config.max_connections,
            max_frame_size: config.max_frame_size,
            stream_buffer: config.stream_buffer,
        };

        let task_handle = tokio::spawn(Self::accept_loop(
            listener,
            service,
            limits,
            shutdown_rx,
            conn_shutdown_rx,
        ));

        Ok(ServerHandle {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            conn_shutdown_tx,
            task_handle: Some(task_handle),
        })
    }

    async fn accept_loop(
        listener: TcpListener,
        service: Arc<dyn SyncTransport>,
        limits: Limits,
        mut shutdown_rx: oneshot::Receiver<()>,
        conn_shutdown_rx: watch::Receiver<bool>,
    ) {
        let active_connections = Arc::new(AtomicUsize::new(0));
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("sync server shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    let (stream, peer_addr) = match accept_result {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            error!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let current = active_connections.load(Ordering::Relaxed);
                    if current >= limits.max_connections {
                        warn!(
                            peer = %peer_addr,
                            max = limits.max_connections,
                            "rejecting connection: at capacity"
                        );
                        continue;
                    }

                    active_connections.fetch_add(1, Ordering::Relaxed);
                    let service = Arc::clone(&service);
                    let conns = Arc::clone(&active_connections);
                    let mut conn_shutdown = conn_shutdown_rx.clone();

                    tokio::spawn(async move {
                        debug!(peer = %peer_addr, "connection opened");
                        if let Err(err) =
                            Self::handle_connection(stream, &*service, limits, &mut conn_shutdown).await
                        {
                            err.log_termination("connection");
                        }
                        conns.fetch_sub(1, Ordering::Relaxed);
                    });
                }
            }
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        service: &dyn SyncTransport,
        limits: Limits,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> SyncResult<()> {
        stream.set_nodelay(true)?;
        let (mut reader, mut writer) = stream.into_split();

        let call = tokio::select! {
            frame = read_frame(&mut reader, limits.max_frame_size) => match frame? {
                Some(Frame::Call(kind)) => kind,
                Some(other) => return Err(wire::unexpected("call", &other)),
                // Reachability checks connect and close without a call.
                None => return Ok(()),
            },
            _ = shutdown_rx.changed() => return Ok(()),
        };
        debug!(call = ?call, "serving call");

        let served = async move {
            match call {
                CallKind::Control => {
                    let message = match read_frame(&mut reader, limits.max_frame_size).await? {
                        Some(Frame::Control(message)) => message,
                        Some(other) => return Err(wire::unexpected("control", &other)),
                        None => return Ok(()),
                    };
                    respond(&mut writer, service.control(message).await).await
                }
                CallKind::Pull => {
                    let request = match read_frame(&mut reader, limits.max_frame_size).await? {
                        Some(Frame::Pull(request)) => request,
                        Some(other) => return Err(wire::unexpected("pull", &other)),
                        None => return Ok(()),
                    };
                    match service.pull(request).await {
                        Ok(entries) => wire::write_entries(&mut writer, entries).await,
                        Err(err) => report(&mut writer, err).await,
                    }
                }
                CallKind::Push => {
                    let inbound = wire::spawn_entry_reader(
                        reader,
                        limits.max_frame_size,
                        limits.stream_buffer,
                    );
                    respond(&mut writer, service.push(inbound).await).await
                }
                CallKind::PushPull => {
                    let inbound = wire::spawn_entry_reader(
                        reader,
                        limits.max_frame_size,
                        limits.stream_buffer,
                    );
                    match service.push_pull(inbound).await {
                        Ok(outbound) => wire::write_entries(&mut writer, outbound).await,
                        Err(err) => report(&mut writer, err).await,
                    }
                }
            }
        };

        tokio::select! {
            result = served => result,
            _ = shutdown_rx.changed() => Ok(()),
        }
    }
}

async fn respond<W>(writer: &mut W, result: SyncResult<ControlReply>) -> SyncResult<()>
where
    W: AsyncWrite + Unpin,
{
    match result {
        Ok(reply) => write_frame(writer, &Frame::ControlReply(reply)).await,
        Err(err) => report(writer, err).await,
    }
}

async fn report<W>(writer: &mut W, err: SyncError) -> SyncResult<()>
where
    W: AsyncWrite + Unpin,
{
    write_frame(writer, &err.to_frame()).await?;
    Err(err)
}
