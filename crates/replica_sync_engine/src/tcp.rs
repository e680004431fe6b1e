//! TCP transport.
//!
//! Each call opens its own connection, sends `Call(kind)` and the request,
//! then exchanges frames as described in [`crate::wire`].

use crate::error::{SyncError, SyncResult};
use crate::transport::{Streaming, SyncTransport};
use crate::wire::{self, DEFAULT_MAX_FRAME_SIZE};
use async_trait::async_trait;
use replica_sync_protocol::{CallKind, ControlMessage, ControlReply, Frame, PullRequest};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tracing::{debug, info, warn};

/// A [`SyncTransport`] that reaches a remote server over TCP.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    addr: SocketAddr,
    connect_timeout: Duration,
    max_frame_size: usize,
    stream_buffer: usize,
}

impl TcpTransport {
    /// Resolves `addr` and checks it is reachable within `timeout`.
    ///
    /// An unreachable peer fails with [`SyncError::Unavailable`]; an address
    /// that does not resolve fails with [`SyncError::Setup`].
    pub async fn connect(addr: &str, timeout: Duration) -> SyncResult<Self> {
        let resolved = lookup_host(addr)
            .await
            .map_err(|e| SyncError::Setup(format!("invalid address {addr}: {e}")))?
            .next()
            .ok_or_else(|| SyncError::Setup(format!("address {addr} resolved to nothing")))?;

        let transport = Self {
            addr: resolved,
            connect_timeout: timeout,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            stream_buffer: 64,
        };
        drop(transport.open().await?);
        info!(addr = %resolved, "sync peer reachable");
        Ok(transport)
    }

    /// Sets the largest frame accepted from the peer.
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Sets the capacity of inbound entry streams.
    pub fn with_stream_buffer(mut self, capacity: usize) -> Self {
        self.stream_buffer = capacity.max(1);
        self
    }

    /// Returns the peer address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    async fn open(&self) -> SyncResult<TcpStream> {
        let stream = match tokio::time::timeout(self.connect_timeout, TcpStream::connect(self.addr))
            .await
        {
            Err(_) => {
                return Err(SyncError::Unavailable(format!(
                    "connecting to {} timed out after {:?}",
                    self.addr, self.connect_timeout
                )))
            }
            Ok(Err(e)) if is_unreachable(&e) => {
                warn!(addr = %self.addr, error = %e, "sync peer unreachable");
                return Err(SyncError::Unavailable(format!("{}: {e}", self.addr)));
            }
            Ok(Err(e)) => return Err(SyncError::Setup(format!("{}: {e}", self.addr))),
            Ok(Ok(stream)) => stream,
        };
        stream
            .set_nodelay(true)
            .map_err(|e| SyncError::Setup(format!("socket setup failed: {e}")))?;
        Ok(stream)
    }

    async fn open_call(&self, kind: CallKind) -> SyncResult<TcpStream> {
        let mut stream = self.open().await?;
        wire::write_frame(&mut stream, &Frame::Call(kind)).await?;
        debug!(addr = %self.addr, call = ?kind, "call opened");
        Ok(stream)
    }
}

fn is_unreachable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::TimedOut
            | io::ErrorKind::AddrNotAvailable
    )
}

#[async_trait]
impl SyncTransport for TcpTransport {
    async fn control(&self, message: ControlMessage) -> SyncResult<ControlReply> {
        let mut stream = self.open_call(CallKind::Control).await?;
        wire::write_frame(&mut stream, &Frame::Control(message)).await?;
        wire::read_reply(&mut stream, self.max_frame_size).await
    }

    async fn pull(&self, request: PullRequest) -> SyncResult<Streaming> {
        let mut stream = self.open_call(CallKind::Pull).await?;
        wire::write_frame(&mut stream, &Frame::Pull(request)).await?;
        Ok(wire::spawn_entry_reader(
            stream,
            self.max_frame_size,
            self.stream_buffer,
        ))
    }

    async fn push(&self, entries: Streaming) -> SyncResult<ControlReply> {
        let mut stream = self.open_call(CallKind::Push).await?;
        wire::write_entries(&mut stream, entries).await?;
        wire::read_reply(&mut stream, self.max_frame_size).await
    }

    async fn push_pull(&self, entries: Streaming) -> SyncResult<Streaming> {
        let stream = self.open_call(CallKind::PushPull).await?;
        let (reader, mut writer) = stream.into_split();
        let addr = self.addr;
        tokio::spawn(async move {
            if let Err(err) = wire::write_entries(&mut writer, entries).await {
                err.log_termination("push-pull writer");
            }
            debug!(%addr, "push-pull writer finished");
        });
        Ok(wire::spawn_entry_reader(
            reader,
            self.max_frame_size,
            self.stream_buffer,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn malformed_address_is_a_setup_error() {
        let result = TcpTransport::connect("not an address", Duration::from_millis(100)).await;
        assert!(matches!(result, Err(SyncError::Setup(_))));
    }

    #[tokio::test]
    async fn refused_connection_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = TcpTransport::connect(&addr.to_string(), Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(err.is_unavailable(), "{err}");
    }

    #[tokio::test]
    async fn control_call_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                let Some(Frame::Call(CallKind::Control)) =
                    wire::read_frame(&mut socket, DEFAULT_MAX_FRAME_SIZE).await.unwrap()
                else {
                    continue;
                };
                wire::read_frame(&mut socket, DEFAULT_MAX_FRAME_SIZE).await.unwrap();
                wire::write_frame(&mut socket, &Frame::ControlReply(ControlReply::ok()))
                    .await
                    .unwrap();
            }
        });

        let transport = TcpTransport::connect(&addr.to_string(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(transport.addr(), addr);
        let reply = transport.control(ControlMessage::ping()).await.unwrap();
        assert!(reply.is_ok());
    }
}
