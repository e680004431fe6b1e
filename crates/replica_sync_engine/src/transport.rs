//! Transport abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use replica_sync_protocol::{ControlAction, ControlMessage, ControlReply, Entry, PullRequest};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Sending half of a [`Streaming`].
pub type StreamSender = mpsc::Sender<SyncResult<Entry>>;

/// A stream of change records.
///
/// The stream ends cleanly when every sender is dropped. A sender may report
/// a failure instead of an entry; the receiver sees it as an error and should
/// stop reading.
#[derive(Debug)]
pub struct Streaming {
    receiver: mpsc::Receiver<SyncResult<Entry>>,
}

impl Streaming {
    /// Wraps a receiver.
    pub fn new(receiver: mpsc::Receiver<SyncResult<Entry>>) -> Self {
        Self { receiver }
    }

    /// Creates a bounded stream and its sender.
    pub fn channel(capacity: usize) -> (StreamSender, Self) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (sender, Self::new(receiver))
    }

    /// Creates a finished stream carrying `entries`.
    pub fn from_entries(entries: Vec<Entry>) -> Self {
        let (sender, stream) = Self::channel(entries.len());
        for entry in entries {
            if sender.try_send(Ok(entry)).is_err() {
                break;
            }
        }
        stream
    }

    /// Creates a stream that ends immediately.
    pub fn empty() -> Self {
        Self::from_entries(Vec::new())
    }

    /// Receives the next entry. `Ok(None)` marks the clean end of the stream.
    pub async fn message(&mut self) -> SyncResult<Option<Entry>> {
        match self.receiver.recv().await {
            Some(Ok(entry)) => Ok(Some(entry)),
            Some(Err(err)) => Err(err),
            None => Ok(None),
        }
    }

    /// Reads the stream to its end.
    pub async fn collect(mut self) -> SyncResult<Vec<Entry>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.message().await? {
            entries.push(entry);
        }
        Ok(entries)
    }
}

/// The four call shapes a sync peer serves.
///
/// Implemented by the server itself for in-process use and by network
/// transports that carry the same calls to a remote server.
#[async_trait]
pub trait SyncTransport: Send + Sync + 'static {
    /// Unary control call.
    async fn control(&self, message: ControlMessage) -> SyncResult<ControlReply>;

    /// Server-streaming pull.
    async fn pull(&self, request: PullRequest) -> SyncResult<Streaming>;

    /// Client-streaming push.
    async fn push(&self, entries: Streaming) -> SyncResult<ControlReply>;

    /// Bidirectional session.
    async fn push_pull(&self, entries: Streaming) -> SyncResult<Streaming>;
}

/// A mock transport for testing.
#[derive(Debug, Default)]
pub struct MockTransport {
    disconnected: AtomicBool,
    pings: AtomicUsize,
    ping_reply: Mutex<Option<ControlReply>>,
    ping_delay: Mutex<Option<Duration>>,
    pull_entries: Mutex<Vec<Entry>>,
    pushed: Arc<Mutex<Vec<Entry>>>,
}

impl MockTransport {
    /// Creates a connected mock transport that answers every ping with `Ok`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the reply to every ping.
    pub fn set_ping_reply(&self, reply: ControlReply) {
        *self.ping_reply.lock() = Some(reply);
    }

    /// Delays every ping reply.
    pub fn set_ping_delay(&self, delay: Duration) {
        *self.ping_delay.lock() = Some(delay);
    }

    /// Sets the entries served to every pull.
    pub fn set_pull_entries(&self, entries: Vec<Entry>) {
        *self.pull_entries.lock() = entries;
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.disconnected.store(!connected, Ordering::SeqCst);
    }

    /// Returns the number of pings received.
    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    /// Returns every entry pushed so far.
    pub fn pushed(&self) -> Vec<Entry> {
        self.pushed.lock().clone()
    }

    fn check_connected(&self) -> SyncResult<()> {
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(SyncError::Unavailable("mock transport disconnected".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    async fn control(&self, message: ControlMessage) -> SyncResult<ControlReply> {
        self.check_connected()?;
        if message.action != ControlAction::Ping {
            return Ok(ControlReply::ok());
        }
        self.pings.fetch_add(1, Ordering::SeqCst);
        let delay = *self.ping_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.ping_reply.lock().clone().unwrap_or_else(ControlReply::ok))
    }

    async fn pull(&self, _request: PullRequest) -> SyncResult<Streaming> {
        self.check_connected()?;
        Ok(Streaming::from_entries(self.pull_entries.lock().clone()))
    }

    async fn push(&self, entries: Streaming) -> SyncResult<ControlReply> {
        self.check_connected()?;
        let entries = entries.collect().await?;
        self.pushed.lock().extend(entries);
        Ok(ControlReply::ok())
    }

    async fn push_pull(&self, mut entries: Streaming) -> SyncResult<Streaming> {
        self.check_connected()?;
        let pushed = Arc::clone(&self.pushed);
        tokio::spawn(async move {
            while let Ok(Some(entry)) = entries.message().await {
                pushed.lock().push(entry);
            }
        });
        Ok(Streaming::from_entries(self.pull_entries.lock().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replica_sync_protocol::{Key, PullMode};

    fn entry(value: i64) -> Entry {
        Entry::set(vec![Key::new("Doc"), Key::new("n")], value)
    }

    #[tokio::test]
    async fn streaming_from_entries_ends_cleanly() {
        let mut stream = Streaming::from_entries(vec![entry(1), entry(2)]);
        assert_eq!(stream.message().await.unwrap(), Some(entry(1)));
        assert_eq!(stream.message().await.unwrap(), Some(entry(2)));
        assert_eq!(stream.message().await.unwrap(), None);
        assert!(Streaming::empty().collect().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn streaming_surfaces_sender_errors() {
        let (sender, mut stream) = Streaming::channel(2);
        sender.send(Ok(entry(1))).await.unwrap();
        sender.send(Err(SyncError::Cancelled)).await.unwrap();
        drop(sender);
        assert!(stream.message().await.unwrap().is_some());
        assert!(matches!(stream.message().await, Err(SyncError::Cancelled)));
    }

    #[tokio::test]
    async fn mock_transport_not_connected_error() {
        let transport = MockTransport::new();
        transport.set_connected(false);
        let result = transport.control(ControlMessage::ping()).await;
        assert!(matches!(result, Err(SyncError::Unavailable(_))));
    }

    #[tokio::test]
    async fn mock_transport_records_pushes() {
        let transport = MockTransport::new();
        transport.set_pull_entries(vec![entry(7)]);
        let reply = transport
            .push(Streaming::from_entries(vec![entry(1)]))
            .await
            .unwrap();
        assert!(reply.is_ok());
        assert_eq!(transport.pushed(), [entry(1)]);

        let pulled = transport
            .pull(PullRequest::new(PullMode::Changes))
            .await
            .unwrap();
        assert_eq!(pulled.collect().await.unwrap(), [entry(7)]);
    }

    #[tokio::test]
    async fn mock_transport_counts_pings() {
        let transport = MockTransport::new();
        transport.set_ping_reply(ControlReply::error("draining"));
        let reply = transport.control(ControlMessage::ping()).await.unwrap();
        assert!(!reply.is_ok());
        assert_eq!(transport.pings(), 1);
    }
}
