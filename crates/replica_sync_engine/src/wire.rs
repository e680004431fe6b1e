//! Stream framing for network transports.
//!
//! Every frame is a 4-byte big-endian length followed by one CBOR-encoded
//! [`Frame`]:
//!
//! ```text
//! [u32 BE: len][CBOR Frame of len]
//! ```
//!
//! A call opens with `Call(kind)`, then the call's request frame, then the
//! entry stream(s). Entry streams close with `End`; failures travel as
//! `Status` and end the stream.

use crate::error::{SyncError, SyncResult};
use crate::transport::Streaming;
use replica_sync_protocol::{ControlReply, Frame, FromCbor, ToCbor};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

/// Default upper bound on one frame's payload.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Reads one frame.
///
/// Returns `None` on clean EOF (peer closed the connection).
pub async fn read_frame<R>(reader: &mut R, max_frame_size: usize) -> SyncResult<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_frame_size {
        return Err(SyncError::Protocol(format!(
            "frame size {len} exceeds maximum {max_frame_size}"
        )));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    let frame = Frame::decode(&payload)?;
    trace!(frame = frame.name(), len, "frame received");
    Ok(Some(frame))
}

/// Writes one frame and flushes.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> SyncResult<()>
where
    W: AsyncWrite + Unpin,
{
    let payload = frame.encode();
    let len = u32::try_from(payload.len())
        .map_err(|_| SyncError::Protocol(format!("frame of {} bytes is too large", payload.len())))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    trace!(frame = frame.name(), len, "frame sent");
    Ok(())
}

/// Reads the frame that completes a unary or client-streaming call.
pub async fn read_reply<R>(reader: &mut R, max_frame_size: usize) -> SyncResult<ControlReply>
where
    R: AsyncRead + Unpin,
{
    match read_frame(reader, max_frame_size).await? {
        Some(Frame::ControlReply(reply)) => Ok(reply),
        Some(Frame::Status { code, message }) => Err(SyncError::status(code, message)),
        Some(other) => Err(unexpected("control_reply", &other)),
        None => Err(SyncError::Unavailable(
            "connection closed before reply".into(),
        )),
    }
}

/// Writes every entry of `entries`, then `End`.
///
/// If the stream yields an error, it is reported to the peer as a `Status`
/// frame and returned.
pub async fn write_entries<W>(writer: &mut W, mut entries: Streaming) -> SyncResult<()>
where
    W: AsyncWrite + Unpin,
{
    let mut sent = 0usize;
    loop {
        match entries.message().await {
            Ok(Some(entry)) => {
                write_frame(writer, &Frame::Entry(entry)).await?;
                sent += 1;
            }
            Ok(None) => {
                write_frame(writer, &Frame::End).await?;
                debug!(sent, "entry stream finished");
                return Ok(());
            }
            Err(err) => {
                // Best effort; the peer may already be gone.
                let _ = write_frame(writer, &err.to_frame()).await;
                return Err(err);
            }
        }
    }
}

/// Spawns a task that reads entry frames into a [`Streaming`].
///
/// The task stops at `End`, at a `Status` frame (forwarded as an error), on
/// EOF before `End` (forwarded as `Unavailable`), or once the stream is
/// dropped.
pub fn spawn_entry_reader<R>(mut reader: R, max_frame_size: usize, capacity: usize) -> Streaming
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (sender, stream) = Streaming::channel(capacity);
    tokio::spawn(async move {
        let mut received = 0usize;
        loop {
            let item = match read_frame(&mut reader, max_frame_size).await {
                Ok(Some(Frame::Entry(entry))) => Ok(entry),
                Ok(Some(Frame::End)) => break,
                Ok(Some(Frame::Status { code, message })) => Err(SyncError::status(code, message)),
                Ok(Some(other)) => Err(unexpected("entry", &other)),
                Ok(None) => Err(SyncError::Unavailable(
                    "connection closed before end of stream".into(),
                )),
                Err(err) => Err(err),
            };
            let failed = item.is_err();
            if sender.send(item).await.is_err() || failed {
                break;
            }
            received += 1;
        }
        debug!(received, "entry reader stopped");
    });
    stream
}

/// Builds the error for a frame arriving out of order.
pub fn unexpected(expected: &str, frame: &Frame) -> SyncError {
    SyncError::Protocol(format!("expected {expected} frame, got {}", frame.name()))
}
