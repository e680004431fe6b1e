//! Bidirectional session loops shared by clients and servers.

use crate::error::{SyncError, SyncResult};
use crate::transport::{StreamSender, Streaming};
use parking_lot::Mutex;
use replica_core::{Coordinator, Extractor, Reflect, Scope};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

/// Runs one push-pull session until either side ends it.
///
/// The send loop diffs the shared value against `extractor` every
/// `poll_interval` and streams the entries to `outbound`. The receive loop
/// applies each inbound entry and then absorbs it into `extractor`, so
/// received changes are not echoed back.
///
/// Whichever loop finishes first cancels `scope`; the other stops at its next
/// suspension point. Returns the first failure, or `Ok(())` when the session
/// ended cleanly or was cancelled.
pub async fn run_push_pull<T>(
    coordinator: Arc<Coordinator<T>>,
    extractor: Arc<Extractor<T>>,
    outbound: StreamSender,
    mut inbound: Streaming,
    scope: Scope,
    poll_interval: Duration,
) -> SyncResult<()>
where
    T: Reflect + Clone + Default,
{
    let first_error: Mutex<Option<SyncError>> = Mutex::new(None);
    let record = |result: SyncResult<()>| {
        if let Err(err) = result {
            let mut slot = first_error.lock();
            if slot.is_none() {
                *slot = Some(err);
            }
        }
        scope.cancel();
    };

    let send = async {
        let result = send_loop(&coordinator, &extractor, &outbound, &scope, poll_interval).await;
        debug!(ok = result.is_ok(), "send loop finished");
        record(result);
    };
    let receive = async {
        let result = receive_loop(&coordinator, &extractor, &mut inbound, &scope).await;
        debug!(ok = result.is_ok(), "receive loop finished");
        record(result);
    };
    tokio::join!(send, receive);

    match first_error.into_inner() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

async fn send_loop<T>(
    coordinator: &Coordinator<T>,
    extractor: &Extractor<T>,
    outbound: &StreamSender,
    scope: &Scope,
    poll_interval: Duration,
) -> SyncResult<()>
where
    T: Reflect + Clone + Default,
{
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = scope.cancelled() => return Ok(()),
            _ = ticker.tick() => {}
        }
        let entries = coordinator.lock().await.diff_with(extractor);
        if !entries.is_empty() {
            trace!(count = entries.len(), "sending local changes");
        }
        for entry in entries {
            tokio::select! {
                () = scope.cancelled() => return Ok(()),
                sent = outbound.send(Ok(entry)) => {
                    if sent.is_err() {
                        return Err(SyncError::Unavailable("peer stopped receiving".into()));
                    }
                }
            }
        }
    }
}

async fn receive_loop<T>(
    coordinator: &Coordinator<T>,
    extractor: &Extractor<T>,
    inbound: &mut Streaming,
    scope: &Scope,
) -> SyncResult<()>
where
    T: Reflect + Clone + Default,
{
    loop {
        let message = tokio::select! {
            () = scope.cancelled() => return Ok(()),
            message = inbound.message() => message?,
        };
        let Some(entry) = message else {
            debug!("peer closed its stream");
            return Ok(());
        };
        let mut guard = coordinator.lock().await;
        guard.add_all(std::slice::from_ref(&entry))?;
        guard.absorb(extractor);
    }
}
