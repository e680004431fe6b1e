//! Binds extraction and injection to one shared data instance.
//!
//! The coordinator owns one [`Extractor`] and one [`Injector`] for a value
//! behind an async mutex, and reports activity through two debounced
//! callbacks: one after entries are injected, one after entries are
//! extracted. A burst of changes inside the debounce window produces a
//! single callback.

use crate::config::CoordinatorConfig;
use crate::error::{CoreError, CoreResult};
use crate::extract::Extractor;
use crate::inject::{BatchReport, Injector};
use crate::reflect::Reflect;
use crate::scope::Scope;
use parking_lot::{Mutex, RwLock};
use replica_sync_protocol::Entry;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tracing::{debug, error, info, trace};

type Callback = Arc<dyn Fn() + Send + Sync>;

/// One debounced notification channel.
struct Signal {
    name: &'static str,
    sender: Mutex<Option<mpsc::Sender<()>>>,
    callback: Arc<RwLock<Option<Callback>>>,
}

impl Signal {
    /// Spawns the debounce worker on the current runtime.
    fn spawn(name: &'static str, scope: &Scope, window: Duration) -> Self {
        // A single slot: while one signal is pending, further ones are dropped.
        let (sender, receiver) = mpsc::channel(1);
        let callback = Arc::new(RwLock::new(None));
        tokio::spawn(debounce(
            name,
            receiver,
            window,
            Arc::clone(&callback),
            scope.clone(),
        ));
        Self {
            name,
            sender: Mutex::new(Some(sender)),
            callback,
        }
    }

    fn notify(&self) -> CoreResult<()> {
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            error!(signal = self.name, "change signalled after coordinator closed");
            return Err(CoreError::Closed);
        };
        match sender.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => Ok(()),
            Err(TrySendError::Closed(())) => {
                error!(signal = self.name, "debounce worker is gone");
                Err(CoreError::Closed)
            }
        }
    }

    fn set_callback(&self, callback: Callback) {
        *self.callback.write() = Some(callback);
    }

    fn close(&self) {
        self.sender.lock().take();
    }
}

async fn debounce(
    name: &'static str,
    mut receiver: mpsc::Receiver<()>,
    window: Duration,
    callback: Arc<RwLock<Option<Callback>>>,
    scope: Scope,
) {
    loop {
        tokio::select! {
            () = scope.cancelled() => break,
            signal = receiver.recv() => {
                if signal.is_none() {
                    break;
                }
            }
        }
        tokio::select! {
            () = scope.cancelled() => break,
            () = tokio::time::sleep(window) => {}
        }
        while receiver.try_recv().is_ok() {}

        let current = callback.read().clone();
        if let Some(callback) = current {
            callback();
        }
        trace!(signal = name, "debounced callback fired");
    }
    debug!(signal = name, "debounce worker stopped");
}

/// Pairs one extractor and one injector with a shared value.
pub struct Coordinator<T> {
    data: Arc<AsyncMutex<T>>,
    extractor: Extractor<T>,
    injector: Injector,
    scope: Scope,
    injected: Signal,
    extracted: Signal,
}

impl<T: Reflect + Clone + Default> Coordinator<T> {
    /// Creates a coordinator over `data`.
    ///
    /// The debounce workers run on the current Tokio runtime until `scope`
    /// is cancelled or the coordinator is closed. Must be called from within
    /// a runtime.
    pub fn new(scope: &Scope, data: Arc<AsyncMutex<T>>, config: CoordinatorConfig) -> Self {
        let scope = scope.child();
        Self {
            injected: Signal::spawn("injected", &scope, config.debounce),
            extracted: Signal::spawn("extracted", &scope, config.debounce),
            data,
            extractor: Extractor::new(),
            injector: Injector::new(),
            scope,
        }
    }

    /// Registers the callback fired after entries are injected.
    pub fn on_injected(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.injected.set_callback(Arc::new(callback));
    }

    /// Registers the callback fired after entries are extracted.
    pub fn on_extracted(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.extracted.set_callback(Arc::new(callback));
    }

    /// Locks the data for one critical section.
    pub async fn lock(&self) -> CoordinatorGuard<'_, T> {
        CoordinatorGuard {
            coordinator: self,
            data: self.data.lock().await,
        }
    }

    /// Applies one entry.
    pub async fn add(&self, entry: &Entry) -> CoreResult<()> {
        self.lock().await.add(entry)
    }

    /// Applies every entry, best-effort.
    pub async fn add_all(&self, entries: &[Entry]) -> CoreResult<BatchReport> {
        self.lock().await.add_all(entries)
    }

    /// Extracts the changes since the previous extraction.
    pub async fn entries(&self) -> CoreResult<Vec<Entry>> {
        self.lock().await.entries()
    }

    /// Resets the extractor so the next extraction reports the full state.
    ///
    /// Waits for the data lock, so an extraction already in flight finishes
    /// against the old snapshot.
    pub async fn reset(&self) {
        self.lock().await.reset();
    }

    /// Resets the extractor and extracts the full state in one critical
    /// section. No other extraction can take the full state in between.
    pub async fn resync(&self) -> CoreResult<Vec<Entry>> {
        let guard = self.lock().await;
        guard.reset();
        guard.entries()
    }

    /// Returns the shared data handle.
    pub fn data(&self) -> Arc<AsyncMutex<T>> {
        Arc::clone(&self.data)
    }

    /// Returns the coordinator's scope.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Returns the coordinator's injector.
    pub fn injector(&self) -> Injector {
        self.injector
    }

    /// Stops the debounce workers. Later change signals fail with
    /// [`CoreError::Closed`].
    pub fn close(&self) {
        self.injected.close();
        self.extracted.close();
        self.scope.cancel();
        info!("coordinator closed");
    }

    /// Returns true once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.injected.sender.lock().is_none()
    }
}

/// Exclusive access to a coordinator's data.
pub struct CoordinatorGuard<'a, T> {
    coordinator: &'a Coordinator<T>,
    data: AsyncMutexGuard<'a, T>,
}

impl<T: Reflect + Clone + Default> CoordinatorGuard<'_, T> {
    /// Applies one entry and signals the injected callback.
    pub fn add(&mut self, entry: &Entry) -> CoreResult<()> {
        self.coordinator.injector.apply(&mut *self.data, entry)?;
        self.coordinator.injected.notify()
    }

    /// Applies every entry, best-effort, and signals once if any applied.
    pub fn add_all(&mut self, entries: &[Entry]) -> CoreResult<BatchReport> {
        let report = self.coordinator.injector.apply_all(&mut *self.data, entries);
        if report.applied > 0 {
            self.coordinator.injected.notify()?;
        }
        Ok(report)
    }

    /// Resets the coordinator's extractor so the next extraction reports the
    /// full state.
    pub fn reset(&self) {
        self.coordinator.extractor.reset();
    }

    /// Extracts with the coordinator's extractor and signals if anything changed.
    ///
    /// Fails with [`CoreError::Closed`] once the coordinator is closed,
    /// leaving the extractor's snapshot where it was.
    pub fn entries(&self) -> CoreResult<Vec<Entry>> {
        if self.coordinator.is_closed() {
            error!("extraction requested after coordinator closed");
            return Err(CoreError::Closed);
        }
        let entries = self.coordinator.extractor.entries(&self.data);
        if !entries.is_empty() {
            self.coordinator.extracted.notify()?;
        }
        Ok(entries)
    }

    /// Extracts with a caller-owned extractor; no callback is signalled.
    pub fn diff_with(&self, extractor: &Extractor<T>) -> Vec<Entry> {
        extractor.entries(&self.data)
    }

    /// Advances a caller-owned extractor to the current state.
    pub fn absorb(&self, extractor: &Extractor<T>) {
        extractor.absorb(&self.data);
    }

    /// Returns the data.
    pub fn state(&self) -> &T {
        &self.data
    }

    /// Returns the data mutably. Changes made here are picked up by the next
    /// extraction.
    pub fn state_mut(&mut self) -> &mut T {
        &mut self.data
    }
}

impl<T> Deref for CoordinatorGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

impl<T> DerefMut for CoordinatorGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replica_sync_protocol::Key;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, Default)]
    struct Counter {
        value: i64,
    }

    crate::reflect_struct!(Counter { value });

    fn set(value: i64) -> Entry {
        Entry::set(vec![Key::new("Counter"), Key::new("value")], value)
    }

    fn coordinator() -> Coordinator<Counter> {
        Coordinator::new(
            &Scope::new(),
            Arc::new(AsyncMutex::new(Counter::default())),
            CoordinatorConfig::new().debounce(Duration::from_millis(100)),
        )
    }

    fn counting(hits: &Arc<AtomicUsize>) -> impl Fn() + Send + Sync + 'static {
        let hits = Arc::clone(hits);
        move || {
            hits.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_injections_fires_once() {
        let coordinator = coordinator();
        let hits = Arc::new(AtomicUsize::new(0));
        coordinator.on_injected(counting(&hits));

        for value in 0..5 {
            coordinator.add(&set(value)).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        coordinator.add(&set(9)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(coordinator.data().lock().await.value, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn extraction_signals_only_on_changes() {
        let coordinator = coordinator();
        let hits = Arc::new(AtomicUsize::new(0));
        coordinator.on_extracted(counting(&hits));

        assert!(coordinator.entries().await.unwrap().is_empty());
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        coordinator.lock().await.state_mut().value = 4;
        assert_eq!(coordinator.entries().await.unwrap().len(), 1);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn signalling_after_close_is_an_error() {
        let coordinator = coordinator();
        coordinator.close();
        assert!(coordinator.is_closed());
        assert!(matches!(
            coordinator.add(&set(1)).await,
            Err(CoreError::Closed)
        ));
        // The entry itself was still applied before the signal failed.
        assert_eq!(coordinator.data().lock().await.value, 1);
    }

    #[tokio::test]
    async fn reset_reports_full_state() {
        let coordinator = coordinator();
        coordinator.add(&set(3)).await.unwrap();
        assert_eq!(coordinator.entries().await.unwrap(), [set(3)]);
        assert!(coordinator.entries().await.unwrap().is_empty());
        coordinator.reset().await;
        assert_eq!(coordinator.entries().await.unwrap(), [set(3)]);
    }

    #[tokio::test]
    async fn resync_is_not_split_by_a_waiting_extraction() {
        let coordinator = Arc::new(coordinator());
        coordinator.add(&set(3)).await.unwrap();
        assert_eq!(coordinator.entries().await.unwrap(), [set(3)]);

        let guard = coordinator.lock().await;
        let changes = tokio::spawn({
            let coordinator = Arc::clone(&coordinator);
            async move { coordinator.entries().await.unwrap() }
        });
        let resync = tokio::spawn({
            let coordinator = Arc::clone(&coordinator);
            async move { coordinator.resync().await.unwrap() }
        });
        // Let both queue on the lock in that order.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        drop(guard);

        assert!(changes.await.unwrap().is_empty());
        assert_eq!(resync.await.unwrap(), [set(3)]);
    }

    #[tokio::test]
    async fn extraction_after_close_keeps_pending_changes() {
        let coordinator = coordinator();
        coordinator.add(&set(4)).await.unwrap();
        coordinator.close();
        assert!(matches!(coordinator.entries().await, Err(CoreError::Closed)));

        // The snapshot did not advance, so the change is still pending.
        let guard = coordinator.lock().await;
        assert_eq!(coordinator.extractor.entries(&guard), [set(4)]);
    }

    #[tokio::test]
    async fn session_extractors_are_independent() {
        let coordinator = coordinator();
        let session = Extractor::new();
        let mut guard = coordinator.lock().await;
        guard.value = 2;
        assert_eq!(guard.diff_with(&session), [set(2)]);
        guard.value = 5;
        guard.absorb(&session);
        assert!(guard.diff_with(&session).is_empty());
        assert_eq!(guard.entries().unwrap(), [set(5)]);
    }
}
