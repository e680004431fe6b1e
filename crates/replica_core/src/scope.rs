//! Cooperative cancellation scopes.
//!
//! A [`Scope`] can be cloned and shared across tasks. Cancelling any clone
//! cancels them all. A child scope observes its parent's cancellation, but
//! cancelling a child leaves the parent running.
//!
//! ```
//! use replica_core::Scope;
//!
//! let root = Scope::new();
//! let session = root.child();
//!
//! session.cancel();
//! assert!(session.is_cancelled());
//! assert!(!root.is_cancelled());
//!
//! let other = root.child();
//! root.cancel();
//! assert!(other.is_cancelled());
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::watch;

struct Inner {
    cancelled: watch::Sender<bool>,
    parent: Option<Scope>,
}

/// A cancellation scope.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<Inner>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl Scope {
    /// Creates a root scope.
    pub fn new() -> Self {
        Self::with_parent(None)
    }

    fn with_parent(parent: Option<Scope>) -> Self {
        let (cancelled, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner { cancelled, parent }),
        }
    }

    /// Creates a child scope.
    pub fn child(&self) -> Self {
        Self::with_parent(Some(self.clone()))
    }

    /// Requests cancellation of this scope and its children.
    pub fn cancel(&self) {
        self.inner.cancelled.send_replace(true);
    }

    /// Checks whether this scope or an ancestor was cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.borrow()
            || self
                .inner
                .parent
                .as_ref()
                .is_some_and(Scope::is_cancelled)
    }

    /// Completes once this scope or an ancestor is cancelled.
    pub fn cancelled(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            match &self.inner.parent {
                Some(parent) => {
                    tokio::select! {
                        () = self.own_cancellation() => {}
                        () = parent.cancelled() => {}
                    }
                }
                None => self.own_cancellation().await,
            }
        })
    }

    async fn own_cancellation(&self) {
        let mut rx = self.inner.cancelled.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn clones_share_state() {
        let scope = Scope::new();
        let clone = scope.clone();
        clone.cancel();
        assert!(scope.is_cancelled());
    }

    #[test]
    fn child_does_not_cancel_parent() {
        let parent = Scope::new();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_resolves_for_grandchildren() {
        let root = Scope::new();
        let grandchild = root.child().child();
        let waiter = tokio::spawn(async move { grandchild.cancelled().await });
        tokio::task::yield_now().await;
        root.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("cancellation propagates")
            .unwrap();
    }

    #[tokio::test]
    async fn cancelled_resolves_immediately_when_already_cancelled() {
        let scope = Scope::new();
        scope.cancel();
        tokio::time::timeout(Duration::from_millis(100), scope.cancelled())
            .await
            .unwrap();
    }
}
