//! One-shot completion signals shared between a producer, its handler and
//! whoever observes the connection.

use std::sync::{Arc, OnceLock};

use tokio::sync::Notify;

/// How a [`Deferred`] settled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Settlement {
    Resolved,
    Rejected,
}

#[derive(Debug, Default)]
struct DeferredInner {
    state: OnceLock<Settlement>,
    notify: Notify,
}

/// A value that settles exactly once, as resolved or rejected.
///
/// Clones share the same slot. The first call to [`Deferred::resolve`] or
/// [`Deferred::reject`] wins; every later attempt is ignored.
#[derive(Clone, Debug, Default)]
pub struct Deferred {
    inner: Arc<DeferredInner>,
}

impl Deferred {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if this call settled the deferred.
    pub fn resolve(&self) -> bool {
        self.settle(Settlement::Resolved)
    }

    /// Returns `true` if this call settled the deferred.
    pub fn reject(&self) -> bool {
        self.settle(Settlement::Rejected)
    }

    pub fn settlement(&self) -> Option<Settlement> {
        self.inner.state.get().copied()
    }

    pub fn is_settled(&self) -> bool {
        self.settlement().is_some()
    }

    pub async fn settled(&self) -> Settlement {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent settle cannot slip
            // between the check and the await.
            notified.as_mut().enable();

            if let Some(settlement) = self.settlement() {
                return settlement;
            }
            notified.await;
        }
    }

    fn settle(&self, settlement: Settlement) -> bool {
        if self.inner.state.set(settlement).is_err() {
            return false;
        }
        self.inner.notify.notify_waiters();
        true
    }
}

/// Resolved once the server observes the response connection as closed.
#[derive(Clone, Debug, Default)]
pub struct AbortSignal(Deferred);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) -> bool {
        self.0.resolve()
    }

    pub fn is_aborted(&self) -> bool {
        self.0.is_settled()
    }

    pub async fn aborted(&self) {
        self.0.settled().await;
    }
}

/// Fires an [`AbortSignal`] when dropped.
#[derive(Debug)]
pub(crate) struct AbortGuard(AbortSignal);

impl AbortGuard {
    pub(crate) fn new(signal: AbortSignal) -> Self {
        Self(signal)
    }
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn first_settle_wins() {
        let deferred = Deferred::new();
        assert!(deferred.reject());
        assert!(!deferred.resolve());
        assert_eq!(deferred.settlement(), Some(Settlement::Rejected));
    }

    #[tokio::test]
    async fn waiters_wake_on_settle() {
        let deferred = Deferred::new();
        let waiter = {
            let deferred = deferred.clone();
            tokio::spawn(async move { deferred.settled().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        deferred.resolve();
        let settlement = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter timed out")
            .expect("waiter panicked");
        assert_eq!(settlement, Settlement::Resolved);
    }

    #[tokio::test]
    async fn settled_returns_immediately_when_already_settled() {
        let deferred = Deferred::new();
        deferred.reject();
        assert_eq!(deferred.settled().await, Settlement::Rejected);
    }

    #[tokio::test]
    async fn abort_guard_fires_signal_on_drop() {
        let signal = AbortSignal::new();
        let guard = AbortGuard::new(signal.clone());
        assert!(!signal.is_aborted());

        drop(guard);
        assert!(signal.is_aborted());
        signal.aborted().await;
    }
}
