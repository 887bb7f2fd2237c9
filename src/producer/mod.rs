//! Slow incremental counter producers.
//!
//! A producer emits `0`, `1`, `2`, ... as ASCII chunks, one per interval,
//! until it either reaches its bound or is cancelled. Which of the two
//! happened is recorded once in its cleanup signal.

mod readable;
mod streamable;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::signal::{Deferred, Settlement};

pub use readable::Readable;
pub use streamable::Streamable;

pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// Pause before every emitted chunk.
    pub interval_ms: u64,
    /// The producer stops on its own once the counter reaches this value.
    pub bound: u64,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            bound: 25,
        }
    }
}

impl ProducerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    fn effective_bound(&self) -> u64 {
        self.bound.max(1)
    }
}

/// Why a producer stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// Stopped from the outside before reaching the bound.
    Cancelled,
    /// Reached the bound and ended the stream itself.
    Exhausted,
}

impl From<Settlement> for Completion {
    fn from(settlement: Settlement) -> Self {
        match settlement {
            Settlement::Resolved => Completion::Cancelled,
            Settlement::Rejected => Completion::Exhausted,
        }
    }
}

#[derive(Debug)]
struct ProducerInner {
    counter: AtomicU64,
    cleaned_up: Deferred,
    config: ProducerConfig,
}

/// Shared view of a producer's counter and cleanup signal.
#[derive(Clone, Debug)]
pub struct Producer {
    inner: Arc<ProducerInner>,
}

impl Producer {
    fn new(config: ProducerConfig) -> Self {
        Self {
            inner: Arc::new(ProducerInner {
                counter: AtomicU64::new(0),
                cleaned_up: Deferred::new(),
                config,
            }),
        }
    }

    /// The next value to be emitted, which is also the number of chunks
    /// emitted so far.
    pub fn value(&self) -> u64 {
        self.inner.counter.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> ProducerConfig {
        self.inner.config
    }

    pub fn completion(&self) -> Option<Completion> {
        self.inner.cleaned_up.settlement().map(Completion::from)
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.cleaned_up.is_settled()
    }

    pub async fn cleaned_up(&self) -> Completion {
        self.inner.cleaned_up.settled().await.into()
    }

    /// Emits the current counter value and advances it. Marks the producer
    /// exhausted when the emitted chunk is the last one before the bound.
    ///
    /// Returns `None` once the producer has stopped for any reason.
    pub(crate) fn emit(&self) -> Option<Bytes> {
        if self.is_stopped() {
            return None;
        }

        let value = self.inner.counter.fetch_add(1, Ordering::SeqCst);
        if value.saturating_add(1) >= self.inner.config.effective_bound() {
            self.exhaust();
        }
        Some(Bytes::from(value.to_string()))
    }

    pub(crate) fn cancel(&self) -> bool {
        let cancelled = self.inner.cleaned_up.resolve();
        if cancelled {
            tracing::debug!(value = self.value(), "producer cancelled");
        }
        cancelled
    }

    fn exhaust(&self) -> bool {
        let exhausted = self.inner.cleaned_up.reject();
        if exhausted {
            tracing::debug!(value = self.value(), "producer reached its bound");
        }
        exhausted
    }
}
