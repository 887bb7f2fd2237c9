use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Completion, Producer, ProducerConfig};

/// Push-driven producer that writes into a bounded sink.
///
/// A chunk is produced whenever the sink has room. Closing the sink or
/// calling [`Readable::destroy`] cancels the producer; reaching the bound
/// ends it and closes the sink from this side.
pub struct Readable {
    producer: Producer,
    destroyed: CancellationToken,
}

impl Readable {
    pub fn new(config: ProducerConfig) -> Self {
        Self {
            producer: Producer::new(config),
            destroyed: CancellationToken::new(),
        }
    }

    pub fn producer(&self) -> &Producer {
        &self.producer
    }

    pub fn destroy(&self) {
        self.destroyed.cancel();
    }

    /// Pushes chunks into `sink` until the bound is reached, the sink is
    /// closed, or the readable is destroyed. The sink is dropped on return.
    pub async fn pipe(&self, sink: mpsc::Sender<std::io::Result<Bytes>>) -> Completion {
        let interval = self.producer.config().interval();

        loop {
            let permit = tokio::select! {
                biased;
                _ = self.destroyed.cancelled() => break,
                permit = sink.reserve() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            tokio::select! {
                biased;
                _ = self.destroyed.cancelled() => break,
                _ = sink.closed() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            let Some(chunk) = self.producer.emit() else {
                break;
            };
            permit.send(Ok(chunk));

            if let Some(completion) = self.producer.completion() {
                return completion;
            }
        }

        self.producer.cancel();
        self.producer.cleaned_up().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    async fn drain(mut rx: mpsc::Receiver<std::io::Result<Bytes>>) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = rx.recv().await {
            out.extend_from_slice(&chunk.expect("chunk"));
        }
        out
    }

    #[tokio::test]
    async fn pipes_until_bound() {
        let readable = Readable::new(ProducerConfig {
            interval_ms: 1,
            bound: 5,
        });
        let (tx, rx) = mpsc::channel(1);

        let (completion, body) = tokio::join!(readable.pipe(tx), drain(rx));

        assert_eq!(completion, Completion::Exhausted);
        assert_eq!(body, b"01234");
        assert_eq!(readable.producer().value(), 5);
    }

    #[tokio::test]
    async fn closed_sink_cancels() {
        let readable = Readable::new(ProducerConfig {
            interval_ms: 5,
            bound: 25,
        });
        let (tx, mut rx) = mpsc::channel(1);

        let consumer = async move {
            let first = rx.recv().await;
            assert!(first.is_some());
            drop(rx);
        };
        let (completion, ()) = tokio::join!(readable.pipe(tx), consumer);

        assert_eq!(completion, Completion::Cancelled);
        let value = readable.producer().value();
        assert!((1..=2).contains(&value), "value = {value}");
    }

    #[tokio::test]
    async fn destroy_stops_a_waiting_producer() {
        let readable = Readable::new(ProducerConfig {
            interval_ms: 10_000,
            bound: 25,
        });
        let (tx, _rx) = mpsc::channel(1);

        let destroy = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            readable.destroy();
        };
        let (completion, ()) = tokio::join!(readable.pipe(tx), destroy);

        assert_eq!(completion, Completion::Cancelled);
        assert_eq!(readable.producer().value(), 0);
    }
}
