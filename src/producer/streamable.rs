use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::{Stream, StreamExt, stream};

use super::{ByteStream, Producer, ProducerConfig};

/// Pull-driven producer: a chunk is only made when the stream is polled.
///
/// Dropping the stream before the bound is reached cancels the producer.
pub struct Streamable {
    producer: Producer,
    stream: ByteStream,
}

struct PullState {
    producer: Producer,
}

impl Drop for PullState {
    fn drop(&mut self) {
        self.producer.cancel();
    }
}

impl Streamable {
    pub fn new(config: ProducerConfig) -> Self {
        let producer = Producer::new(config);
        let state = PullState {
            producer: producer.clone(),
        };

        let stream: ByteStream = stream::unfold(state, |state| async move {
            if state.producer.is_stopped() {
                return None;
            }
            tokio::time::sleep(state.producer.config().interval()).await;
            let chunk = state.producer.emit()?;
            Some((Ok(chunk), state))
        })
        .boxed();

        Self { producer, stream }
    }

    pub fn producer(&self) -> &Producer {
        &self.producer
    }
}

impl Stream for Streamable {
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().stream.poll_next_unpin(cx)
    }
}
