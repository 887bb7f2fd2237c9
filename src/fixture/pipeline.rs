use axum::body::Body;
use bytes::Bytes;
use futures_util::{Stream, StreamExt, stream};
use tokio::sync::mpsc;

use crate::producer::Readable;

type Chunk = std::io::Result<Bytes>;

/// Largest number of chunks buffered between a node-runtime producer and the
/// socket.
pub const MAX_BODY_CAPACITY: usize = 1024;

fn channel_body(capacity: usize) -> (mpsc::Sender<Chunk>, Body) {
    let (tx, rx) = mpsc::channel::<Chunk>(capacity.clamp(1, MAX_BODY_CAPACITY));
    let body = stream::unfold(rx, |mut rx| async move {
        let chunk = rx.recv().await?;
        Some((chunk, rx))
    });
    (tx, Body::from_stream(body))
}

/// Runs `readable` on its own task, writing into the returned body.
///
/// When the server drops the body the channel closes, which is what the
/// readable observes as its destination going away.
pub(crate) fn pipeline(readable: Readable, capacity: usize) -> Body {
    let (tx, body) = channel_body(capacity);
    tokio::spawn(async move {
        let completion = readable.pipe(tx).await;
        tracing::debug!(
            ?completion,
            value = readable.producer().value(),
            "pipeline finished"
        );
    });
    body
}

/// Pumps a pull stream into the returned body from a separate task.
///
/// The source is dropped as soon as the body goes away, even if it is in the
/// middle of producing a chunk.
pub(crate) fn pump<S>(source: S, capacity: usize) -> Body
where
    S: Stream<Item = Chunk> + Send + Unpin + 'static,
{
    let (tx, body) = channel_body(capacity);
    tokio::spawn(async move {
        let mut source = source;
        loop {
            let Ok(permit) = tx.reserve().await else {
                break;
            };
            tokio::select! {
                biased;
                _ = tx.closed() => break,
                item = source.next() => match item {
                    Some(chunk) => permit.send(chunk),
                    None => break,
                },
            }
        }
        drop(source);
        tracing::debug!("pump finished");
    });
    body
}
