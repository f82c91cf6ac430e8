//! Request body ingestion and the views built on the buffered body.
//!
//! The native server pushes body chunks through a callback, with no deadline
//! and no backpressure. [`ingest`] drains that callback into one buffer and
//! races it against a deadline and the connection's abort signal; exactly one
//! of them settles the read:
//!
//! ```text
//! Idle -> Reading -> Complete   last chunk arrived
//!                 -> TimedOut   deadline elapsed first, partial body kept
//!                 -> Aborted    connection closed first
//! ```
//!
//! The deadline timer lives inside [`ingest`] and is dropped on every exit.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use futures::channel::mpsc;
use http_body::{Body as HttpBody, Frame, SizeHint};
use micro_native::NativeResponse;
use tokio::sync::Notify;
use tracing::{info, trace};

use crate::event::{Event, EventEmitter};

/// Where a request stands in body ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyState {
    Idle,
    Reading,
    Complete,
    TimedOut,
    Aborted,
}

impl BodyState {
    /// Whether ingestion has reached a terminal state.
    pub fn is_settled(self) -> bool {
        matches!(self, BodyState::Complete | BodyState::TimedOut | BodyState::Aborted)
    }
}

/// The current body of a request: a value assigned by a body parser takes
/// precedence over the raw ingested text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BodyRef<'a> {
    Parsed(&'a serde_json::Value),
    Raw(&'a str),
}

impl<'a> BodyRef<'a> {
    /// The raw text, unless a parsed value took its place.
    pub fn as_raw(self) -> Option<&'a str> {
        match self {
            BodyRef::Raw(raw) => Some(raw),
            BodyRef::Parsed(_) => None,
        }
    }

    /// The assigned value, if any.
    pub fn as_parsed(self) -> Option<&'a serde_json::Value> {
        match self {
            BodyRef::Parsed(value) => Some(value),
            BodyRef::Raw(_) => None,
        }
    }
}

/// An [`http_body::Body`] over an already buffered body.
///
/// It yields the whole body as one data frame and ends; it does not stream.
#[derive(Debug, Clone)]
pub struct ReplayBody {
    data: Option<Bytes>,
}

impl ReplayBody {
    pub(crate) fn new(data: Bytes) -> Self {
        Self { data: (!data.is_empty()).then_some(data) }
    }
}

impl HttpBody for ReplayBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Poll::Ready(self.get_mut().data.take().map(|bytes| Ok(Frame::data(bytes))))
    }

    fn is_end_stream(&self) -> bool {
        self.data.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        match &self.data {
            Some(bytes) => SizeHint::with_exact(bytes.len() as u64),
            None => SizeHint::with_exact(0),
        }
    }
}

/// Connection-closed flag shared with the native abort callback.
#[derive(Debug, Default)]
pub(crate) struct AbortSignal {
    aborted: AtomicBool,
    notify: Notify,
}

impl AbortSignal {
    pub(crate) fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Marks the connection closed. Only the first call notifies and emits.
    pub(crate) fn trigger(&self, events: &EventEmitter) {
        if self.aborted.swap(true, Ordering::AcqRel) {
            return;
        }

        info!("connection aborted before the response was sent");
        self.notify.notify_one();
        events.emit(&Event::Aborted);
        events.emit(&Event::Close);
    }

    pub(crate) fn handler(self: &Arc<Self>, events: &EventEmitter) -> micro_native::AbortHandler {
        let signal = Arc::clone(self);
        let events = events.clone();
        Box::new(move || signal.trigger(&events))
    }
}

#[derive(Debug)]
pub(crate) enum Outcome {
    Complete(Bytes),
    TimedOut(Bytes),
    Aborted,
}

/// Drains the native chunk callback of `response` into a single buffer.
pub(crate) async fn ingest<S: NativeResponse>(response: &mut S, abort: &AbortSignal, timeout: Duration) -> Outcome {
    if abort.is_aborted() {
        return Outcome::Aborted;
    }

    let (chunk_sender, mut chunk_receiver) = mpsc::unbounded::<(Bytes, bool)>();
    response.on_data(Box::new(move |chunk, is_last| {
        // the receiver is gone once the read has settled, late chunks are dropped
        let _ = chunk_sender.unbounded_send((chunk, is_last));
    }));

    let mut buffer = BytesMut::new();
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            biased;
            chunk = chunk_receiver.next() => match chunk {
                Some((chunk, is_last)) => {
                    trace!(size = chunk.len(), is_last, "receive body chunk");
                    buffer.extend_from_slice(&chunk);
                    if is_last {
                        return Outcome::Complete(buffer.freeze());
                    }
                }
                // the native side dropped the callback without a last chunk
                None => return Outcome::Aborted,
            },
            () = abort.notify.notified() => return Outcome::Aborted,
            () = &mut deadline => return Outcome::TimedOut(buffer.freeze()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use micro_native::memory::MemoryResponse;

    #[tokio::test]
    async fn ingest_concatenates_chunks() {
        let (mut response, writer) = MemoryResponse::new("127.0.0.1");
        writer.write("hello");
        writer.write(", ");
        writer.finish("world");

        let outcome = ingest(&mut response, &AbortSignal::default(), Duration::from_millis(500)).await;

        assert!(matches!(outcome, Outcome::Complete(bytes) if bytes == "hello, world"));
    }

    #[tokio::test(start_paused = true)]
    async fn ingest_times_out_with_partial() {
        let (mut response, writer) = MemoryResponse::new("127.0.0.1");
        writer.write("part");

        let outcome = ingest(&mut response, &AbortSignal::default(), Duration::from_millis(500)).await;

        assert!(matches!(outcome, Outcome::TimedOut(bytes) if bytes == "part"));
        // a chunk arriving after the deadline lands in a closed channel
        assert!(writer.finish("late"));
    }

    #[tokio::test(start_paused = true)]
    async fn ingest_stops_on_abort() {
        let (mut response, writer) = MemoryResponse::new("127.0.0.1");
        let signal = Arc::new(AbortSignal::default());
        let events = EventEmitter::new();
        response.on_aborted(signal.handler(&events));

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            writer.write("part");
            writer.abort();
        });

        let outcome = ingest(&mut response, &signal, Duration::from_millis(500)).await;

        assert!(matches!(outcome, Outcome::Aborted));
        assert!(signal.is_aborted());
    }

    #[test]
    fn abort_signal_emits_once() {
        let signal = AbortSignal::default();
        let events = EventEmitter::new();
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        events.on(crate::EventKind::Aborted, Arc::new(move |_: &Event| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        signal.trigger(&events);
        signal.trigger(&events);

        assert!(signal.is_aborted());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn replay_body_yields_once() {
        let mut body = ReplayBody::new(Bytes::from("payload"));
        assert_eq!(body.size_hint().exact(), Some(7));
        assert!(!body.is_end_stream());

        let collected = body.frame().await.unwrap().unwrap().into_data().unwrap();
        assert_eq!(collected, Bytes::from("payload"));
        assert!(body.is_end_stream());
        assert!(body.frame().await.is_none());

        let empty = ReplayBody::new(Bytes::new());
        assert!(empty.is_end_stream());
        assert!(empty.collect().await.unwrap().to_bytes().is_empty());
    }
}
