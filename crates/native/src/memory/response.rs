use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tracing::{debug, trace};

use crate::{AbortHandler, DataHandler, NativeResponse};

/// Connection state shared by a [`MemoryResponse`] and its [`PayloadWriter`].
#[derive(Default)]
struct Connection {
    data_handler: Option<DataHandler>,
    abort_handler: Option<AbortHandler>,
    pending: VecDeque<(Bytes, bool)>,
    finished: bool,
    aborted: bool,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("has_data_handler", &self.data_handler.is_some())
            .field("has_abort_handler", &self.abort_handler.is_some())
            .field("pending", &self.pending.len())
            .field("finished", &self.finished)
            .field("aborted", &self.aborted)
            .finish()
    }
}

fn lock(connection: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    connection.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The server side of an in-memory connection.
#[derive(Debug)]
pub struct MemoryResponse {
    remote_address: Bytes,
    connection: Arc<Mutex<Connection>>,
}

impl MemoryResponse {
    /// Creates a response handle and the writer that feeds its request body.
    pub fn new(remote_address: impl Into<Bytes>) -> (MemoryResponse, PayloadWriter) {
        let connection = Arc::new(Mutex::new(Connection::default()));
        let writer = PayloadWriter { connection: Arc::clone(&connection) };
        (MemoryResponse { remote_address: remote_address.into(), connection }, writer)
    }

    pub fn is_aborted(&self) -> bool {
        lock(&self.connection).aborted
    }
}

impl NativeResponse for MemoryResponse {
    fn remote_address_as_text(&self) -> Bytes {
        self.remote_address.clone()
    }

    fn on_data(&mut self, mut handler: DataHandler) {
        let mut connection = lock(&self.connection);
        if connection.aborted {
            debug!("data handler registered on an aborted connection");
            return;
        }

        if !connection.pending.is_empty() {
            trace!(chunks = connection.pending.len(), "flush queued body chunks");
        }
        while let Some((chunk, is_last)) = connection.pending.pop_front() {
            handler(chunk, is_last);
        }
        connection.data_handler = Some(handler);
    }

    fn on_aborted(&mut self, handler: AbortHandler) {
        let mut connection = lock(&self.connection);
        if connection.aborted {
            drop(connection);
            handler();
            return;
        }
        connection.abort_handler = Some(handler);
    }
}

/// The client side of an in-memory connection.
///
/// Chunks are pushed as they are written, without backpressure. Writes after
/// the last chunk or after an abort are dropped and reported as `false`.
#[derive(Debug, Clone)]
pub struct PayloadWriter {
    connection: Arc<Mutex<Connection>>,
}

impl PayloadWriter {
    /// Pushes a body chunk that is not the last one.
    pub fn write(&self, chunk: impl Into<Bytes>) -> bool {
        self.push(chunk.into(), false)
    }

    /// Pushes the last body chunk, which may be empty.
    pub fn finish(&self, chunk: impl Into<Bytes>) -> bool {
        self.push(chunk.into(), true)
    }

    /// Closes the connection before the body is complete.
    pub fn abort(&self) -> bool {
        let mut connection = lock(&self.connection);
        if connection.finished || connection.aborted {
            return false;
        }

        connection.aborted = true;
        connection.pending.clear();
        connection.data_handler = None;
        let handler = connection.abort_handler.take();
        drop(connection);

        debug!("connection aborted by peer");
        if let Some(handler) = handler {
            handler();
        }
        true
    }

    fn push(&self, chunk: Bytes, is_last: bool) -> bool {
        let mut guard = lock(&self.connection);
        let connection = &mut *guard;
        if connection.finished || connection.aborted {
            trace!(size = chunk.len(), "drop body chunk written after close");
            return false;
        }

        connection.finished = is_last;
        match connection.data_handler.as_mut() {
            Some(handler) => handler(chunk, is_last),
            None => connection.pending.push_back((chunk, is_last)),
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    type Received = Arc<Mutex<Vec<(Bytes, bool)>>>;

    fn collect(response: &mut MemoryResponse) -> Received {
        let received: Received = Arc::default();
        let sink = Arc::clone(&received);
        response.on_data(Box::new(move |chunk, is_last| sink.lock().unwrap().push((chunk, is_last))));
        received
    }

    #[test]
    fn delivers_chunks_in_order() {
        let (mut response, writer) = MemoryResponse::new("10.0.0.1");
        let received = collect(&mut response);

        assert!(writer.write("a"));
        assert!(writer.write("b"));
        assert!(writer.finish("c"));

        assert_eq!(
            *received.lock().unwrap(),
            vec![(Bytes::from("a"), false), (Bytes::from("b"), false), (Bytes::from("c"), true)]
        );
        assert_eq!(response.remote_address_as_text(), Bytes::from("10.0.0.1"));
    }

    #[test]
    fn queues_chunks_until_handler_registered() {
        let (mut response, writer) = MemoryResponse::new("10.0.0.1");
        writer.write("hello ");
        writer.finish("world");

        let received = collect(&mut response);

        assert_eq!(*received.lock().unwrap(), vec![(Bytes::from("hello "), false), (Bytes::from("world"), true)]);
    }

    #[test]
    fn drops_writes_after_finish() {
        let (mut response, writer) = MemoryResponse::new("10.0.0.1");
        let received = collect(&mut response);

        assert!(writer.finish(""));
        assert!(!writer.write("late"));
        assert!(!writer.abort());

        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[test]
    fn abort_fires_handler() {
        let (mut response, writer) = MemoryResponse::new("10.0.0.1");
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        response.on_aborted(Box::new(move || flag.store(true, Ordering::SeqCst)));

        writer.write("partial");
        assert!(writer.abort());

        assert!(fired.load(Ordering::SeqCst));
        assert!(response.is_aborted());
        assert!(!writer.write("late"));
    }

    #[test]
    fn abort_before_registration_fires_on_register() {
        let (mut response, writer) = MemoryResponse::new("10.0.0.1");
        writer.abort();

        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        response.on_aborted(Box::new(move || flag.store(true, Ordering::SeqCst)));

        assert!(fired.load(Ordering::SeqCst));
    }
}
