//! Scripted transport for unit tests.
//!
//! The mock replaces a live server: tests push raw reply bytes and inspect
//! the exact `write_all` calls the client issued, so write batching and
//! frame contents are observable.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use super::stream::{ReadStream, WriteStream};

pub(crate) struct MockServer {
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    reply_tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

impl MockServer {
    pub fn new() -> (Self, ReadStream, WriteStream) {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let server = Self {
            writes: Arc::clone(&writes),
            reply_tx: Some(reply_tx),
        };
        let read = ReadStream::Mock {
            rx: reply_rx,
            pending: Vec::new(),
        };
        let write = WriteStream::Mock(writes);
        (server, read, write)
    }

    /// Script raw server bytes for the client to read.
    pub fn reply(&self, bytes: &[u8]) {
        if let Some(tx) = &self.reply_tx {
            let _ = tx.send(bytes.to_vec());
        }
    }

    /// Close the server side of the connection (the reader sees EOF).
    pub fn hang_up(&mut self) {
        self.reply_tx = None;
    }

    /// One entry per `write_all` call made by the client.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    /// All written bytes, concatenated.
    pub fn written(&self) -> Vec<u8> {
        self.writes().concat()
    }
}
