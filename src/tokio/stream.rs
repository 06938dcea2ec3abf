//! Socket halves for the reader task and the shared write path.
//!
//! The test variants record every `write_all` call and replay scripted
//! server bytes, standing in for a live server in the unit tests.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{tcp, unix};

#[cfg(test)]
use std::sync::{Arc, Mutex};
#[cfg(test)]
use tokio::sync::mpsc;

pub(crate) enum ReadStream {
    Tcp(tcp::OwnedReadHalf),
    Unix(unix::OwnedReadHalf),
    #[cfg(test)]
    Mock {
        rx: mpsc::UnboundedReceiver<Vec<u8>>,
        pending: Vec<u8>,
    },
}

impl ReadStream {
    pub async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Tcp(r) => r.read(buf).await,
            Self::Unix(r) => r.read(buf).await,
            #[cfg(test)]
            Self::Mock { rx, pending } => {
                if pending.is_empty() {
                    match rx.recv().await {
                        Some(data) => *pending = data,
                        None => return Ok(0),
                    }
                }
                let n = pending.len().min(buf.len());
                buf[..n].copy_from_slice(&pending[..n]);
                pending.drain(..n);
                Ok(n)
            }
        }
    }
}

pub(crate) enum WriteStream {
    Tcp(tcp::OwnedWriteHalf),
    Unix(unix::OwnedWriteHalf),
    /// Records one entry per `write_all` call.
    #[cfg(test)]
    Mock(Arc<Mutex<Vec<Vec<u8>>>>),
}

impl WriteStream {
    pub async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            Self::Tcp(w) => w.write_all(buf).await,
            Self::Unix(w) => w.write_all(buf).await,
            #[cfg(test)]
            Self::Mock(writes) => {
                if let Ok(mut writes) = writes.lock() {
                    writes.push(buf.to_vec());
                }
                Ok(())
            }
        }
    }

    pub async fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Tcp(w) => w.flush().await,
            Self::Unix(w) => w.flush().await,
            #[cfg(test)]
            Self::Mock(_) => Ok(()),
        }
    }
}
