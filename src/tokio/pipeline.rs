//! Buffered pipelining on a pinned connection.
//!
//! Commands buffer their frames and reply slots; [`Pipeline::execute_pipeline`]
//! flushes the whole batch in a single socket write, awaits the replies in
//! order (first error fails the batch), and releases the connection.

use tokio::sync::oneshot;

use crate::command::Command;
use crate::commands::{Commands, PostProc};
use crate::error::{Error, Result};
use crate::value::Value;

use super::pool::PooledConn;

/// A pinned pipeline session.
pub struct Pipeline {
    guard: PooledConn,
    frames: Vec<u8>,
    pending: Vec<(oneshot::Receiver<Result<Value>>, Option<PostProc>)>,
    executed: bool,
}

impl core::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pipeline").finish_non_exhaustive()
    }
}

impl Pipeline {
    pub(crate) fn new(guard: PooledConn) -> Self {
        Self {
            guard,
            frames: Vec::new(),
            pending: Vec::new(),
            executed: false,
        }
    }

    /// Number of buffered, unflushed commands.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Flush every buffered frame in one socket write and collect the
    /// replies in command order. The first failed reply fails the whole
    /// batch; the connection is released in every case.
    pub async fn execute_pipeline(mut self) -> Result<Vec<Value>> {
        self.executed = true;
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }

        let frames = std::mem::take(&mut self.frames);
        if let Err(e) = self.guard.write_frame(&frames).await {
            self.guard.close();
            return Err(e);
        }

        let mut values = Vec::with_capacity(self.pending.len());
        let mut first_error: Option<Error> = None;
        for (rx, post) in std::mem::take(&mut self.pending) {
            match rx.await {
                Ok(Ok(value)) => values.push(match &post {
                    Some(f) => f(value),
                    None => value,
                }),
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(_) => {
                    if first_error.is_none() {
                        first_error = Some(Error::connection_lost());
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(values),
        }
    }
}

impl Commands for Pipeline {
    type Output = ();

    /// Buffer the frame and its reply slot; nothing reaches the socket
    /// until [`Pipeline::execute_pipeline`].
    async fn dispatch(&mut self, cmd: Command, post: Option<PostProc>) -> Result<()> {
        if self.executed {
            return Err(Error::InvalidUsage("pipeline already executed".into()));
        }
        let mut buf = self.guard.checkout_frame();
        self.guard.encode(&cmd, buf.buf_mut())?;
        let rx = self.guard.push_pending()?;
        self.frames.extend_from_slice(buf.bytes());
        self.pending.push((rx, post));
        Ok(())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if !self.executed && !self.pending.is_empty() {
            // reply slots are queued but their frames were never written;
            // the connection cannot be reused with a misaligned queue
            self.guard.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opts::Charset;
    use crate::tokio::conn::{Conn, ConnMode};
    use pretty_assertions::assert_eq;

    fn pinned() -> (Pipeline, crate::tokio::mock::MockServer) {
        let (conn, server) = Conn::mock(ConnMode::Request, Charset::Utf8);
        (Pipeline::new(PooledConn::detached(conn)), server)
    }

    #[tokio::test]
    async fn all_frames_share_one_socket_write() {
        let (mut pipeline, server) = pinned();

        pipeline.set("k1", "foo").await.unwrap();
        pipeline.set("k1", "bar").await.unwrap();
        pipeline.set("k2", "zip").await.unwrap();
        assert_eq!(pipeline.buffered(), 3);

        // nothing on the wire until the flush
        assert!(server.writes().is_empty());

        server.reply(b"+OK\r\n+OK\r\n+OK\r\n");
        let values = pipeline.execute_pipeline().await.unwrap();
        assert_eq!(values.len(), 3);
        assert!(values.iter().all(Value::is_ok));

        let writes = server.writes();
        assert_eq!(writes.len(), 1, "expected a single write for the batch");
        let sets = writes[0]
            .windows(3)
            .filter(|window| *window == b"SET".as_slice())
            .count();
        assert_eq!(sets, 3);
    }

    #[tokio::test]
    async fn values_come_back_in_command_order() {
        let (mut pipeline, server) = pinned();
        pipeline.get("a").await.unwrap();
        pipeline.get("b").await.unwrap();

        server.reply(b"$1\r\n1\r\n$1\r\n2\r\n");
        let values = pipeline.execute_pipeline().await.unwrap();
        assert_eq!(values, vec![Value::Int(1), Value::Int(2)]);
    }

    #[tokio::test]
    async fn first_error_fails_the_batch() {
        let (mut pipeline, server) = pinned();
        pipeline.get("a").await.unwrap();
        pipeline.incr("a").await.unwrap();
        pipeline.get("b").await.unwrap();

        server.reply(b"$1\r\nx\r\n-ERR not an integer\r\n$1\r\ny\r\n");
        let err = pipeline.execute_pipeline().await.unwrap_err();
        assert!(matches!(err, Error::Response { .. }));
    }

    #[tokio::test]
    async fn empty_pipeline_flushes_to_nothing() {
        let (pipeline, server) = pinned();
        let values = pipeline.execute_pipeline().await.unwrap();
        assert!(values.is_empty());
        assert!(server.writes().is_empty());
    }

    #[tokio::test]
    async fn dropping_an_unflushed_pipeline_kills_the_connection() {
        let (conn, _server) = Conn::mock(ConnMode::Request, Charset::Utf8);
        {
            let mut pipeline = Pipeline::new(PooledConn::detached(std::sync::Arc::clone(&conn)));
            pipeline.set("k", "v").await.unwrap();
        }
        assert!(!conn.is_connected());
    }
}
