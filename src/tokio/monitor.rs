//! MONITOR handler.
//!
//! Holds a dedicated connection on which every server reply is pushed to
//! the event stream; request promises are not completed. Mind the server-
//! side cost of MONITOR.

use tokio::sync::mpsc;

use crate::command::Command;
use crate::error::Result;
use crate::opts::Opts;
use crate::value::Value;

use super::conn::ConnMode;
use super::pool::Pool;

/// Handler for the MONITOR stream.
pub struct Monitor {
    pool: Pool,
    events: mpsc::UnboundedReceiver<Value>,
}

impl Monitor {
    pub async fn open(mut opts: Opts) -> Result<Self> {
        opts.poolsize = 1;
        let lazy = opts.lazy;
        let (tx, rx) = mpsc::unbounded_channel();
        let pool = Pool::new(opts, ConnMode::Monitor(tx));
        if !lazy {
            pool.wait_ready().await?;
        }
        Ok(Self { pool, events: rx })
    }

    /// Send MONITOR. The acknowledgement and every traced command arrive
    /// on the event stream.
    pub async fn start(&self) -> Result<()> {
        let guard = self.pool.get(true).await?;
        guard.execute_push(Command::new("MONITOR")).await
    }

    /// Next monitored event; `None` once the connection is gone and the
    /// stream is drained.
    pub async fn next_event(&mut self) -> Option<Value> {
        self.events.recv().await
    }

    pub async fn stop(&self) -> Result<()> {
        self.pool.disconnect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opts::Charset;
    use crate::tokio::conn::Conn;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn every_reply_reaches_the_stream() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (conn, server) = Conn::mock(ConnMode::Monitor(tx), Charset::Utf8);

        conn.execute_push(Command::new("MONITOR")).await.unwrap();
        server.reply(b"+OK\r\n");
        server.reply(b"+1700000000.000000 [0 127.0.0.1:50] \"GET\" \"k\"\r\n");

        assert_eq!(rx.recv().await.unwrap(), Value::Status("OK".into()));
        let traced = rx.recv().await.unwrap();
        assert!(matches!(traced, Value::Status(_)));
        drop(conn);
    }

    #[tokio::test]
    async fn handshake_promises_still_resolve() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (conn, server) = Conn::mock(ConnMode::Monitor(tx), Charset::Utf8);

        // AUTH during the handshake has a waiting slot and must resolve
        let pending = conn
            .send_command(&Command::new("AUTH").arg("secret"))
            .await
            .unwrap();
        server.reply(b"+OK\r\n");
        let value = pending.await.unwrap().unwrap();
        assert!(value.is_ok());
    }
}
