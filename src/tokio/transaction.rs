//! MULTI/EXEC/WATCH transactions on a pinned connection.
//!
//! A [`Transaction`] exclusively owns its connection until it is committed,
//! discarded, or unwatched. Commands issued between MULTI and EXEC are
//! queued server-side; their values surface as the ordered array returned
//! by [`Transaction::commit`].

use crate::command::{Arg, Command, IntoArg};
use crate::commands::{Commands, PostProc};
use crate::error::{Error, Result};
use crate::value::Value;

use super::conn::Conn;
use super::pool::PooledConn;

/// A pinned transaction session.
pub struct Transaction {
    guard: PooledConn,
    finished: bool,
}

async fn command_ok(conn: &Conn, cmd: Command) -> Result<()> {
    let reply = conn.raw_command(cmd).await?;
    if reply.is_ok() {
        Ok(())
    } else {
        Err(Error::InvalidData(format!("unexpected reply: {:?}", reply)))
    }
}

impl Transaction {
    /// Pin `guard` and open the session: optional WATCH, optional MULTI.
    pub(crate) async fn begin(
        guard: PooledConn,
        watch_keys: Option<Vec<Arg>>,
        multi: bool,
    ) -> Result<Self> {
        guard.begin_transaction();
        let mut tx = Self {
            guard,
            finished: false,
        };
        if let Some(keys) = watch_keys {
            if keys.is_empty() {
                tx.abort();
                return Err(Error::InvalidUsage("no keys to watch".into()));
            }
            if let Err(e) = command_ok(&tx.guard, Command::new("WATCH").args(keys)).await {
                tx.abort();
                return Err(e);
            }
        }
        if multi {
            if let Err(e) = command_ok(&tx.guard, Command::new("MULTI")).await {
                tx.abort();
                return Err(e);
            }
            tx.guard.mark_multi_open();
        }
        Ok(tx)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.finished {
            return Err(Error::InvalidUsage("transaction already completed".into()));
        }
        if !self.guard.is_connected() {
            return Err(Error::not_connected());
        }
        Ok(())
    }

    /// Session over, connection healthy: it goes back to the pool when the
    /// handle drops.
    fn finish(&mut self) {
        self.finished = true;
        self.guard.clear_transaction();
    }

    /// Session over, connection state unknown: drop the socket and let the
    /// factory replace it.
    fn abort(&mut self) {
        self.finished = true;
        self.guard.close();
    }

    /// Watch more keys. Only valid before MULTI.
    pub async fn watch(
        &mut self,
        keys: impl IntoIterator<Item = impl IntoArg>,
    ) -> Result<()> {
        self.ensure_open()?;
        if self.guard.multi_open() {
            return Err(Error::InvalidUsage("WATCH is not allowed inside MULTI".into()));
        }
        command_ok(&self.guard, Command::new("WATCH").args(keys)).await
    }

    /// Open the MULTI block on a session started with `watch`.
    pub async fn multi(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.guard.multi_open() {
            return Err(Error::InvalidUsage("MULTI is already open".into()));
        }
        command_ok(&self.guard, Command::new("MULTI")).await?;
        self.guard.mark_multi_open();
        Ok(())
    }

    /// Run a command on the pinned connection before MULTI is opened
    /// (e.g. reads between WATCH and MULTI) and return its value.
    pub async fn command(&mut self, cmd: Command) -> Result<Value> {
        self.ensure_open()?;
        if self.guard.multi_open() {
            return Err(Error::InvalidUsage(
                "commands inside MULTI are queued; their values surface from commit".into(),
            ));
        }
        self.guard.raw_command(cmd).await
    }

    /// EXEC: resolve every queued command in order.
    ///
    /// A nil reply means a watched key changed; the commit fails with
    /// [`Error::Watch`] and the connection returns to the pool.
    pub async fn commit(mut self) -> Result<Vec<Value>> {
        self.ensure_open()?;
        if !self.guard.multi_open() {
            return Err(Error::InvalidUsage("not in transaction".into()));
        }
        self.guard.mark_exec_pending();
        match self.guard.raw_command(Command::new("EXEC")).await {
            Ok(Value::Array(values)) => {
                self.finish();
                Ok(values)
            }
            Ok(other) => {
                self.abort();
                Err(Error::InvalidData(format!(
                    "unexpected EXEC reply: {:?}",
                    other
                )))
            }
            Err(e) => {
                if matches!(e, Error::Watch(_)) {
                    self.finish();
                } else {
                    self.abort();
                }
                Err(e)
            }
        }
    }

    /// DISCARD: drop every queued command and end the session.
    pub async fn discard(mut self) -> Result<()> {
        self.ensure_open()?;
        if !self.guard.multi_open() {
            return Err(Error::InvalidUsage("not in transaction".into()));
        }
        // state is cleared before the reply comes back, like the queued
        // counter reset on the wire side
        self.guard.clear_transaction();
        match command_ok(&self.guard, Command::new("DISCARD")).await {
            Ok(()) => {
                self.finished = true;
                Ok(())
            }
            Err(e) => {
                self.abort();
                Err(e)
            }
        }
    }

    /// UNWATCH. Outside MULTI this ends the session; inside MULTI the
    /// command is queued like any other and the session continues.
    pub async fn unwatch(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.guard.multi_open() {
            self.guard
                .queue_transaction_command(Command::new("UNWATCH"), None)
                .await
        } else {
            match command_ok(&self.guard, Command::new("UNWATCH")).await {
                Ok(()) => {
                    self.finish();
                    Ok(())
                }
                Err(e) => {
                    self.abort();
                    Err(e)
                }
            }
        }
    }
}

impl Commands for Transaction {
    type Output = ();

    /// Inside MULTI: queue the command (the QUEUED ack completes nothing,
    /// post-procs are stored positionally). Before MULTI: run it
    /// immediately on the pinned connection, discarding the value.
    async fn dispatch(&mut self, cmd: Command, post: Option<PostProc>) -> Result<()> {
        self.ensure_open()?;
        if self.guard.multi_open() {
            self.guard.queue_transaction_command(cmd, post).await
        } else {
            let value = self.guard.raw_command(cmd).await?;
            if let Some(f) = post {
                let _ = f(value);
            }
            Ok(())
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.finished {
            // the server side is still in WATCH/MULTI state; the socket
            // cannot be reused safely
            self.guard.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opts::Charset;
    use crate::tokio::conn::ConnMode;
    use crate::value::Value;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn pinned() -> (Transaction, crate::tokio::mock::MockServer) {
        let (conn, server) = Conn::mock(ConnMode::Request, Charset::Utf8);
        let guard = PooledConn::detached(conn);
        (
            Transaction {
                guard,
                finished: false,
            },
            server,
        )
    }

    #[tokio::test]
    async fn commit_preserves_order_and_applies_post_procs() {
        let (mut tx, server) = pinned();

        server.reply(b"+OK\r\n");
        tx.multi().await.unwrap();

        tx.hmset("h1", [("foo", "bar"), ("something", "else")])
            .await
            .unwrap();
        tx.hgetall("h1").await.unwrap();
        tx.hmset("h2", [("a", "b")]).await.unwrap();
        tx.hgetall("h2").await.unwrap();
        server.reply(b"+QUEUED\r\n+QUEUED\r\n+QUEUED\r\n+QUEUED\r\n");

        // script the EXEC outcome only after commit has sent EXEC
        let commit = tokio::spawn(async move { tx.commit().await });
        tokio::task::yield_now().await;
        server.reply(
            b"*4\r\n\
              +OK\r\n\
              *4\r\n$3\r\nfoo\r\n$3\r\nbar\r\n$9\r\nsomething\r\n$4\r\nelse\r\n\
              +OK\r\n\
              *2\r\n$1\r\na\r\n$1\r\nb\r\n",
        );
        let values = commit.await.unwrap().unwrap();

        assert_eq!(values.len(), 4);
        assert!(values[0].is_ok());
        let mut expected1 = HashMap::new();
        expected1.insert("foo".to_string(), Value::String("bar".into()));
        expected1.insert("something".to_string(), Value::String("else".into()));
        assert_eq!(values[1], Value::Map(expected1));
        assert!(values[2].is_ok());
        let mut expected2 = HashMap::new();
        expected2.insert("a".to_string(), Value::String("b".into()));
        assert_eq!(values[3], Value::Map(expected2));
    }

    #[tokio::test]
    async fn watch_conflict_surfaces_watch_error() {
        let (mut tx, server) = pinned();

        server.reply(b"+OK\r\n"); // WATCH
        tx.watch(["k"]).await.unwrap();
        server.reply(b"+OK\r\n"); // MULTI
        tx.multi().await.unwrap();

        tx.set("k", "x").await.unwrap();
        server.reply(b"+QUEUED\r\n");

        let commit = tokio::spawn(async move { tx.commit().await });
        tokio::task::yield_now().await;
        server.reply(b"*-1\r\n"); // a watched key changed
        let err = commit.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Watch(_)));
    }

    #[tokio::test]
    async fn commit_requires_multi() {
        let (tx, _server) = pinned();
        let err = tx.commit().await.unwrap_err();
        assert!(matches!(err, Error::InvalidUsage(_)));
    }

    #[tokio::test]
    async fn discard_ends_the_session() {
        let (mut tx, server) = pinned();
        server.reply(b"+OK\r\n");
        tx.multi().await.unwrap();
        tx.set("k", "v").await.unwrap();
        server.reply(b"+QUEUED\r\n");

        server.reply(b"+OK\r\n");
        tx.discard().await.unwrap();
    }

    #[tokio::test]
    async fn unwatch_outside_multi_clears_the_session() {
        let (mut tx, server) = pinned();
        server.reply(b"+OK\r\n"); // WATCH
        tx.watch(["a", "b"]).await.unwrap();

        server.reply(b"+OK\r\n"); // UNWATCH
        tx.unwatch().await.unwrap();

        // the session is over
        let err = tx.multi().await.unwrap_err();
        assert!(matches!(err, Error::InvalidUsage(_)));
    }

    #[tokio::test]
    async fn watch_phase_commands_run_immediately() {
        let (mut tx, server) = pinned();
        server.reply(b"+OK\r\n"); // WATCH
        tx.watch(["k"]).await.unwrap();

        server.reply(b"$1\r\nv\r\n");
        let value = tx
            .command(Command::new("GET").arg("k"))
            .await
            .unwrap();
        assert_eq!(value, Value::String("v".into()));
    }
}
