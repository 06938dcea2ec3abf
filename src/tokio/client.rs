//! The user-facing connection handler.
//!
//! A [`Client`] wraps a pool: every command leases a free connection,
//! forwards the frame, and returns the connection on completion.
//! Transactions and pipelines pin their connection instead and return it
//! through their own completion paths.

use sha1::{Digest, Sha1};

use crate::command::{Arg, Command, IntoArg};
use crate::commands::{Commands, PostProc};
use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::value::{Value, ints_to_bools};

use super::conn::{Conn, ConnMode};
use super::pipeline::Pipeline;
use super::pool::Pool;
use super::transaction::Transaction;

/// Handler for a single endpoint.
#[derive(Clone)]
pub struct Client {
    pool: Pool,
}

impl core::fmt::Debug for Client {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

impl Client {
    /// Connect and, unless `opts.lazy` is set, wait for the pool to fill.
    pub async fn open(opts: Opts) -> Result<Self> {
        let lazy = opts.lazy;
        let client = Self::spawn_pool(opts);
        if !lazy {
            client.pool.wait_ready().await?;
        }
        Ok(client)
    }

    /// Return the handler before any socket is connected. Readiness is
    /// observable via [`Client::wait_connected`].
    pub fn open_lazy(mut opts: Opts) -> Self {
        opts.lazy = true;
        Self::spawn_pool(opts)
    }

    /// Start the pool without waiting (keeps the configured lazy flag).
    pub(crate) fn spawn_pool(opts: Opts) -> Self {
        Self {
            pool: Pool::new(opts, ConnMode::Request),
        }
    }

    /// Resolves when the pool first fills to its nominal size.
    pub async fn wait_connected(&self) -> Result<()> {
        self.pool.wait_ready().await
    }

    pub fn endpoint(&self) -> String {
        self.pool.endpoint()
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Stop reconnecting, close every connection, and wait for the pool to
    /// drain.
    pub async fn disconnect(&self) -> Result<()> {
        self.pool.disconnect().await
    }

    /// Execute an arbitrary command.
    pub async fn command(&self, cmd: Command) -> Result<Value> {
        let guard = self.pool.get(false).await?;
        guard.raw_command(cmd).await
    }

    /// Pin a connection and start buffering commands.
    pub async fn pipeline(&self) -> Result<Pipeline> {
        let guard = self.pool.get(false).await?;
        Ok(Pipeline::new(guard))
    }

    /// Pin a connection and WATCH the given keys.
    pub async fn watch(
        &self,
        keys: impl IntoIterator<Item = impl IntoArg>,
    ) -> Result<Transaction> {
        let keys: Vec<Arg> = keys.into_iter().map(IntoArg::into_arg).collect();
        let guard = self.pool.get(false).await?;
        Transaction::begin(guard, Some(keys), false).await
    }

    /// Pin a connection and open a MULTI block.
    pub async fn multi(&self) -> Result<Transaction> {
        let guard = self.pool.get(false).await?;
        Transaction::begin(guard, None, true).await
    }

    /// WATCH the given keys, then open a MULTI block, on one pinned
    /// connection.
    pub async fn multi_watch(
        &self,
        keys: impl IntoIterator<Item = impl IntoArg>,
    ) -> Result<Transaction> {
        let keys: Vec<Arg> = keys.into_iter().map(IntoArg::into_arg).collect();
        let guard = self.pool.get(false).await?;
        Transaction::begin(guard, Some(keys), true).await
    }

    // === Scripting ===

    /// EVAL with a transparent EVALSHA fast path: once a connection has
    /// seen a script, the digest is sent instead of the body, falling back
    /// to EVAL if the server has flushed its cache.
    pub async fn eval(
        &self,
        script: &str,
        keys: impl IntoIterator<Item = impl IntoArg>,
        args: impl IntoIterator<Item = impl IntoArg>,
    ) -> Result<Value> {
        let keys: Vec<Arg> = keys.into_iter().map(IntoArg::into_arg).collect();
        let args: Vec<Arg> = args.into_iter().map(IntoArg::into_arg).collect();
        let digest = sha1_hex(script.as_bytes());
        let guard = self.pool.get(false).await?;
        if guard.knows_script(&digest) {
            match evalsha_on(&guard, &digest, keys.clone(), args.clone()).await {
                Err(Error::ScriptDoesNotExist(_)) => {
                    eval_on(&guard, script, &digest, keys, args).await
                }
                other => other,
            }
        } else {
            eval_on(&guard, script, &digest, keys, args).await
        }
    }

    /// EVALSHA. A NOSCRIPT reply surfaces as
    /// [`Error::ScriptDoesNotExist`]; retry with [`Client::eval`] if the
    /// script body is known.
    pub async fn evalsha(
        &self,
        digest: &str,
        keys: impl IntoIterator<Item = impl IntoArg>,
        args: impl IntoIterator<Item = impl IntoArg>,
    ) -> Result<Value> {
        let keys: Vec<Arg> = keys.into_iter().map(IntoArg::into_arg).collect();
        let args: Vec<Arg> = args.into_iter().map(IntoArg::into_arg).collect();
        let guard = self.pool.get(false).await?;
        evalsha_on(&guard, digest, keys, args).await
    }

    pub async fn script_load(&self, script: &str) -> Result<Value> {
        self.command(Command::new("SCRIPT").arg("LOAD").arg(script)).await
    }

    /// SCRIPT EXISTS, with the integer flags converted to booleans.
    pub async fn script_exists(
        &self,
        digests: impl IntoIterator<Item = impl IntoArg>,
    ) -> Result<Value> {
        let value = self
            .command(Command::new("SCRIPT").arg("EXISTS").args(digests))
            .await?;
        Ok(ints_to_bools(value))
    }

    /// SCRIPT FLUSH; the executing connection forgets its cached digests.
    pub async fn script_flush(&self) -> Result<Value> {
        let guard = self.pool.get(false).await?;
        let value = guard.raw_command(Command::new("SCRIPT").arg("FLUSH")).await?;
        guard.clear_scripts();
        Ok(value)
    }

    /// SCRIPT KILL; a NOTBUSY reply surfaces as
    /// [`Error::NoScriptRunning`].
    pub async fn script_kill(&self) -> Result<Value> {
        match self.command(Command::new("SCRIPT").arg("KILL")).await {
            Err(e) if e.response_kind() == Some("NOTBUSY") => Err(Error::NoScriptRunning),
            other => other,
        }
    }
}

impl Commands for Client {
    type Output = Value;

    async fn dispatch(&mut self, cmd: Command, post: Option<PostProc>) -> Result<Value> {
        let guard = self.pool.get(false).await?;
        let result = guard.raw_command(cmd).await;
        drop(guard);
        match (result, post) {
            (Ok(value), Some(f)) => Ok(f(value)),
            (result, _) => result,
        }
    }
}

fn sha1_hex(data: &[u8]) -> String {
    use std::fmt::Write;

    let digest = Sha1::digest(data);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

async fn eval_on(
    conn: &Conn,
    script: &str,
    digest: &str,
    keys: Vec<Arg>,
    args: Vec<Arg>,
) -> Result<Value> {
    let cmd = Command::new("EVAL")
        .arg(script)
        .arg(keys.len())
        .args(keys)
        .args(args);
    let value = conn.raw_command(cmd).await?;
    conn.remember_script(digest);
    Ok(value)
}

async fn evalsha_on(conn: &Conn, digest: &str, keys: Vec<Arg>, args: Vec<Arg>) -> Result<Value> {
    let cmd = Command::new("EVALSHA")
        .arg(digest)
        .arg(keys.len())
        .args(keys)
        .args(args);
    match conn.raw_command(cmd).await {
        Ok(value) => {
            conn.remember_script(digest);
            Ok(value)
        }
        Err(e) if e.response_kind() == Some("NOSCRIPT") => {
            conn.forget_script(digest);
            Err(Error::ScriptDoesNotExist(digest.to_string()))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_opts() -> Opts {
        Opts {
            host: "127.0.0.1".into(),
            // reserved port, nothing listens here
            port: 1,
            reconnect: false,
            ..Opts::default()
        }
    }

    #[test]
    fn sha1_digest_rendering() {
        // sha1("") is well known
        assert_eq!(sha1_hex(b""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[tokio::test]
    async fn open_fails_fast_when_endpoint_is_down() {
        let err = Client::open(unreachable_opts()).await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }

    #[tokio::test]
    async fn empty_pool_refuses_commands_in_nonlazy_mode() {
        let mut client = Client::spawn_pool(unreachable_opts());
        let err = client.get("k").await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }
}
