//! Pub/sub handler.
//!
//! A subscriber runs on its own single-connection pool. Push replies are
//! routed by shape: `message`/`pmessage` arrays feed the message stream,
//! subscribe/unsubscribe acknowledgements complete the pending method
//! call, and errors fail the next waiting promise.

use tokio::sync::mpsc;

use crate::command::{Command, IntoArg};
use crate::error::Result;
use crate::opts::Opts;
use crate::value::Value;

use super::conn::ConnMode;
use super::pool::Pool;

/// A message delivered to a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    /// The matching pattern for `pmessage` deliveries.
    pub pattern: Option<String>,
    pub channel: String,
    pub payload: Value,
}

/// Handler for subscription push streams.
pub struct Subscriber {
    pool: Pool,
    messages: mpsc::UnboundedReceiver<PushMessage>,
}

impl Subscriber {
    /// Connect a dedicated subscription connection.
    pub async fn open(mut opts: Opts) -> Result<Self> {
        opts.poolsize = 1;
        let lazy = opts.lazy;
        let (tx, rx) = mpsc::unbounded_channel();
        let pool = Pool::new(opts, ConnMode::Subscriber(tx));
        if !lazy {
            pool.wait_ready().await?;
        }
        Ok(Self { pool, messages: rx })
    }

    pub async fn wait_connected(&self) -> Result<()> {
        self.pool.wait_ready().await
    }

    async fn request(&self, cmd: Command) -> Result<Value> {
        // put_back: the connection keeps serving the push stream
        let guard = self.pool.get(true).await?;
        guard.raw_command(cmd).await
    }

    /// SUBSCRIBE; resolves with the `[kind, channel, count]`
    /// acknowledgement.
    pub async fn subscribe(
        &self,
        channels: impl IntoIterator<Item = impl IntoArg>,
    ) -> Result<Value> {
        self.request(Command::new("SUBSCRIBE").args(channels)).await
    }

    pub async fn unsubscribe(
        &self,
        channels: impl IntoIterator<Item = impl IntoArg>,
    ) -> Result<Value> {
        self.request(Command::new("UNSUBSCRIBE").args(channels)).await
    }

    pub async fn psubscribe(
        &self,
        patterns: impl IntoIterator<Item = impl IntoArg>,
    ) -> Result<Value> {
        self.request(Command::new("PSUBSCRIBE").args(patterns)).await
    }

    pub async fn punsubscribe(
        &self,
        patterns: impl IntoIterator<Item = impl IntoArg>,
    ) -> Result<Value> {
        self.request(Command::new("PUNSUBSCRIBE").args(patterns)).await
    }

    /// Next pushed message; `None` once the connection is gone and the
    /// stream is drained.
    pub async fn next_message(&mut self) -> Option<PushMessage> {
        self.messages.recv().await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.pool.disconnect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opts::Charset;
    use crate::tokio::conn::Conn;
    use pretty_assertions::assert_eq;

    fn subscriber_conn() -> (
        std::sync::Arc<Conn>,
        crate::tokio::mock::MockServer,
        mpsc::UnboundedReceiver<PushMessage>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (conn, server) = Conn::mock(ConnMode::Subscriber(tx), Charset::Utf8);
        (conn, server, rx)
    }

    #[tokio::test]
    async fn subscribe_ack_resolves_the_call() {
        let (conn, server, _rx) = subscriber_conn();
        server.reply(b"*3\r\n$9\r\nsubscribe\r\n$4\r\nnews\r\n:1\r\n");
        let ack = conn
            .raw_command(Command::new("SUBSCRIBE").arg("news"))
            .await
            .unwrap();
        assert_eq!(
            ack,
            Value::Array(vec![
                Value::String("subscribe".into()),
                Value::String("news".into()),
                Value::Int(1),
            ])
        );
    }

    #[tokio::test]
    async fn messages_reach_the_stream() {
        let (conn, server, mut rx) = subscriber_conn();
        server.reply(b"*3\r\n$7\r\nmessage\r\n$4\r\nnews\r\n$5\r\nhello\r\n");
        let message = rx.recv().await.unwrap();
        assert_eq!(
            message,
            PushMessage {
                pattern: None,
                channel: "news".into(),
                payload: Value::String("hello".into()),
            }
        );
        drop(conn);
    }

    #[tokio::test]
    async fn pmessages_carry_their_pattern() {
        let (conn, server, mut rx) = subscriber_conn();
        server.reply(
            b"*4\r\n$8\r\npmessage\r\n$6\r\nnews.*\r\n$9\r\nnews.tech\r\n$4\r\nitem\r\n",
        );
        let message = rx.recv().await.unwrap();
        assert_eq!(message.pattern.as_deref(), Some("news.*"));
        assert_eq!(message.channel, "news.tech");
        assert_eq!(message.payload, Value::String("item".into()));
        drop(conn);
    }

    #[tokio::test]
    async fn errors_fail_the_next_waiting_promise() {
        let (conn, server, _rx) = subscriber_conn();
        server.reply(b"-ERR unknown command\r\n");
        let err = conn
            .raw_command(Command::new("SUBSCRIBE").arg("news"))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::Error::Response { .. }));
    }
}
