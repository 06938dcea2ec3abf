//! Asynchronous Redis connection.
//!
//! A connection is a socket plus a reader task. The reader owns the read
//! half and all parse state; it completes pending reply slots in FIFO
//! order. Senders share the write half behind an async mutex that is held
//! across "enqueue slot, then write frame", which is what preserves the
//! send-order/completion-order invariant.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError};

use tokio::net::{TcpStream, UnixStream};
use tokio::sync::{Mutex, mpsc, oneshot, watch};

use crate::command::Command;
use crate::commands::PostProc;
use crate::error::{Error, Result};
use crate::frame_pool::{Frame, FramePool};
use crate::opts::{Charset, Opts};
use crate::protocol::{Reply, ReplyParser};
use crate::value::{Value, coerce};

use super::stream::{ReadStream, WriteStream};
use super::subscriber::PushMessage;

type ReplySlot = oneshot::Sender<Result<Value>>;

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How the reader routes replies.
#[derive(Clone)]
pub(crate) enum ConnMode {
    /// Request/response: every reply completes the head-of-queue slot.
    Request,
    /// Pub/sub: push replies go to the message stream, acknowledgements
    /// complete slots.
    Subscriber(mpsc::UnboundedSender<PushMessage>),
    /// Monitor: replies go to the event stream; slots are only completed
    /// while one is waiting (the handshake).
    Monitor(mpsc::UnboundedSender<Value>),
}

/// Transaction-mode bookkeeping, shared between the send path and the
/// reader.
#[derive(Default)]
struct TxState {
    /// Pinned to a caller (WATCH or MULTI seen).
    in_transaction: bool,
    /// MULTI sent and not yet resolved by EXEC/DISCARD.
    multi_open: bool,
    /// Commands acknowledged with QUEUED since MULTI.
    queued: usize,
    /// EXEC sent; the next non-QUEUED reply is the transaction outcome.
    exec_pending: bool,
    /// Post-processing callbacks, positionally aligned with the commands
    /// queued since MULTI.
    post_procs: Vec<Option<PostProc>>,
}

/// One connection to the server.
pub(crate) struct Conn {
    endpoint: String,
    charset: Charset,
    mode: ConnMode,
    writer: Mutex<WriteStream>,
    frames: Arc<FramePool>,
    pending_tx: mpsc::UnboundedSender<ReplySlot>,
    tx_state: StdMutex<TxState>,
    script_hashes: StdMutex<HashSet<String>>,
    connected: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    closed_tx: watch::Sender<bool>,
}

impl Conn {
    /// Connect a socket, start the reader, and run the handshake
    /// (AUTH, then SELECT, as configured).
    pub(crate) async fn connect(opts: &Opts, mode: ConnMode) -> Result<Arc<Self>> {
        match opts.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, Self::connect_inner(opts, mode))
                .await
                .map_err(|_| {
                    Error::Connection(format!("connect to {} timed out", opts.endpoint()))
                })?,
            None => Self::connect_inner(opts, mode).await,
        }
    }

    async fn connect_inner(opts: &Opts, mode: ConnMode) -> Result<Arc<Self>> {
        let (read, write) = if let Some(path) = &opts.socket {
            let stream = UnixStream::connect(path).await?;
            let (r, w) = stream.into_split();
            (ReadStream::Unix(r), WriteStream::Unix(w))
        } else {
            let addr = format!("{}:{}", opts.host, opts.port);
            let tcp = TcpStream::connect(&addr).await?;
            tcp.set_nodelay(true)?;
            let (r, w) = tcp.into_split();
            (ReadStream::Tcp(r), WriteStream::Tcp(w))
        };

        let conn = Self::start(opts.endpoint(), opts.charset, mode, read, write);
        if let Err(e) = conn.handshake(opts).await {
            conn.close();
            return Err(e);
        }
        Ok(conn)
    }

    /// Build the connection object and spawn its reader task.
    fn start(
        endpoint: String,
        charset: Charset,
        mode: ConnMode,
        read: ReadStream,
        write: WriteStream,
    ) -> Arc<Self> {
        let (pending_tx, pending_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (closed_tx, _) = watch::channel(false);

        let conn = Arc::new(Self {
            endpoint,
            charset,
            mode,
            writer: Mutex::new(write),
            frames: FramePool::new(),
            pending_tx,
            tx_state: StdMutex::new(TxState::default()),
            script_hashes: StdMutex::new(HashSet::new()),
            connected: AtomicBool::new(true),
            shutdown_tx,
            closed_tx,
        });

        tokio::spawn(reader_task(Arc::clone(&conn), read, pending_rx, shutdown_rx));
        conn
    }

    async fn handshake(&self, opts: &Opts) -> Result<()> {
        if let Some(password) = &opts.password {
            let reply = self
                .raw_command(Command::new("AUTH").arg(password.as_str()))
                .await?;
            if !reply.is_ok() {
                return Err(Error::Connection(format!("could not auth: {:?}", reply)));
            }
        }
        if let Some(dbid) = opts.dbid {
            let reply = self.raw_command(Command::new("SELECT").arg(dbid)).await?;
            if !reply.is_ok() {
                return Err(Error::Connection(format!(
                    "could not select dbid={}: {:?}",
                    dbid, reply
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Request teardown: stops the reader, which rejects all outstanding
    /// slots and marks the connection closed.
    pub(crate) fn close(&self) {
        self.connected.store(false, Ordering::Release);
        let _ = self.shutdown_tx.send(true);
    }

    /// Resolves once the reader task has exited.
    pub(crate) async fn wait_closed(&self) {
        let mut rx = self.closed_tx.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    // === Send path ===

    pub(crate) fn encode(&self, cmd: &Command, out: &mut Vec<u8>) -> Result<()> {
        cmd.encode(self.charset, out)
    }

    pub(crate) fn checkout_frame(&self) -> Frame {
        self.frames.checkout()
    }

    /// Enqueue a reply slot without writing anything (pipeline buffering).
    pub(crate) fn push_pending(&self) -> Result<oneshot::Receiver<Result<Value>>> {
        if !self.is_connected() {
            return Err(Error::not_connected());
        }
        let (tx, rx) = oneshot::channel();
        self.pending_tx.send(tx).map_err(|_| Error::connection_lost())?;
        Ok(rx)
    }

    pub(crate) async fn write_frame(&self, frame: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.write_all(frame).await {
            self.close();
            return Err(e.into());
        }
        if let Err(e) = writer.flush().await {
            self.close();
            return Err(e.into());
        }
        Ok(())
    }

    /// Write one command and enqueue its reply slot.
    pub(crate) async fn send_command(
        &self,
        cmd: &Command,
    ) -> Result<oneshot::Receiver<Result<Value>>> {
        if !self.is_connected() {
            return Err(Error::not_connected());
        }
        let mut frame = self.frames.checkout();
        self.encode(cmd, frame.buf_mut())?;

        // slot enqueue and socket write stay adjacent under the writer lock
        let mut writer = self.writer.lock().await;
        let (tx, rx) = oneshot::channel();
        self.pending_tx.send(tx).map_err(|_| Error::connection_lost())?;
        if let Err(e) = writer.write_all(frame.bytes()).await {
            self.close();
            return Err(e.into());
        }
        if let Err(e) = writer.flush().await {
            self.close();
            return Err(e.into());
        }
        Ok(rx)
    }

    /// Execute one command and await its reply.
    pub(crate) async fn raw_command(&self, cmd: Command) -> Result<Value> {
        let rx = self.send_command(&cmd).await?;
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::connection_lost()),
        }
    }

    /// Write a command without enqueueing a reply slot (MONITOR).
    pub(crate) async fn execute_push(&self, cmd: Command) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::not_connected());
        }
        let mut frame = self.frames.checkout();
        self.encode(&cmd, frame.buf_mut())?;
        self.write_frame(frame.bytes()).await
    }

    /// Send a command inside an open MULTI. The server acknowledges with
    /// QUEUED, which completes nothing; the value surfaces from EXEC.
    pub(crate) async fn queue_transaction_command(
        &self,
        cmd: Command,
        post: Option<PostProc>,
    ) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::not_connected());
        }
        let mut frame = self.frames.checkout();
        self.encode(&cmd, frame.buf_mut())?;
        {
            let mut tx = lock(&self.tx_state);
            if !tx.multi_open {
                return Err(Error::InvalidUsage("Not in transaction".into()));
            }
            tx.post_procs.push(post);
        }
        self.write_frame(frame.bytes()).await
    }

    // === Transaction state ===

    pub(crate) fn begin_transaction(&self) {
        lock(&self.tx_state).in_transaction = true;
    }

    pub(crate) fn mark_multi_open(&self) {
        lock(&self.tx_state).multi_open = true;
    }

    pub(crate) fn mark_exec_pending(&self) {
        lock(&self.tx_state).exec_pending = true;
    }

    pub(crate) fn clear_transaction(&self) {
        *lock(&self.tx_state) = TxState::default();
    }

    pub(crate) fn in_transaction(&self) -> bool {
        lock(&self.tx_state).in_transaction
    }

    pub(crate) fn multi_open(&self) -> bool {
        lock(&self.tx_state).multi_open
    }

    #[cfg(test)]
    pub(crate) fn queued_count(&self) -> usize {
        lock(&self.tx_state).queued
    }

    // === Script digest cache ===

    pub(crate) fn knows_script(&self, digest: &str) -> bool {
        lock(&self.script_hashes).contains(digest)
    }

    pub(crate) fn remember_script(&self, digest: &str) {
        lock(&self.script_hashes).insert(digest.to_string());
    }

    pub(crate) fn forget_script(&self, digest: &str) {
        lock(&self.script_hashes).remove(digest);
    }

    pub(crate) fn clear_scripts(&self) {
        lock(&self.script_hashes).clear();
    }
}

#[cfg(test)]
impl Conn {
    pub(crate) fn mock(mode: ConnMode, charset: Charset) -> (Arc<Self>, super::mock::MockServer) {
        let (server, read, write) = super::mock::MockServer::new();
        let conn = Self::start("mock:0".into(), charset, mode, read, write);
        (conn, server)
    }
}

// === Receive path ===

async fn reader_task(
    conn: Arc<Conn>,
    mut read: ReadStream,
    mut pending_rx: mpsc::UnboundedReceiver<ReplySlot>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let result = read_loop(&conn, &mut read, &mut pending_rx, &mut shutdown_rx).await;
    if let Err(e) = &result {
        tracing::debug!(endpoint = %conn.endpoint, error = %e, "connection lost");
    }

    conn.connected.store(false, Ordering::Release);
    conn.clear_scripts();
    conn.clear_transaction();

    // reject everything still waiting for a reply
    pending_rx.close();
    while let Ok(slot) = pending_rx.try_recv() {
        let _ = slot.send(Err(Error::connection_lost()));
    }

    let _ = conn.closed_tx.send(true);
}

async fn read_loop(
    conn: &Arc<Conn>,
    read: &mut ReadStream,
    pending_rx: &mut mpsc::UnboundedReceiver<ReplySlot>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Result<()> {
    let mut parser = ReplyParser::new();
    let mut backlog: VecDeque<Result<Value>> = VecDeque::new();
    let mut chunk = vec![0u8; 16 * 1024];

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    return Ok(());
                }
            }
            // a reply arrived before its slot was enqueued; hand it over now
            slot = pending_rx.recv(), if !backlog.is_empty() => {
                match slot {
                    Some(slot) => {
                        if let Some(result) = backlog.pop_front() {
                            let _ = slot.send(result);
                        }
                    }
                    None => return Ok(()),
                }
            }
            n = read.read(&mut chunk) => {
                let n = n?;
                if n == 0 {
                    return Err(Error::Connection("connection closed by server".into()));
                }
                parser.feed(&chunk[..n]);
                loop {
                    match parser.next() {
                        Ok(Some(reply)) => dispatch_reply(conn, reply, pending_rx, &mut backlog),
                        Ok(None) => break,
                        Err(e) => {
                            // protocol violation: fail the next waiting
                            // promise and drop the connection
                            let message = e.to_string();
                            complete(Err(e), pending_rx, &mut backlog);
                            return Err(Error::InvalidData(message));
                        }
                    }
                }
            }
        }
    }
}

enum TxAction {
    None,
    Swallowed,
    Exec(Vec<Option<PostProc>>),
}

fn dispatch_reply(
    conn: &Arc<Conn>,
    reply: Reply,
    pending_rx: &mut mpsc::UnboundedReceiver<ReplySlot>,
    backlog: &mut VecDeque<Result<Value>>,
) {
    let action = {
        let mut tx = lock(&conn.tx_state);
        if tx.multi_open && reply.is_status("QUEUED") {
            tx.queued += 1;
            TxAction::Swallowed
        } else if tx.exec_pending {
            let procs = std::mem::take(&mut tx.post_procs);
            *tx = TxState::default();
            TxAction::Exec(procs)
        } else {
            TxAction::None
        }
    };

    match action {
        TxAction::Swallowed => return,
        TxAction::Exec(procs) => {
            let outcome = exec_outcome(reply, procs, conn.charset);
            complete(outcome, pending_rx, backlog);
            return;
        }
        TxAction::None => {}
    }

    match &conn.mode {
        ConnMode::Request => {
            complete(reply_to_result(reply, conn.charset), pending_rx, backlog);
        }
        ConnMode::Subscriber(stream) => {
            dispatch_push(reply, conn.charset, stream, pending_rx, backlog);
        }
        ConnMode::Monitor(stream) => {
            let result = reply_to_result(reply, conn.charset);
            match pending_rx.try_recv() {
                Ok(slot) => {
                    let _ = slot.send(result);
                }
                Err(_) => {
                    let event = match result {
                        Ok(value) => value,
                        Err(Error::Response { kind, message }) => Value::Error { kind, message },
                        Err(e) => Value::Error {
                            kind: "ERR".into(),
                            message: e.to_string(),
                        },
                    };
                    let _ = stream.send(event);
                }
            }
        }
    }
}

/// Route a reply on a subscriber connection: `message`/`pmessage` pushes go
/// to the message stream, everything else (subscribe acknowledgements,
/// errors) completes the next waiting promise.
fn dispatch_push(
    reply: Reply,
    charset: Charset,
    stream: &mpsc::UnboundedSender<PushMessage>,
    pending_rx: &mut mpsc::UnboundedReceiver<ReplySlot>,
    backlog: &mut VecDeque<Result<Value>>,
) {
    match reply_to_result(reply, charset) {
        Ok(Value::Array(mut items)) => {
            let n = items.len();
            let kind_at = |items: &[Value], at: usize| {
                items.get(at).and_then(Value::as_text).map(str::to_string)
            };
            if n >= 3 && kind_at(&items, n - 3).as_deref() == Some("message") {
                let payload = items.pop().unwrap_or(Value::Nil);
                let channel = value_to_string(items.pop().unwrap_or(Value::Nil));
                let _ = stream.send(PushMessage {
                    pattern: None,
                    channel,
                    payload,
                });
            } else if n > 3 && kind_at(&items, n - 4).as_deref() == Some("pmessage") {
                let payload = items.pop().unwrap_or(Value::Nil);
                let channel = value_to_string(items.pop().unwrap_or(Value::Nil));
                let pattern = value_to_string(items.pop().unwrap_or(Value::Nil));
                let _ = stream.send(PushMessage {
                    pattern: Some(pattern),
                    channel,
                    payload,
                });
            } else {
                // subscribe/unsubscribe acknowledgement: keep the last
                // three elements for the waiting caller
                let tail = if n > 3 { items.split_off(n - 3) } else { items };
                complete(Ok(Value::Array(tail)), pending_rx, backlog);
            }
        }
        other => complete(other, pending_rx, backlog),
    }
}

fn value_to_string(value: Value) -> String {
    match value {
        Value::Status(s) | Value::String(s) => s,
        Value::Int(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bytes(b) => String::from_utf8_lossy(&b).into_owned(),
        other => format!("{:?}", other),
    }
}

/// Funnel results through the backlog so FIFO order holds even when a
/// reply arrives before its slot is enqueued.
fn complete(
    result: Result<Value>,
    pending_rx: &mut mpsc::UnboundedReceiver<ReplySlot>,
    backlog: &mut VecDeque<Result<Value>>,
) {
    backlog.push_back(result);
    while !backlog.is_empty() {
        match pending_rx.try_recv() {
            Ok(slot) => {
                if let Some(front) = backlog.pop_front() {
                    let _ = slot.send(front);
                }
            }
            Err(_) => break,
        }
    }
}

fn reply_to_result(reply: Reply, charset: Charset) -> Result<Value> {
    match reply {
        Reply::Error { kind, message } => Err(Error::Response { kind, message }),
        other => Ok(coerce(other, charset)),
    }
}

/// Resolve the EXEC outcome: nil means the watched keys changed; an array
/// gets the positional post-procs applied element-wise.
fn exec_outcome(reply: Reply, procs: Vec<Option<PostProc>>, charset: Charset) -> Result<Value> {
    match reply {
        Reply::Array(None) => Err(Error::Watch("Transaction failed".into())),
        Reply::Array(Some(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                let value = coerce(item, charset);
                out.push(match procs.get(i) {
                    Some(Some(f)) => f(value),
                    _ => value,
                });
            }
            Ok(Value::Array(out))
        }
        Reply::Error { kind, message } => Err(Error::Response { kind, message }),
        other => Ok(coerce(other, charset)),
    }
}
