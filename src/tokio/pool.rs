//! Reconnecting connection pool.
//!
//! The pool spawns one supervisor task per slot. A supervisor connects,
//! registers the connection (free channel + bookkeeping), waits for it to
//! die, and reconnects with exponential backoff while the reconnect flag is
//! set. Readiness resolves when the pool first fills to its nominal size.

use std::ops::Deref;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, watch};

use crate::error::{Error, Result};
use crate::opts::Opts;

use super::conn::{Conn, ConnMode};

const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(10);

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
enum Readiness {
    Pending,
    Ready,
    Failed(String),
}

pub(crate) struct PoolShared {
    opts: Opts,
    mode: ConnMode,
    free_tx: mpsc::UnboundedSender<Arc<Conn>>,
    free_rx: Mutex<mpsc::UnboundedReceiver<Arc<Conn>>>,
    conns: StdMutex<Vec<Arc<Conn>>>,
    size_tx: watch::Sender<usize>,
    ready_tx: watch::Sender<Readiness>,
    shutdown_tx: watch::Sender<bool>,
    reconnect: AtomicBool,
}

impl PoolShared {
    /// Add a fresh connection to the pool and free channel. Refused (and
    /// the connection closed) when shutdown has begun; the check shares
    /// the registry lock with `disconnect` so no connection slips past the
    /// drain.
    fn register(&self, conn: Arc<Conn>) -> bool {
        let size = {
            let mut conns = lock(&self.conns);
            if *self.shutdown_tx.borrow() {
                conn.close();
                return false;
            }
            conns.push(Arc::clone(&conn));
            conns.len()
        };
        let _ = self.size_tx.send(size);
        let _ = self.free_tx.send(conn);
        if size >= self.opts.poolsize {
            self.ready_tx.send_if_modified(|state| {
                if matches!(state, Readiness::Pending) {
                    *state = Readiness::Ready;
                    true
                } else {
                    false
                }
            });
        }
        true
    }

    fn unregister(&self, conn: &Arc<Conn>) {
        let size = {
            let mut conns = lock(&self.conns);
            conns.retain(|c| !Arc::ptr_eq(c, conn));
            conns.len()
        };
        let _ = self.size_tx.send(size);
    }

    fn fail_ready(&self, message: String) {
        self.ready_tx.send_if_modified(|state| {
            if matches!(state, Readiness::Pending) {
                *state = Readiness::Failed(message);
                true
            } else {
                false
            }
        });
    }

    fn is_shut_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    fn should_reconnect(&self) -> bool {
        self.reconnect.load(Ordering::Acquire)
    }

    /// Return a connection to the free channel (sole entry point back).
    /// A connection still pinned to a transaction never re-enters.
    pub(crate) fn release(&self, conn: Arc<Conn>) {
        if conn.is_connected() && !conn.in_transaction() && !self.is_shut_down() {
            let _ = self.free_tx.send(conn);
        }
    }
}

/// A pool of connections to one endpoint.
#[derive(Clone)]
pub struct Pool {
    shared: Arc<PoolShared>,
}

impl Pool {
    /// Create the pool and spawn its supervisors. Must be called within a
    /// tokio runtime.
    pub(crate) fn new(opts: Opts, mode: ConnMode) -> Self {
        let (free_tx, free_rx) = mpsc::unbounded_channel();
        let (size_tx, _) = watch::channel(0);
        let (ready_tx, _) = watch::channel(Readiness::Pending);
        let (shutdown_tx, _) = watch::channel(false);
        let reconnect = AtomicBool::new(opts.reconnect);

        let shared = Arc::new(PoolShared {
            opts,
            mode,
            free_tx,
            free_rx: Mutex::new(free_rx),
            conns: StdMutex::new(Vec::new()),
            size_tx,
            ready_tx,
            shutdown_tx,
            reconnect,
        });

        for slot in 0..shared.opts.poolsize.max(1) {
            tokio::spawn(supervise(Arc::clone(&shared), slot));
        }

        Self { shared }
    }

    pub fn endpoint(&self) -> String {
        self.shared.opts.endpoint()
    }

    /// Number of live connections.
    pub fn size(&self) -> usize {
        *self.shared.size_tx.borrow()
    }

    /// Resolves when the pool first fills to its nominal size, or fails if
    /// the handshake was rejected by the server.
    pub async fn wait_ready(&self) -> Result<()> {
        let mut rx = self.shared.ready_tx.subscribe();
        loop {
            let state = rx.borrow_and_update().clone();
            match state {
                Readiness::Ready => return Ok(()),
                Readiness::Failed(message) => return Err(Error::Connection(message)),
                Readiness::Pending => {}
            }
            if rx.changed().await.is_err() {
                return Err(Error::not_connected());
            }
        }
    }

    /// Get a healthy connection from the free channel.
    ///
    /// Dead connections found at the head are silently dropped. With
    /// `put_back` the connection is re-enqueued immediately, for callers
    /// that may share it. In non-lazy mode an empty pool fails fast.
    pub(crate) async fn get(&self, put_back: bool) -> Result<PooledConn> {
        let shared = &self.shared;
        if shared.is_shut_down() {
            return Err(Error::Connection("Connection pool is shut down".into()));
        }
        if self.size() == 0 && !shared.opts.lazy {
            return Err(Error::not_connected());
        }

        let mut rx = shared.free_rx.lock().await;
        let mut shutdown = shared.shutdown_tx.subscribe();
        loop {
            if *shutdown.borrow_and_update() {
                return Err(Error::Connection("Connection pool is shut down".into()));
            }
            tokio::select! {
                conn = rx.recv() => {
                    let Some(conn) = conn else {
                        return Err(Error::Connection("Connection pool is shut down".into()));
                    };
                    if !conn.is_connected() {
                        tracing::debug!(endpoint = %conn.endpoint(), "discarding dead connection");
                        continue;
                    }
                    if put_back {
                        let _ = shared.free_tx.send(Arc::clone(&conn));
                    }
                    return Ok(PooledConn {
                        conn,
                        shared: Some(Arc::clone(shared)),
                        put_back,
                    });
                }
                _ = shutdown.changed() => {}
            }
        }
    }

    /// Stop reconnecting, close every connection, and resolve when the
    /// pool is empty.
    pub async fn disconnect(&self) -> Result<()> {
        self.shared.reconnect.store(false, Ordering::Release);
        let conns: Vec<_> = {
            let conns = lock(&self.shared.conns);
            let _ = self.shared.shutdown_tx.send(true);
            conns.clone()
        };
        for conn in conns {
            conn.close();
        }
        self.wait_for_empty_pool().await;
        Ok(())
    }

    /// Resolves when the pool size reaches zero. Cancellable by dropping
    /// the future.
    pub async fn wait_for_empty_pool(&self) {
        let mut rx = self.shared.size_tx.subscribe();
        loop {
            if *rx.borrow_and_update() == 0 {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

async fn supervise(shared: Arc<PoolShared>, slot: usize) {
    let mut delay = INITIAL_RECONNECT_DELAY;
    loop {
        if shared.is_shut_down() {
            return;
        }
        match Conn::connect(&shared.opts, shared.mode.clone()).await {
            Ok(conn) => {
                delay = INITIAL_RECONNECT_DELAY;
                if !shared.register(Arc::clone(&conn)) {
                    conn.wait_closed().await;
                    return;
                }
                conn.wait_closed().await;
                shared.unregister(&conn);
                tracing::info!(endpoint = %shared.opts.endpoint(), slot, "connection closed");
            }
            Err(e) => {
                tracing::warn!(
                    endpoint = %shared.opts.endpoint(),
                    slot,
                    error = %e,
                    "connection attempt failed"
                );
                let rejected = matches!(e, Error::Response { .. });
                if rejected || !shared.should_reconnect() {
                    shared.fail_ready(format!(
                        "could not connect to {}: {}",
                        shared.opts.endpoint(),
                        e
                    ));
                }
                if rejected {
                    // the server refused AUTH/SELECT; retrying cannot help
                    return;
                }
            }
        }
        if !shared.should_reconnect() {
            return;
        }
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(MAX_RECONNECT_DELAY);
    }
}

/// A connection leased from the pool; returns itself to the free channel
/// on drop unless it was already re-enqueued or has died.
pub(crate) struct PooledConn {
    conn: Arc<Conn>,
    shared: Option<Arc<PoolShared>>,
    put_back: bool,
}

impl PooledConn {
    /// A guard around a bare connection, for sessions without a pool.
    #[cfg(test)]
    pub(crate) fn detached(conn: Arc<Conn>) -> Self {
        Self {
            conn,
            shared: None,
            put_back: false,
        }
    }
}

impl Deref for PooledConn {
    type Target = Conn;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl Drop for PooledConn {
    fn drop(&mut self) {
        if self.put_back {
            return;
        }
        if let Some(shared) = &self.shared {
            shared.release(Arc::clone(&self.conn));
        }
    }
}
