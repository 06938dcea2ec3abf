//! Tokio-based asynchronous client.

mod client;
mod conn;
mod monitor;
mod pipeline;
mod pool;
mod sharded;
mod stream;
mod subscriber;
mod transaction;

#[cfg(test)]
pub(crate) mod mock;

pub use client::Client;
pub use monitor::Monitor;
pub use pipeline::Pipeline;
pub use pool::Pool;
pub use sharded::ShardedClient;
pub use subscriber::{PushMessage, Subscriber};
pub use transaction::Transaction;

use crate::error::Result;
use crate::opts::Opts;

/// Connect to a single endpoint.
///
/// Honors `opts.lazy`: a lazy handler is returned before its pool is
/// connected and readiness is observable via [`Client::wait_connected`].
pub async fn connect(opts: Opts) -> Result<Client> {
    Client::open(opts).await
}
