//! A high-performance Redis client library.
//!
//! # Features
//!
//! - **Incremental RESP codec**: streaming reply parsing, binary-safe bulks
//! - **Connection pooling**: a free-connection channel with reconnecting
//!   supervisors and exponential backoff
//! - **Transactions and pipelining**: MULTI/EXEC/WATCH on a pinned
//!   connection, pipelines flushed as a single socket write
//! - **Pub/sub and monitor**: push-reply streams on dedicated connections
//! - **Client-side sharding**: consistent-hash key routing with hash-tag
//!   override
//!
//! # Example
//!
//! ```no_run
//! use zero_redis::tokio::Client;
//! use zero_redis::{Commands, Opts};
//!
//! #[tokio::main]
//! async fn main() -> zero_redis::Result<()> {
//!     let mut db = Client::open(Opts::default()).await?;
//!
//!     db.set("greeting", "hello").await?;
//!     let value = db.get("greeting").await?;
//!     println!("greeting = {:?}", value);
//!
//!     db.disconnect().await?;
//!     Ok(())
//! }
//! ```

// private
mod command;
mod commands;
mod error;
mod frame_pool;
mod opts;

// pub
pub mod protocol;
pub mod ring;
pub mod value;

#[cfg(feature = "tokio")]
pub mod tokio;

pub use command::{Arg, Command, IntoArg};
pub use commands::{BitOp, Commands, PostProc, SetOptions, SortSpec};
pub use error::{Error, Result};
pub use opts::{Charset, DEFAULT_UNIX_SOCKET, Opts};
pub use value::{FromValue, Value};
