//! Redis wire protocol (RESP) encoding and decoding.
//!
//! The request side is a flat frame of bulk strings; the reply side is the
//! recursive RESP grammar. Both directions are binary-transparent and use
//! CRLF line endings throughout.

pub mod reply;
pub mod request;

pub use reply::{Reply, ReplyParser};
