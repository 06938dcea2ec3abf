//! Incremental RESP reply parser.
//!
//! The parser accumulates raw bytes with [`ReplyParser::feed`] and yields
//! fully assembled replies from [`ReplyParser::next`]. A reply that is not
//! yet complete consumes nothing; the attempt is repeated once more data
//! arrives. Bulk payloads are binary-safe and are not decoded here.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{Error, Result};

/// A single wire-level reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// `+<line>` status reply, e.g. `OK` or `QUEUED`.
    Status(String),
    /// `-<kind> <message>` error reply. `kind` is the first
    /// whitespace-delimited token of the line.
    Error { kind: String, message: String },
    /// `:<n>` integer reply.
    Integer(i64),
    /// `$<n>` bulk reply; `None` for the nil bulk (`$-1`).
    Bulk(Option<Bytes>),
    /// `*<n>` multi-bulk reply; `None` for the nil array (`*-1`).
    /// Elements may nest arbitrarily.
    Array(Option<Vec<Reply>>),
}

impl Reply {
    /// Returns true for a status reply equal to `expected`.
    pub fn is_status(&self, expected: &str) -> bool {
        matches!(self, Reply::Status(s) if s == expected)
    }
}

/// Streaming RESP parser.
#[derive(Debug, Default)]
pub struct ReplyParser {
    buf: BytesMut,
}

impl ReplyParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes from the socket.
    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Return the next fully assembled reply, or `None` if the buffered
    /// data does not yet contain one.
    ///
    /// Malformed framing is an [`Error::InvalidData`]; the caller is
    /// expected to close the connection.
    pub fn next(&mut self) -> Result<Option<Reply>> {
        match parse_reply(&self.buf)? {
            Some((reply, consumed)) => {
                self.buf.advance(consumed);
                Ok(Some(reply))
            }
            None => Ok(None),
        }
    }

    /// Number of buffered, not-yet-parsed bytes.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

/// Find the next CRLF; returns the line (without CRLF) and the number of
/// bytes consumed including the terminator.
fn take_line(buf: &[u8]) -> Option<(&[u8], usize)> {
    memchr::memmem::find(buf, b"\r\n").map(|pos| (&buf[..pos], pos + 2))
}

fn line_str(line: &[u8]) -> Result<&str> {
    simdutf8::basic::from_utf8(line)
        .map_err(|_| Error::InvalidData("non-UTF-8 reply line".into()))
}

fn parse_length(line: &[u8]) -> Result<i64> {
    line_str(line)?
        .parse::<i64>()
        .map_err(|_| Error::InvalidData(format!("bad length line: {:?}", String::from_utf8_lossy(line))))
}

fn parse_reply(buf: &[u8]) -> Result<Option<(Reply, usize)>> {
    let Some(&prefix) = buf.first() else {
        return Ok(None);
    };
    let body = &buf[1..];

    match prefix {
        b'+' => {
            let Some((line, used)) = take_line(body) else {
                return Ok(None);
            };
            let status = line_str(line)?.to_string();
            Ok(Some((Reply::Status(status), 1 + used)))
        }
        b'-' => {
            let Some((line, used)) = take_line(body) else {
                return Ok(None);
            };
            let text = line_str(line)?;
            let (kind, message) = match text.split_once(' ') {
                Some((kind, message)) => (kind.to_string(), message.to_string()),
                None => (text.to_string(), String::new()),
            };
            Ok(Some((Reply::Error { kind, message }, 1 + used)))
        }
        b':' => {
            let Some((line, used)) = take_line(body) else {
                return Ok(None);
            };
            let n = line_str(line)?
                .parse::<i64>()
                .map_err(|_| Error::InvalidData("bad integer reply".into()))?;
            Ok(Some((Reply::Integer(n), 1 + used)))
        }
        b'$' => {
            let Some((line, used)) = take_line(body) else {
                return Ok(None);
            };
            let len = parse_length(line)?;
            if len == -1 {
                return Ok(Some((Reply::Bulk(None), 1 + used)));
            }
            if len < 0 {
                return Err(Error::InvalidData(format!("negative bulk length: {}", len)));
            }
            let len = len as usize;
            let payload = &body[used..];
            if payload.len() < len + 2 {
                return Ok(None);
            }
            if &payload[len..len + 2] != b"\r\n" {
                return Err(Error::InvalidData("bulk payload not CRLF-terminated".into()));
            }
            let data = Bytes::copy_from_slice(&payload[..len]);
            Ok(Some((Reply::Bulk(Some(data)), 1 + used + len + 2)))
        }
        b'*' => {
            let Some((line, used)) = take_line(body) else {
                return Ok(None);
            };
            let len = parse_length(line)?;
            if len == -1 {
                return Ok(Some((Reply::Array(None), 1 + used)));
            }
            if len < 0 {
                return Err(Error::InvalidData(format!(
                    "negative multi-bulk length: {}",
                    len
                )));
            }
            let mut consumed = 1 + used;
            let mut items = Vec::with_capacity(len as usize);
            for _ in 0..len {
                match parse_reply(&buf[consumed..])? {
                    Some((item, n)) => {
                        items.push(item);
                        consumed += n;
                    }
                    None => return Ok(None),
                }
            }
            Ok(Some((Reply::Array(Some(items)), consumed)))
        }
        other => Err(Error::InvalidData(format!(
            "invalid reply prefix byte: {:#04x}",
            other
        ))),
    }
}
