//! Command frames.
//!
//! A [`Command`] is the name plus an ordered list of [`Arg`]s. Encoding to
//! the wire happens exactly once, on the send path, through the
//! connection's configured charset.

use crate::error::{Error, Result};
use crate::opts::Charset;
use crate::protocol::request::{write_bulk, write_header};

/// One command argument. Text arguments are encoded through the connection
/// charset; byte arguments pass through untouched; numbers render as ASCII
/// decimal (floats fixed-point with six fractional digits).
#[derive(Debug, Clone)]
pub enum Arg {
    Bytes(Vec<u8>),
    Text(String),
    Int(i64),
    Float(f64),
}

impl Arg {
    /// The argument as routing text, if it is textual.
    pub(crate) fn as_text(&self) -> Option<&str> {
        match self {
            Arg::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Conversion into a command argument.
pub trait IntoArg {
    fn into_arg(self) -> Arg;
}

impl IntoArg for Arg {
    fn into_arg(self) -> Arg {
        self
    }
}

impl IntoArg for &str {
    fn into_arg(self) -> Arg {
        Arg::Text(self.to_string())
    }
}

impl IntoArg for String {
    fn into_arg(self) -> Arg {
        Arg::Text(self)
    }
}

impl IntoArg for &String {
    fn into_arg(self) -> Arg {
        Arg::Text(self.clone())
    }
}

impl IntoArg for Vec<u8> {
    fn into_arg(self) -> Arg {
        Arg::Bytes(self)
    }
}

impl IntoArg for &[u8] {
    fn into_arg(self) -> Arg {
        Arg::Bytes(self.to_vec())
    }
}

impl IntoArg for f64 {
    fn into_arg(self) -> Arg {
        Arg::Float(self)
    }
}

impl IntoArg for f32 {
    fn into_arg(self) -> Arg {
        Arg::Float(f64::from(self))
    }
}

macro_rules! impl_into_arg_int {
    ($($t:ty),*) => {
        $(impl IntoArg for $t {
            fn into_arg(self) -> Arg {
                Arg::Int(self as i64)
            }
        })*
    };
}

impl_into_arg_int!(i64, i32, i16, u16, u32, u64, usize);

/// A command to be sent to the server.
#[derive(Debug, Clone)]
pub struct Command {
    name: &'static str,
    args: Vec<Arg>,
}

impl Command {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            args: Vec::new(),
        }
    }

    /// The wire name, e.g. `GET`.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn arg(mut self, arg: impl IntoArg) -> Self {
        self.args.push(arg.into_arg());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: IntoArg,
    {
        self.args.extend(args.into_iter().map(IntoArg::into_arg));
        self
    }

    /// The first argument, used by the sharded handler for key routing.
    pub(crate) fn first_arg(&self) -> Option<&Arg> {
        self.args.first()
    }

    /// Encode the request frame into `out`.
    ///
    /// Fails with [`Error::InvalidData`] before anything is written when a
    /// text argument meets a binary (unset) charset.
    pub fn encode(&self, charset: Charset, out: &mut Vec<u8>) -> Result<()> {
        write_header(out, 1 + self.args.len());
        write_bulk(out, self.name.as_bytes());
        for arg in &self.args {
            match arg {
                Arg::Bytes(data) => write_bulk(out, data),
                Arg::Text(text) => match charset {
                    Charset::Utf8 => write_bulk(out, text.as_bytes()),
                    Charset::Binary => {
                        return Err(Error::InvalidData(
                            "encoding charset was not specified".into(),
                        ));
                    }
                },
                Arg::Int(n) => write_bulk(out, n.to_string().as_bytes()),
                Arg::Float(f) => write_bulk(out, format!("{:.6}", f).as_bytes()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Reply, ReplyParser};
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    fn encode(cmd: Command) -> Vec<u8> {
        let mut out = Vec::new();
        cmd.encode(Charset::Utf8, &mut out).unwrap();
        out
    }

    #[test]
    fn set_frame() {
        let out = encode(Command::new("SET").arg("k").arg("v"));
        assert_eq!(out, b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n");
    }

    #[test]
    fn numeric_rendering() {
        let out = encode(Command::new("EXPIRE").arg("k").arg(10));
        assert_eq!(out, b"*3\r\n$6\r\nEXPIRE\r\n$1\r\nk\r\n$2\r\n10\r\n");

        let out = encode(Command::new("INCRBYFLOAT").arg("k").arg(1.5));
        assert_eq!(
            out,
            b"*3\r\n$11\r\nINCRBYFLOAT\r\n$1\r\nk\r\n$8\r\n1.500000\r\n"
        );
    }

    #[test]
    fn binary_charset_rejects_text() {
        let mut out = Vec::new();
        let err = Command::new("GET")
            .arg("k")
            .encode(Charset::Binary, &mut out)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
        // raw bytes are still fine
        let mut out = Vec::new();
        Command::new("GET")
            .arg(b"k".as_slice())
            .encode(Charset::Binary, &mut out)
            .unwrap();
        assert_eq!(out, b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n");
    }

    /// Encoded frames parse back to the same tokens.
    #[test]
    fn frame_round_trip() {
        let out = encode(
            Command::new("MSET")
                .arg("a")
                .arg(1)
                .arg("bin")
                .arg(b"\x00\xff".as_slice()),
        );
        let mut parser = ReplyParser::new();
        parser.feed(&out);
        let reply = parser.next().unwrap().unwrap();
        assert_eq!(
            reply,
            Reply::Array(Some(vec![
                Reply::Bulk(Some(Bytes::from_static(b"MSET"))),
                Reply::Bulk(Some(Bytes::from_static(b"a"))),
                Reply::Bulk(Some(Bytes::from_static(b"1"))),
                Reply::Bulk(Some(Bytes::from_static(b"bin"))),
                Reply::Bulk(Some(Bytes::from_static(b"\x00\xff"))),
            ]))
        );
    }
}
