//! Typed Replies and Their Wire Encoding
//!
//! Command handlers produce a [`Reply`] value; the connection layer
//! renders it into wire bytes and appends them to the outbound buffers.
//! Reply forms:
//!
//! - Status: `+OK\r\n`
//! - Error: `-ERR unknown command\r\n`
//! - Integer: `:1000\r\n`
//! - Bulk: `$5\r\nhello\r\n`, nil as `$-1\r\n`
//! - Multi-bulk: `*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n` (elements may nest)

use crate::protocol::CRLF;
use bytes::Bytes;
use std::fmt;

/// A reply to be rendered onto the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A non-binary-safe status line, e.g. `OK` or `PONG`.
    Status(String),

    /// An error line, e.g. `ERR unknown command 'FOOBAR'`.
    Error(String),

    /// A 64-bit signed integer.
    Integer(i64),

    /// A binary-safe byte string.
    Bulk(Bytes),

    /// The nil bulk reply.
    Nil,

    /// A multi-bulk reply of nested replies.
    Array(Vec<Reply>),
}

impl Reply {
    /// The `+OK` status shared by many write commands.
    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    /// The `+PONG` status.
    pub fn pong() -> Self {
        Reply::Status("PONG".to_string())
    }

    /// Creates a status reply.
    pub fn status(s: impl Into<String>) -> Self {
        Reply::Status(s.into())
    }

    /// Creates an error reply.
    pub fn error(s: impl Into<String>) -> Self {
        Reply::Error(s.into())
    }

    /// Creates a bulk reply.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(data.into())
    }

    /// Renders this reply into wire bytes, appending to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Reply::Status(s) => {
                buf.push(b'+');
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Error(s) => {
                buf.push(b'-');
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Integer(n) => {
                buf.push(b':');
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Bulk(data) => {
                buf.push(b'$');
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            Reply::Nil => {
                buf.extend_from_slice(b"$-1");
                buf.extend_from_slice(CRLF);
            }
            Reply::Array(elements) => {
                buf.push(b'*');
                buf.extend_from_slice(elements.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for element in elements {
                    element.encode_into(buf);
                }
            }
        }
    }

    /// Renders this reply into a fresh byte vector.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        buf
    }

    /// Returns true if this reply is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Status(s) => write!(f, "{}", s),
            Reply::Error(s) => write!(f, "(error) {}", s),
            Reply::Integer(n) => write!(f, "(integer) {}", n),
            Reply::Bulk(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            Reply::Nil => write!(f, "(nil)"),
            Reply::Array(elements) => {
                if elements.is_empty() {
                    write!(f, "(empty array)")
                } else {
                    for (i, element) in elements.iter().enumerate() {
                        writeln!(f, "{}) {}", i + 1, element)?;
                    }
                    Ok(())
                }
            }
        }
    }
}
