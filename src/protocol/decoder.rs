//! Incremental Request Decoder
//!
//! TCP is a stream protocol: a single read may deliver half a command,
//! three commands, or three and a half. The decoder copes by being a
//! resumable state machine. Each call to [`RequestDecoder::decode`]
//! either:
//!
//! - returns `Ok(Some(argv))`: a complete command was extracted and its
//!   bytes removed from the buffer;
//! - returns `Ok(None)`: more bytes are needed. Nothing was consumed
//!   beyond tokens that were already fully parsed, and the internal
//!   state is untouched otherwise, so a later call with more data picks
//!   up exactly where this one stopped;
//! - returns `Err(ProtocolError)`: the stream violates the protocol.
//!
//! ## States
//!
//! ```text
//!             ┌──────────┐   first byte '*'   ┌─────────────────┐
//!   start ───>│ NeedType │───────────────────>│ MultiBulkHeader │
//!             └────┬─────┘                    └────────┬────────┘
//!                  │ anything else                     │ count parsed
//!                  ▼                                   ▼
//!             ┌────────┐                      ┌─────────────────┐
//!             │ Inline │                  ┌──>│ MultiBulkArgLen │
//!             └────────┘                  │   └────────┬────────┘
//!                                         │            │ "$<len>" parsed
//!                                         │            ▼
//!                                         │   ┌─────────────────┐
//!                                         └───│ MultiBulkArgBody│
//!                                  more args  └─────────────────┘
//! ```
//!
//! The inline form additionally supports single- and double-quoted
//! tokens with shell-like escapes, mirroring what `redis-cli` and
//! telnet users expect.

use crate::protocol::{BULK_MAX_SIZE, INLINE_MAX_SIZE, MULTIBULK_MAX_ELEMENTS};
use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

/// Errors that terminate decoding of the current request.
///
/// Every variant is rendered to the client as
/// `ERR Protocol error: <message>`. Size-limit violations may leave the
/// connection open depending on configuration; framing violations
/// always close it because the stream cannot be resynchronized.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// An inline request exceeded the 64 KiB ceiling without a newline.
    #[error("too big inline request")]
    InlineTooLarge,

    /// A multi-bulk count line exceeded the ceiling without terminating.
    #[error("too big mbulk count string")]
    MultiBulkHeaderTooLarge,

    /// A bulk length line exceeded the ceiling without terminating.
    #[error("too big bulk count string")]
    BulkHeaderTooLarge,

    /// The multi-bulk element count was unparsable or over the ceiling.
    #[error("invalid multibulk length")]
    InvalidMultiBulkLength,

    /// A bulk length was unparsable, negative, or over the ceiling.
    #[error("invalid bulk length")]
    InvalidBulkLength,

    /// A multi-bulk element did not start with `$`.
    #[error("expected '$', got '{0}'")]
    ExpectedBulkLength(char),

    /// A bulk payload was not terminated by CRLF.
    #[error("bulk string missing trailing CRLF")]
    BulkMissingCrlf,

    /// An inline request had an unterminated quoted token.
    #[error("unbalanced quotes in request")]
    UnbalancedQuotes,
}

impl ProtocolError {
    /// Whether this violation is a size-limit overrun (close policy is
    /// configurable) rather than a framing error (always closes).
    pub fn is_size_limit(&self) -> bool {
        matches!(
            self,
            ProtocolError::InlineTooLarge
                | ProtocolError::MultiBulkHeaderTooLarge
                | ProtocolError::BulkHeaderTooLarge
        )
    }
}

/// Decoder state. See the module docs for the transition diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Waiting for the first byte of a request to pick the grammar.
    NeedType,
    /// Accumulating a whitespace-delimited single-line request.
    Inline,
    /// Parsing `*<count>\r\n`.
    MultiBulkHeader,
    /// Parsing `$<length>\r\n` for the next argument.
    MultiBulkArgLen,
    /// Waiting for `<length>` payload bytes plus CRLF.
    MultiBulkArgBody,
}

/// A resumable decoder for one connection's request stream.
#[derive(Debug)]
pub struct RequestDecoder {
    state: DecodeState,
    /// Arguments still to be read in the current multi-bulk request.
    remaining: usize,
    /// Declared length of the argument currently being read.
    bulk_len: usize,
    /// Arguments decoded so far for the current request.
    args: Vec<Bytes>,
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestDecoder {
    /// Creates a decoder in its initial state.
    pub fn new() -> Self {
        Self {
            state: DecodeState::NeedType,
            remaining: 0,
            bulk_len: 0,
            args: Vec::new(),
        }
    }

    /// Discards all partial-request state, returning the decoder to
    /// `NeedType`. Used when a protocol violation is forgiven and the
    /// stream restarts at the next input.
    pub fn reset(&mut self) {
        self.state = DecodeState::NeedType;
        self.remaining = 0;
        self.bulk_len = 0;
        self.args.clear();
    }

    /// Attempts to extract one complete command from `buf`.
    ///
    /// Consumed bytes are removed from the front of `buf`; on
    /// `Ok(None)` the buffer holds exactly the unparsed suffix.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Vec<Bytes>>, ProtocolError> {
        loop {
            match self.state {
                DecodeState::NeedType => {
                    if buf.is_empty() {
                        return Ok(None);
                    }
                    self.state = if buf[0] == b'*' {
                        DecodeState::MultiBulkHeader
                    } else {
                        DecodeState::Inline
                    };
                }

                DecodeState::Inline => {
                    let Some(newline) = buf.iter().position(|&b| b == b'\n') else {
                        if buf.len() > INLINE_MAX_SIZE {
                            return Err(ProtocolError::InlineTooLarge);
                        }
                        return Ok(None);
                    };

                    let line = buf.split_to(newline + 1);
                    let mut line = &line[..newline];
                    if line.ends_with(b"\r") {
                        line = &line[..line.len() - 1];
                    }

                    let argv =
                        split_inline_args(line).ok_or(ProtocolError::UnbalancedQuotes)?;
                    self.state = DecodeState::NeedType;
                    return Ok(Some(argv));
                }

                DecodeState::MultiBulkHeader => {
                    let Some(pos) = find_crlf(buf) else {
                        if buf.len() > INLINE_MAX_SIZE {
                            return Err(ProtocolError::MultiBulkHeaderTooLarge);
                        }
                        return Ok(None);
                    };

                    let count = parse_decimal(&buf[1..pos])
                        .ok_or(ProtocolError::InvalidMultiBulkLength)?;
                    if count > MULTIBULK_MAX_ELEMENTS as i64 {
                        return Err(ProtocolError::InvalidMultiBulkLength);
                    }
                    buf.advance(pos + 2);

                    if count <= 0 {
                        // "*0\r\n" and null arrays complete an empty
                        // command; the dispatch layer ignores it.
                        self.state = DecodeState::NeedType;
                        return Ok(Some(Vec::new()));
                    }

                    self.remaining = count as usize;
                    self.args = Vec::with_capacity(self.remaining);
                    self.state = DecodeState::MultiBulkArgLen;
                }

                DecodeState::MultiBulkArgLen => {
                    let Some(pos) = find_crlf(buf) else {
                        if buf.len() > INLINE_MAX_SIZE {
                            return Err(ProtocolError::BulkHeaderTooLarge);
                        }
                        return Ok(None);
                    };

                    if buf[0] != b'$' {
                        return Err(ProtocolError::ExpectedBulkLength(buf[0] as char));
                    }
                    let len =
                        parse_decimal(&buf[1..pos]).ok_or(ProtocolError::InvalidBulkLength)?;
                    if len < 0 || len > BULK_MAX_SIZE as i64 {
                        return Err(ProtocolError::InvalidBulkLength);
                    }
                    buf.advance(pos + 2);

                    self.bulk_len = len as usize;
                    self.state = DecodeState::MultiBulkArgBody;
                }

                DecodeState::MultiBulkArgBody => {
                    if buf.len() < self.bulk_len + 2 {
                        return Ok(None);
                    }

                    let arg = buf.split_to(self.bulk_len).freeze();
                    if &buf[..2] != b"\r\n" {
                        return Err(ProtocolError::BulkMissingCrlf);
                    }
                    buf.advance(2);

                    self.args.push(arg);
                    self.remaining -= 1;

                    if self.remaining == 0 {
                        self.state = DecodeState::NeedType;
                        return Ok(Some(std::mem::take(&mut self.args)));
                    }
                    self.state = DecodeState::MultiBulkArgLen;
                }
            }
        }
    }
}

/// Finds the position of the first CRLF pair in `buf`.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Parses an ASCII decimal integer, rejecting anything else.
fn parse_decimal(digits: &[u8]) -> Option<i64> {
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Splits an inline request line into arguments.
///
/// Tokens are whitespace-separated. A token may be wrapped in double
/// quotes (recognizing the escapes `\n \r \t \b \a \\ \" \'` and
/// `\xHH` hex bytes) or single quotes (where only `\'` is special).
/// A closing quote must be followed by whitespace or end-of-line.
/// Zero-length tokens are dropped from the result.
///
/// Returns `None` on unbalanced quoting.
fn split_inline_args(line: &[u8]) -> Option<Vec<Bytes>> {
    let mut argv = Vec::new();
    let mut i = 0;

    while i < line.len() {
        // Skip inter-token whitespace.
        while i < line.len() && line[i].is_ascii_whitespace() {
            i += 1;
        }
        if i == line.len() {
            break;
        }

        let mut token = Vec::new();
        let mut in_quotes = false;
        let mut in_single_quotes = false;

        loop {
            if i == line.len() {
                if in_quotes || in_single_quotes {
                    return None;
                }
                break;
            }
            let c = line[i];

            if in_quotes {
                if c == b'\\' && i + 3 < line.len() && line[i + 1] == b'x'
                    && line[i + 2].is_ascii_hexdigit()
                    && line[i + 3].is_ascii_hexdigit()
                {
                    token.push(hex_value(line[i + 2]) << 4 | hex_value(line[i + 3]));
                    i += 4;
                } else if c == b'\\' && i + 1 < line.len() {
                    let escaped = match line[i + 1] {
                        b'n' => b'\n',
                        b'r' => b'\r',
                        b't' => b'\t',
                        b'b' => 0x08,
                        b'a' => 0x07,
                        other => other,
                    };
                    token.push(escaped);
                    i += 2;
                } else if c == b'"' {
                    // Closing quote must be followed by whitespace or EOL.
                    if i + 1 < line.len() && !line[i + 1].is_ascii_whitespace() {
                        return None;
                    }
                    i += 1;
                    break;
                } else {
                    token.push(c);
                    i += 1;
                }
            } else if in_single_quotes {
                if c == b'\\' && i + 1 < line.len() && line[i + 1] == b'\'' {
                    token.push(b'\'');
                    i += 2;
                } else if c == b'\'' {
                    if i + 1 < line.len() && !line[i + 1].is_ascii_whitespace() {
                        return None;
                    }
                    i += 1;
                    break;
                } else {
                    token.push(c);
                    i += 1;
                }
            } else {
                match c {
                    c if c.is_ascii_whitespace() => break,
                    b'"' => {
                        in_quotes = true;
                        i += 1;
                    }
                    b'\'' => {
                        in_single_quotes = true;
                        i += 1;
                    }
                    _ => {
                        token.push(c);
                        i += 1;
                    }
                }
            }
        }

        if !token.is_empty() {
            argv.push(Bytes::from(token));
        }
    }

    Some(argv)
}

#[inline]
fn hex_value(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        b'A'..=b'F' => c - b'A' + 10,
        _ => unreachable!("caller checked is_ascii_hexdigit"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8]) -> Vec<Vec<Bytes>> {
        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        while let Some(argv) = decoder.decode(&mut buf).unwrap() {
            out.push(argv);
        }
        out
    }

    fn args(strs: &[&str]) -> Vec<Bytes> {
        strs.iter().map(|s| Bytes::copy_from_slice(s.as_bytes())).collect()
    }

    #[test]
    fn test_multibulk_complete() {
        let commands = decode_all(b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n");
        assert_eq!(commands, vec![args(&["SET", "foo", "bar"])]);
    }

    #[test]
    fn test_multibulk_binary_safe() {
        let commands = decode_all(b"*2\r\n$3\r\nGET\r\n$5\r\nk\x00\r\ny\r\n");
        assert_eq!(commands[0][1], Bytes::from(&b"k\x00\r\ny"[..]));
    }

    #[test]
    fn test_multibulk_split_across_reads() {
        // Example from the wire contract: the header and two arguments
        // arrive first, the final argument later.
        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from(&b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n"[..]);

        assert_eq!(decoder.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"$3\r\nbar\r\n");
        let argv = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(argv, args(&["SET", "foo", "bar"]));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_fragmentation_invariance() {
        // Feeding the stream one byte at a time must produce exactly the
        // same argument vectors as feeding it whole.
        let input = b"*3\r\n$3\r\nSET\r\n$5\r\nhello\r\n$5\r\nworld\r\n*1\r\n$4\r\nPING\r\n";
        let whole = decode_all(input);

        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::new();
        let mut fragmented = Vec::new();
        for &byte in input.iter() {
            buf.extend_from_slice(&[byte]);
            while let Some(argv) = decoder.decode(&mut buf).unwrap() {
                fragmented.push(argv);
            }
        }

        assert_eq!(whole, fragmented);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_empty_buffer_is_idempotent() {
        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::new();
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_pipelined_commands_leave_suffix() {
        let mut decoder = RequestDecoder::new();
        let mut buf =
            BytesMut::from(&b"*1\r\n$4\r\nPING\r\n*2\r\n$3\r\nGET\r\n$1\r\nk"[..]);

        let first = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first, args(&["PING"]));

        // The second command is incomplete; the buffer must hold exactly
        // its unparsed tail.
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
        assert_eq!(&buf[..], b"k");

        buf.extend_from_slice(b"\r\n");
        let second = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(second, args(&["GET", "k"]));
    }

    #[test]
    fn test_multibulk_zero_count_is_empty_command() {
        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from(&b"*0\r\n*1\r\n$4\r\nPING\r\n"[..]);

        assert_eq!(decoder.decode(&mut buf).unwrap(), Some(Vec::new()));
        assert_eq!(decoder.decode(&mut buf).unwrap(), Some(args(&["PING"])));
    }

    #[test]
    fn test_multibulk_negative_count_is_empty_command() {
        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from(&b"*-1\r\n"[..]);
        assert_eq!(decoder.decode(&mut buf).unwrap(), Some(Vec::new()));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_multibulk_count_over_ceiling() {
        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from(&b"*1048577\r\n"[..]);
        assert_eq!(
            decoder.decode(&mut buf),
            Err(ProtocolError::InvalidMultiBulkLength)
        );
    }

    #[test]
    fn test_bulk_negative_length_rejected() {
        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from(&b"*1\r\n$-1\r\n"[..]);
        assert_eq!(decoder.decode(&mut buf), Err(ProtocolError::InvalidBulkLength));
    }

    #[test]
    fn test_missing_dollar_rejected() {
        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from(&b"*1\r\n:4\r\nPING\r\n"[..]);
        assert_eq!(
            decoder.decode(&mut buf),
            Err(ProtocolError::ExpectedBulkLength(':'))
        );
    }

    #[test]
    fn test_bulk_missing_crlf_rejected() {
        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from(&b"*1\r\n$4\r\nPINGXX"[..]);
        assert_eq!(decoder.decode(&mut buf), Err(ProtocolError::BulkMissingCrlf));
    }

    #[test]
    fn test_inline_simple() {
        let commands = decode_all(b"PING\r\n");
        assert_eq!(commands, vec![args(&["PING"])]);
    }

    #[test]
    fn test_inline_without_carriage_return() {
        let commands = decode_all(b"PING\n");
        assert_eq!(commands, vec![args(&["PING"])]);
    }

    #[test]
    fn test_inline_multiple_tokens_and_extra_spaces() {
        let commands = decode_all(b"SET   foo    bar\r\n");
        assert_eq!(commands, vec![args(&["SET", "foo", "bar"])]);
    }

    #[test]
    fn test_inline_double_quotes_with_escapes() {
        let commands = decode_all(b"SET greeting \"hello\\nworld\"\r\n");
        assert_eq!(commands[0][2], Bytes::from(&b"hello\nworld"[..]));
    }

    #[test]
    fn test_inline_hex_escape() {
        let commands = decode_all(b"SET k \"\\x41\\x42\"\r\n");
        assert_eq!(commands[0][2], Bytes::from(&b"AB"[..]));
    }

    #[test]
    fn test_inline_single_quotes_literal() {
        let commands = decode_all(b"SET k 'a \"b\" c'\r\n");
        assert_eq!(commands[0][2], Bytes::from(&b"a \"b\" c"[..]));
    }

    #[test]
    fn test_inline_unbalanced_quotes() {
        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from(&b"SET k \"oops\r\n"[..]);
        assert_eq!(decoder.decode(&mut buf), Err(ProtocolError::UnbalancedQuotes));
    }

    #[test]
    fn test_inline_quote_must_be_followed_by_space() {
        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from(&b"SET k \"a\"b\r\n"[..]);
        assert_eq!(decoder.decode(&mut buf), Err(ProtocolError::UnbalancedQuotes));
    }

    #[test]
    fn test_inline_empty_line_is_empty_command() {
        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from(&b"\r\n"[..]);
        assert_eq!(decoder.decode(&mut buf).unwrap(), Some(Vec::new()));
    }

    #[test]
    fn test_inline_too_large_without_newline() {
        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&vec![b'a'; INLINE_MAX_SIZE + 1]);
        assert_eq!(decoder.decode(&mut buf), Err(ProtocolError::InlineTooLarge));
    }

    #[test]
    fn test_inline_under_limit_waits_for_more() {
        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&vec![b'a'; 128]);
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 128);
    }

    #[test]
    fn test_size_limit_classification() {
        assert!(ProtocolError::InlineTooLarge.is_size_limit());
        assert!(ProtocolError::BulkHeaderTooLarge.is_size_limit());
        assert!(!ProtocolError::UnbalancedQuotes.is_size_limit());
        assert!(!ProtocolError::InvalidBulkLength.is_size_limit());
    }

    #[test]
    fn test_reset_clears_partial_state() {
        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n"[..]);
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);

        decoder.reset();
        let mut fresh = BytesMut::from(&b"*1\r\n$4\r\nPING\r\n"[..]);
        assert_eq!(decoder.decode(&mut fresh).unwrap(), Some(args(&["PING"])));
    }
}
