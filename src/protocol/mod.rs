//! Redis Wire Protocol
//!
//! This module implements both directions of the request/reply protocol:
//!
//! - `decoder`: an incremental, per-connection state machine that turns a
//!   raw byte stream into complete argument vectors. It understands the
//!   length-prefixed multi-bulk form (`*2\r\n$3\r\nGET\r\n$4\r\nname\r\n`)
//!   used by real clients and the whitespace-delimited inline form
//!   (`GET name\r\n`) used by telnet sessions.
//! - `reply`: the typed reply value (`Reply`) and its wire encoding
//!   (status, error, integer, bulk, nil, multi-bulk).
//!
//! The decoder is deliberately restartable: whenever it reports "need
//! more data" it has consumed nothing it did not fully parse, so feeding
//! it a command one byte at a time produces exactly the same argument
//! vector as feeding it the whole command at once.

pub mod decoder;
pub mod reply;

// Re-export commonly used types for convenience
pub use decoder::{ProtocolError, RequestDecoder};
pub use reply::Reply;

/// Hard ceiling for an inline request or a multi-bulk length line that
/// has not yet seen its terminating newline (64 KiB).
pub const INLINE_MAX_SIZE: usize = 64 * 1024;

/// Hard ceiling on the element count of a multi-bulk request.
pub const MULTIBULK_MAX_ELEMENTS: usize = 1024 * 1024;

/// Hard ceiling on a single bulk argument (512 MiB, as Redis).
pub const BULK_MAX_SIZE: usize = 512 * 1024 * 1024;

/// The CRLF line terminator used throughout the protocol.
pub const CRLF: &[u8] = b"\r\n";
