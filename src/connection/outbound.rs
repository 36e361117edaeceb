//! Outbound Reply Buffering and Backpressure
//!
//! Replies are staged in a two-tier structure per connection:
//!
//! - a fixed 16 KiB **chunk** for the common case: small replies are
//!   copied here back to back;
//! - an **overflow queue** of byte strings for replies that do not fit.
//!
//! Draining is strictly chunk-first, queue-second, and a new reply may
//! only be appended to the chunk while the queue is empty. Together
//! these rules keep replies on the wire in exactly the order their
//! commands were dispatched, with no interleaving.
//!
//! [`ReplyBuffer::write_to`] drains under a caller-supplied byte cap
//! (64 KiB per write-ready event). If the cap is reached, or the socket
//! accepts a short write, the unsent remainder stays at the front,
//! tracked by a sent cursor, and the next write-ready event continues
//! from the exact byte where this one stopped. That is what prevents
//! one client with a huge pending reply from monopolizing the reactor.

use bytes::Bytes;
use std::collections::VecDeque;
use std::io::{self, Write};

/// Size of the primary fixed reply chunk (16 KiB).
pub const REPLY_CHUNK_BYTES: usize = 16 * 1024;

/// Maximum bytes written to one socket per write-ready event (64 KiB).
pub const WRITE_MAX_PER_EVENT: usize = 64 * 1024;

/// Per-connection outbound buffer.
pub struct ReplyBuffer {
    /// Primary fixed-size buffer.
    chunk: Box<[u8; REPLY_CHUNK_BYTES]>,
    /// Write cursor into `chunk`.
    chunk_pos: usize,
    /// Bytes of the current head (chunk, or front queue entry once the
    /// chunk is empty) already accepted by the socket.
    sent: usize,
    /// Replies that did not fit in the chunk, oldest first.
    overflow: VecDeque<Bytes>,
}

impl std::fmt::Debug for ReplyBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyBuffer")
            .field("chunk_pos", &self.chunk_pos)
            .field("sent", &self.sent)
            .field("overflow_entries", &self.overflow.len())
            .finish()
    }
}

impl Default for ReplyBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplyBuffer {
    /// Creates an empty reply buffer.
    pub fn new() -> Self {
        Self {
            chunk: Box::new([0u8; REPLY_CHUNK_BYTES]),
            chunk_pos: 0,
            sent: 0,
            overflow: VecDeque::new(),
        }
    }

    /// Appends one encoded reply.
    ///
    /// The chunk is used only while the queue is empty and the reply
    /// fits in the remaining space; otherwise the whole reply goes to
    /// the queue. Splitting a reply across the two tiers would allow
    /// reordering, so it is never done.
    pub fn append(&mut self, reply: &[u8]) {
        if self.overflow.is_empty() && self.chunk_pos + reply.len() <= REPLY_CHUNK_BYTES {
            self.chunk[self.chunk_pos..self.chunk_pos + reply.len()].copy_from_slice(reply);
            self.chunk_pos += reply.len();
        } else {
            self.overflow.push_back(Bytes::copy_from_slice(reply));
        }
    }

    /// Whether any bytes are waiting to be written.
    pub fn has_pending(&self) -> bool {
        self.chunk_pos > 0 || !self.overflow.is_empty()
    }

    /// Total bytes waiting to be written. The sent cursor belongs to
    /// the chunk while the chunk holds data, and to the front queue
    /// entry afterwards.
    pub fn pending_bytes(&self) -> usize {
        let queued: usize = self.overflow.iter().map(Bytes::len).sum();
        if self.chunk_pos > 0 {
            (self.chunk_pos - self.sent) + queued
        } else {
            queued - self.sent
        }
    }

    /// Drains pending bytes into `writer`, writing at most `cap` bytes.
    ///
    /// Returns the number of bytes written. Stops early on `WouldBlock`
    /// or a short write; any other I/O error is returned to the caller
    /// (connection teardown). The unsent remainder always stays at the
    /// front for the next call.
    pub fn write_to<W: Write>(&mut self, writer: &mut W, cap: usize) -> io::Result<usize> {
        let mut written = 0;

        while written < cap {
            // Chunk first.
            if self.chunk_pos > 0 {
                let end = self.chunk_pos.min(self.sent.saturating_add(cap - written));
                let n = match writer.write(&self.chunk[self.sent..end]) {
                    Ok(0) => return Ok(written),
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(written),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                };
                self.sent += n;
                written += n;

                if self.sent == self.chunk_pos {
                    self.chunk_pos = 0;
                    self.sent = 0;
                } else {
                    // Short write: leave the remainder where it is.
                    return Ok(written);
                }
            } else if let Some(front) = self.overflow.front() {
                let end = front.len().min(self.sent.saturating_add(cap - written));
                let n = match writer.write(&front[self.sent..end]) {
                    Ok(0) => return Ok(written),
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(written),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                };
                self.sent += n;
                written += n;

                if self.sent == front.len() {
                    self.overflow.pop_front();
                    self.sent = 0;
                } else {
                    return Ok(written);
                }
            } else {
                break;
            }
        }

        Ok(written)
    }
}
