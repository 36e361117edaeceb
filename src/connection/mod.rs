//! Client Connections
//!
//! One [`Connection`] exists per accepted socket. It couples the
//! non-blocking stream with a [`Client`]: the protocol-level state that
//! survives between readiness events: the inbound byte buffer, the
//! request decoder, the outbound reply buffers, the selected database
//! and the authentication flag.
//!
//! ## Lifecycle
//!
//! ```text
//! accept ──> register READABLE ──┐
//!                                ▼
//!               ┌────────────────────────────────┐
//!               │ read-ready:                    │
//!               │   drain socket into inbound    │
//!               │   decode + dispatch repeatedly │
//!               │   enable WRITABLE if output    │
//!               └───────────────┬────────────────┘
//!                               ▼
//!               ┌────────────────────────────────┐
//!               │ write-ready:                   │
//!               │   flush ≤ 64 KiB               │
//!               │   drained? drop WRITABLE       │
//!               │   close-after-reply? teardown  │
//!               └────────────────────────────────┘
//! ```
//!
//! The split between `Connection` (socket-facing) and `Client`
//! (protocol-facing) keeps command handlers independent of any real
//! socket: they only ever see a `&mut Client`.

pub mod outbound;

pub use outbound::{ReplyBuffer, REPLY_CHUNK_BYTES, WRITE_MAX_PER_EVENT};

use crate::protocol::{Reply, RequestDecoder};
use bytes::{Bytes, BytesMut};
use mio::net::TcpStream;
use mio::Token;
use std::io::{self, Read};
use std::net::SocketAddr;

/// Initial capacity of the inbound buffer.
const INITIAL_INBOUND_CAPACITY: usize = 4096;

/// Stack scratch size for draining the socket.
const READ_SCRATCH_BYTES: usize = 4096;

/// Result of draining a socket with non-blocking reads.
#[derive(Debug)]
pub enum ReadOutcome {
    /// Bytes appended to the inbound buffer (0 on a spurious wakeup).
    Data(usize),
    /// The peer closed the connection in an orderly way.
    Closed,
    /// An unrecoverable I/O error.
    Error(io::Error),
}

/// Protocol-level per-connection state, independent of the socket.
#[derive(Debug)]
pub struct Client {
    /// Unparsed request bytes.
    pub inbound: BytesMut,
    /// Incremental request decoder.
    pub decoder: RequestDecoder,
    /// Staged replies.
    outbound: ReplyBuffer,
    /// Index of the selected logical database.
    db_index: usize,
    /// Whether AUTH has succeeded (meaningful only when a password is
    /// configured).
    authenticated: bool,
    /// Close the connection once the outbound buffers drain.
    close_after_reply: bool,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// Creates a fresh client on database 0.
    pub fn new() -> Self {
        Self {
            inbound: BytesMut::with_capacity(INITIAL_INBOUND_CAPACITY),
            decoder: RequestDecoder::new(),
            outbound: ReplyBuffer::new(),
            db_index: 0,
            authenticated: false,
            close_after_reply: false,
        }
    }

    /// The selected database index.
    pub fn db_index(&self) -> usize {
        self.db_index
    }

    /// Selects a database. The caller validates the index.
    pub fn select_db(&mut self, index: usize) {
        self.db_index = index;
    }

    /// Whether this client has authenticated.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Marks this client as authenticated.
    pub fn set_authenticated(&mut self, authenticated: bool) {
        self.authenticated = authenticated;
    }

    /// Requests teardown once pending replies are flushed.
    pub fn mark_close(&mut self) {
        self.close_after_reply = true;
    }

    /// Whether teardown was requested.
    pub fn should_close(&self) -> bool {
        self.close_after_reply
    }

    /// Decodes the next complete command from the inbound buffer.
    pub fn next_command(
        &mut self,
    ) -> Result<Option<Vec<Bytes>>, crate::protocol::ProtocolError> {
        self.decoder.decode(&mut self.inbound)
    }

    /// Appends a typed reply to the outbound buffers.
    pub fn reply(&mut self, reply: &Reply) {
        let mut encoded = Vec::new();
        reply.encode_into(&mut encoded);
        self.outbound.append(&encoded);
    }

    /// Appends a status reply, e.g. `+OK`.
    pub fn reply_status(&mut self, status: impl Into<String>) {
        self.reply(&Reply::status(status));
    }

    /// Appends an error reply.
    pub fn reply_error(&mut self, message: impl Into<String>) {
        self.reply(&Reply::error(message));
    }

    /// Appends an integer reply.
    pub fn reply_integer(&mut self, n: i64) {
        self.reply(&Reply::Integer(n));
    }

    /// Appends a bulk reply.
    pub fn reply_bulk(&mut self, data: impl Into<Bytes>) {
        self.reply(&Reply::bulk(data.into()));
    }

    /// Appends the nil reply.
    pub fn reply_nil(&mut self) {
        self.reply(&Reply::Nil);
    }

    /// Appends a multi-bulk reply.
    pub fn reply_multi_bulk(&mut self, elements: Vec<Reply>) {
        self.reply(&Reply::Array(elements));
    }

    /// Whether any reply bytes are waiting to be flushed.
    pub fn has_pending_output(&self) -> bool {
        self.outbound.has_pending()
    }

    /// Drains pending replies into `writer` under `cap`.
    pub fn write_pending<W: io::Write>(&mut self, writer: &mut W, cap: usize) -> io::Result<usize> {
        self.outbound.write_to(writer, cap)
    }
}

/// A socket plus its client state, as registered with the event loop.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    addr: SocketAddr,
    token: Token,
    /// Whether WRITABLE interest is currently registered.
    write_interest: bool,
    /// Protocol state; handlers only ever see this part.
    pub client: Client,
}

impl Connection {
    /// Wraps an accepted stream.
    pub fn new(stream: TcpStream, addr: SocketAddr, token: Token) -> Self {
        Self {
            stream,
            addr,
            token,
            write_interest: false,
            client: Client::new(),
        }
    }

    /// The peer address, for logging.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The poll token this connection is registered under.
    pub fn token(&self) -> Token {
        self.token
    }

    /// The underlying stream, for poll (de)registration.
    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Whether WRITABLE interest is currently registered.
    pub fn write_interest(&self) -> bool {
        self.write_interest
    }

    /// Records the current WRITABLE registration state.
    pub fn set_write_interest(&mut self, enabled: bool) {
        self.write_interest = enabled;
    }

    /// Drains the socket into the inbound buffer until it would block
    /// or the peer closes.
    pub fn read_available(&mut self) -> ReadOutcome {
        let mut scratch = [0u8; READ_SCRATCH_BYTES];
        let mut total = 0;

        loop {
            match self.stream.read(&mut scratch) {
                Ok(0) => return ReadOutcome::Closed,
                Ok(n) => {
                    self.client.inbound.extend_from_slice(&scratch[..n]);
                    total += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return ReadOutcome::Data(total)
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {
                    return ReadOutcome::Closed
                }
                Err(e) => return ReadOutcome::Error(e),
            }
        }
    }

    /// Flushes pending replies under the per-event cap. Returns whether
    /// the outbound buffers are now fully drained.
    pub fn flush(&mut self) -> io::Result<bool> {
        self.client
            .write_pending(&mut self.stream, WRITE_MAX_PER_EVENT)?;
        Ok(!self.client.has_pending_output())
    }
}
