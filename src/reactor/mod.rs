//! The Event Reactor
//!
//! A single-threaded readiness loop built on `mio`. One iteration:
//!
//! 1. run the pre-wait hook (fast expiration catch-up);
//! 2. wait for readiness, blocking no longer than the nearest timer;
//! 3. for every ready token, run the accept, read or write handling;
//! 4. fire due timers.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        EventLoop                              │
//! │                                                               │
//! │   Poll ──ready──> LISTENER ──accept──> register(READABLE)     │
//! │     │                                                         │
//! │     ├──ready──> Connection ──read──> decode ──> dispatch      │
//! │     │                │                               │        │
//! │     │                └──write──> flush ≤ 64 KiB <────┘        │
//! │     │                                                         │
//! │     └──timeout──> timers (cron: active expiration)            │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Handler invocations per iteration are bounded by the readiness set,
//! and per-connection work is bounded by the read drain and the 64 KiB
//! write cap, so no single client can starve the loop. Connection
//! failures tear down that connection only; the loop itself exits only
//! on a poller error.
//!
//! Teardown deregisters the socket from the poller *before* closing it,
//! so a handler is never invoked against a closed handle.

use crate::commands;
use crate::connection::{Connection, ReadOutcome};
use crate::server::Server;
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use std::collections::{BinaryHeap, HashMap};
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Token reserved for the listening socket.
const LISTENER: Token = Token(0);

/// Readiness events buffered per poll call.
const EVENTS_CAPACITY: usize = 1024;

/// A timer callback. Returning `Some(period)` re-arms the timer that
/// far in the future; `None` drops it.
pub type TimerCallback = Box<dyn FnMut(&mut Server) -> Option<Duration> + Send>;

/// A one-shot timer entry, min-ordered by deadline.
struct Timer {
    deadline: Instant,
    /// Registration order, to break deadline ties stably.
    seq: u64,
    callback: TimerCallback,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reversed: BinaryHeap is a max-heap, we want the nearest
        // deadline on top.
        (other.deadline, other.seq).cmp(&(self.deadline, self.seq))
    }
}

/// The reactor: poller, listener, connection table, timers.
pub struct EventLoop {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    connections: HashMap<Token, Connection>,
    timers: BinaryHeap<Timer>,
    next_token: usize,
    next_timer_seq: u64,
}

impl EventLoop {
    /// Binds the listener and registers it with the poller.
    pub fn bind(addr: &str) -> io::Result<Self> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let mut listener = TcpListener::bind(addr)?;

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;

        Ok(Self {
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            listener,
            connections: HashMap::new(),
            timers: BinaryHeap::new(),
            next_token: 1,
            next_timer_seq: 0,
        })
    }

    /// The bound listen address (useful with port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Number of currently registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Schedules a one-shot timer `after` from now. The callback may
    /// re-arm itself by returning the next period.
    pub fn schedule(
        &mut self,
        after: Duration,
        callback: impl FnMut(&mut Server) -> Option<Duration> + Send + 'static,
    ) {
        self.timers.push(Timer {
            deadline: Instant::now() + after,
            seq: self.next_timer_seq,
            callback: Box::new(callback),
        });
        self.next_timer_seq += 1;
    }

    /// Runs the reactor until the poller fails.
    pub fn run(&mut self, server: &mut Server) -> io::Result<()> {
        info!(addr = %self.local_addr()?, "reactor running");
        loop {
            self.poll_once(server, None)?;
        }
    }

    /// One reactor iteration. `max_wait` additionally bounds the poll
    /// wait (used by tests and embedders); the nearest timer always
    /// does.
    pub fn poll_once(&mut self, server: &mut Server, max_wait: Option<Duration>) -> io::Result<()> {
        server.before_sleep();

        let now = Instant::now();
        let timer_wait = self
            .timers
            .peek()
            .map(|timer| timer.deadline.saturating_duration_since(now));
        let timeout = match (timer_wait, max_wait) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, b) => b,
        };

        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e),
        }

        // Readiness is collected first: handling an event mutates the
        // connection table, which must not alias the event buffer.
        let ready: Vec<(Token, bool, bool)> = self
            .events
            .iter()
            .map(|event| {
                (
                    event.token(),
                    event.is_readable() || event.is_read_closed(),
                    event.is_writable(),
                )
            })
            .collect();

        for (token, readable, writable) in ready {
            if token == LISTENER {
                self.accept_ready(server);
                continue;
            }
            if readable {
                self.handle_readable(server, token);
            }
            if writable {
                self.handle_writable(token);
            }
        }

        self.fire_due_timers(server);
        Ok(())
    }

    /// Accepts every pending connection on the listener.
    fn accept_ready(&mut self, server: &mut Server) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, addr)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;

                    if let Err(e) =
                        self.poll
                            .registry()
                            .register(&mut stream, token, Interest::READABLE)
                    {
                        warn!(client = %addr, error = %e, "failed to register connection");
                        continue;
                    }

                    self.connections
                        .insert(token, Connection::new(stream, addr, token));
                    server.note_connection();
                    info!(client = %addr, "client connected");
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    break;
                }
            }
        }
    }

    /// Read-readiness: drain the socket, then decode and dispatch every
    /// complete command buffered so far.
    fn handle_readable(&mut self, server: &mut Server, token: Token) {
        let Some(mut conn) = self.connections.remove(&token) else {
            return;
        };

        match conn.read_available() {
            ReadOutcome::Closed => {
                debug!(client = %conn.addr(), "client disconnected");
                self.teardown(conn);
                return;
            }
            ReadOutcome::Error(e) => {
                warn!(client = %conn.addr(), error = %e, "read failed");
                self.teardown(conn);
                return;
            }
            ReadOutcome::Data(n) => {
                trace!(client = %conn.addr(), bytes = n, "read");
            }
        }

        // Each decoded command is dispatched before the next is decoded;
        // a QUIT (or protocol error) stops the loop early.
        while !conn.client.should_close() {
            match conn.client.next_command() {
                Ok(Some(argv)) => {
                    if argv.is_empty() {
                        continue;
                    }
                    commands::dispatch(server, &mut conn.client, &argv);
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(client = %conn.addr(), error = %e, "protocol error");
                    conn.client.reply_error(format!("ERR Protocol error: {}", e));
                    if e.is_size_limit() && !server.config().close_on_protocol_limit {
                        // Forgiven: drop the poisoned input and resync
                        // at whatever the client sends next.
                        conn.client.decoder.reset();
                        conn.client.inbound.clear();
                    } else {
                        conn.client.mark_close();
                    }
                    break;
                }
            }
        }

        self.finish_event(conn);
    }

    /// Write-readiness: flush up to the per-event cap.
    fn handle_writable(&mut self, token: Token) {
        let Some(mut conn) = self.connections.remove(&token) else {
            return;
        };

        match conn.flush() {
            Ok(_) => self.finish_event(conn),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => self.finish_event(conn),
            Err(e) => {
                warn!(client = %conn.addr(), error = %e, "write failed");
                self.teardown(conn);
            }
        }
    }

    /// Reconciles poll interest with the connection's pending output
    /// and close flag, then returns it to the table or tears it down.
    fn finish_event(&mut self, mut conn: Connection) {
        let pending = conn.client.has_pending_output();

        if !pending && conn.client.should_close() {
            debug!(client = %conn.addr(), "closing connection");
            self.teardown(conn);
            return;
        }

        // Readiness is edge-triggered: with output still pending the
        // write interest is re-armed every time (reregister reports
        // current writability as a fresh edge), otherwise a capped
        // flush that never hit WouldBlock would wait forever.
        if pending || conn.write_interest() {
            let token = conn.token();
            let interest = if pending {
                Interest::READABLE | Interest::WRITABLE
            } else {
                Interest::READABLE
            };
            match self
                .poll
                .registry()
                .reregister(conn.stream_mut(), token, interest)
            {
                Ok(()) => conn.set_write_interest(pending),
                Err(e) => {
                    warn!(client = %conn.addr(), error = %e, "reregister failed");
                    self.teardown(conn);
                    return;
                }
            }
        }

        self.connections.insert(conn.token(), conn);
    }

    /// Deregisters all interests, then drops (closes) the socket.
    fn teardown(&mut self, mut conn: Connection) {
        if let Err(e) = self.poll.registry().deregister(conn.stream_mut()) {
            debug!(client = %conn.addr(), error = %e, "deregister failed");
        }
        info!(client = %conn.addr(), "connection closed");
    }

    /// Fires every timer whose deadline has passed, re-arming periodic
    /// ones.
    fn fire_due_timers(&mut self, server: &mut Server) {
        let now = Instant::now();
        while let Some(head) = self.timers.peek() {
            if head.deadline > now {
                break;
            }
            let Some(mut timer) = self.timers.pop() else {
                break;
            };
            if let Some(period) = (timer.callback)(server) {
                timer.deadline = Instant::now() + period;
                timer.seq = self.next_timer_seq;
                self.next_timer_seq += 1;
                self.timers.push(timer);
            }
        }
    }
}
