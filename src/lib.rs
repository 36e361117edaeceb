//! # flintkv - A Reactor-Driven In-Memory Key-Value Server
//!
//! flintkv is an in-memory key-value database speaking the Redis wire
//! protocol, built as a single-threaded, non-blocking event reactor:
//! one thread multiplexes every client socket, decodes commands
//! incrementally from partial reads, executes them against the
//! keyspace, and flushes replies under backpressure.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           flintkv                               │
//! │                                                                 │
//! │  ┌───────────────────────────────────────────────────────────┐  │
//! │  │                    EventLoop (mio)                        │  │
//! │  │   accept · read/write readiness · timers                  │  │
//! │  └──────┬─────────────────────────────────────────┬──────────┘  │
//! │         │ read-ready                              │ timer       │
//! │         ▼                                         ▼             │
//! │  ┌─────────────┐   ┌──────────────┐   ┌─────────────────────┐  │
//! │  │ Connection  │──>│RequestDecoder│   │  ExpirationCycle    │  │
//! │  │ (inbound)   │   │(state machine│   │ (random sampling,   │  │
//! │  └─────────────┘   │  per client) │   │  time budgeted)     │  │
//! │                    └──────┬───────┘   └──────────┬──────────┘  │
//! │                           │ argv                 │             │
//! │                           ▼                      ▼             │
//! │  ┌─────────────┐   ┌──────────────┐   ┌─────────────────────┐  │
//! │  │ ReplyBuffer │<──│ CommandTable │──>│      Vec<Db>        │  │
//! │  │ chunk+queue │   │   dispatch   │   │ dict + expires maps │  │
//! │  └─────────────┘   └──────────────┘   └─────────────────────┘  │
//! │         │ write-ready, ≤ 64 KiB per event                      │
//! │         ▼                                                      │
//! │       socket                                                   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core invariants
//!
//! - **No torn commands**: the decoder never exposes a partially read
//!   argument vector; "need more data" leaves all state intact.
//! - **No starvation**: per-event work is bounded; reads drain until
//!   the socket would block, writes are capped at 64 KiB per event,
//!   expiration sweeps run under a time budget.
//! - **No blocking handlers**: the only blocking point is the poll
//!   wait, bounded by the nearest timer.
//! - **Deterministic expiration**: dead keys vanish on access (lazy)
//!   and are reclaimed by the sampling sweep (active), whichever comes
//!   first.
//!
//! ## Module Overview
//!
//! - [`protocol`]: request decoder state machine and typed replies
//! - [`connection`]: per-socket client state and outbound buffering
//! - [`commands`]: command table, dispatch, and the built-in commands
//! - [`storage`]: logical databases, value types, expiration engine
//! - [`reactor`]: the mio event loop and timer set
//! - [`server`]: the server context and configuration
//!
//! ## Concurrency Model
//!
//! Exactly one thread runs everything. Handlers therefore mutate the
//! keyspace without locks, and a multi-key command is atomic with
//! respect to every other connection. Work that must not stall clients
//! (snapshot persistence) belongs on a separate worker fed by
//! [`storage::Db::snapshot`].

pub mod commands;
pub mod connection;
pub mod protocol;
pub mod reactor;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::{dispatch, CommandSpec, CommandTable};
pub use connection::{Client, Connection, ReplyBuffer};
pub use protocol::{ProtocolError, Reply, RequestDecoder};
pub use reactor::EventLoop;
pub use server::{Config, Server};
pub use storage::{Db, ExpirationCycle, Value};

/// The default port flintkv listens on (same as Redis).
pub const DEFAULT_PORT: u16 = 6379;

/// The default host flintkv binds to.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of flintkv.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
