//! Keyspace Storage
//!
//! This module provides the in-memory keyspace and its expiration
//! engine. Because the whole server runs on one reactor thread, the
//! keyspace is plain owned data (no locks, no atomics) and every
//! handler mutation is atomic with respect to all other connections.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Vec<Db>                              │
//! │  ┌───────────────┐ ┌───────────────┐      ┌──────────────┐  │
//! │  │ Db 0          │ │ Db 1          │  ..  │ Db N-1       │  │
//! │  │ dict          │ │ dict          │      │ dict         │  │
//! │  │ expires       │ │ expires       │      │ expires      │  │
//! │  └───────────────┘ └───────────────┘      └──────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//!                              ▲
//!                              │ cursor, time budget
//!                ┌─────────────┴──────────────┐
//!                │      ExpirationCycle       │
//!                │ (reactor timer callback)   │
//!                └────────────────────────────┘
//! ```
//!
//! - **Lazy expiration**: dead keys are removed on access.
//! - **Active expiration**: the cycle probes random deadline entries on
//!   a timer, bounded by a per-invocation time budget.

pub mod expire;
pub mod keyspace;
pub mod value;

// Re-export commonly used types
pub use expire::{ExpirationCycle, SweepMode};
pub use keyspace::Db;
pub use value::Value;

use std::time::{SystemTime, UNIX_EPOCH};

/// The current wall-clock time as unix-epoch milliseconds, the time
/// base for all deadlines.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as u64
}
