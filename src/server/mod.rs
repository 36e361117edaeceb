//! Server Context
//!
//! [`Server`] is the explicit context value that replaces global state:
//! it owns the configuration, the logical databases, the command table
//! and the active-expiration state, and is passed by `&mut` to command
//! handlers and timer callbacks. Exactly one thread ever touches it.

pub mod config;

pub use config::Config;

use crate::commands::CommandTable;
use crate::storage::{now_ms, Db, ExpirationCycle, SweepMode};
use tracing::debug;

/// The server context: everything that outlives a single connection.
#[derive(Debug)]
pub struct Server {
    config: Config,
    dbs: Vec<Db>,
    commands: CommandTable,
    cron: ExpirationCycle,
    /// Commands dispatched since startup.
    commands_processed: u64,
    /// Connections accepted since startup.
    connections_accepted: u64,
    /// Keys reclaimed by the active expiration cycle.
    expired_keys: u64,
    /// Keyspace writes since startup; a snapshot scheduler would reset
    /// this after each save.
    dirty: u64,
}

impl Server {
    /// Builds the context: databases, command table, expiration state.
    pub fn new(config: Config) -> Self {
        let dbs = (0..config.databases.max(1)).map(Db::new).collect();
        Self {
            config,
            dbs,
            commands: CommandTable::new(),
            cron: ExpirationCycle::new(),
            commands_processed: 0,
            connections_accepted: 0,
            expired_keys: 0,
            dirty: 0,
        }
    }

    /// The configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The command table.
    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    /// Number of logical databases.
    pub fn dbs_len(&self) -> usize {
        self.dbs.len()
    }

    /// The database at `index`. Indices come from SELECT, which bounds
    /// checks against [`Server::dbs_len`].
    pub fn db_mut(&mut self, index: usize) -> &mut Db {
        &mut self.dbs[index]
    }

    /// All databases, for FLUSHALL and the expiration cycle.
    pub fn dbs_mut(&mut self) -> &mut [Db] {
        &mut self.dbs
    }

    /// Periodic timer callback body: one slow expiration sweep.
    pub fn cron_tick(&mut self) {
        let expired = self
            .cron
            .run(&mut self.dbs, self.config.hz, SweepMode::Slow, now_ms());
        if expired > 0 {
            self.expired_keys += expired;
            debug!(expired, total = self.expired_keys, "active expiration reclaimed keys");
        }
    }

    /// Pre-wait hook: a fast catch-up sweep, which only does work when
    /// the previous slow cycle was cut short by its budget.
    pub fn before_sleep(&mut self) {
        if self.cron.time_limit_hit() {
            let expired = self
                .cron
                .run(&mut self.dbs, self.config.hz, SweepMode::Fast, now_ms());
            self.expired_keys += expired;
        }
    }

    /// Records one dispatched command.
    pub fn note_command(&mut self) {
        self.commands_processed += 1;
    }

    /// Records one accepted connection.
    pub fn note_connection(&mut self) {
        self.connections_accepted += 1;
    }

    /// Records one keyspace write.
    pub fn note_dirty(&mut self) {
        self.dirty += 1;
    }

    /// Commands dispatched since startup.
    pub fn commands_processed(&self) -> u64 {
        self.commands_processed
    }

    /// Connections accepted since startup.
    pub fn connections_accepted(&self) -> u64 {
        self.connections_accepted
    }

    /// Keyspace writes since startup.
    pub fn dirty(&self) -> u64 {
        self.dirty
    }
}
