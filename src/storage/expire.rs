//! Active Expiration Cycle
//!
//! Lazy expiration alone leaks memory: a key that expires and is never
//! touched again would sit in the keyspace forever. The active cycle
//! reclaims those keys by randomly probing the expires map of each
//! database on a timer, under a strict time budget so a densely expired
//! keyspace cannot stall the reactor.
//!
//! ## Algorithm
//!
//! One invocation processes up to [`DBS_PER_CALL`] databases, resuming
//! from a persistent round-robin cursor. Per database it samples up to
//! [`SAMPLES_PER_BATCH`] random deadline entries, deletes the ones past
//! due, and repeats the batch as long as more than a quarter of the
//! sample was expired, a sign the database is densely expired and
//! deserves another pass. Two budgets bound the work:
//!
//! - **Slow mode** (the periodic cron): 25% of one cron interval.
//! - **Fast mode** (the pre-wait hook): a fixed 1000 µs.
//!
//! The budget is checked every 16 batches rather than per deletion to
//! keep the clock reads off the hot path. When a cycle is cut short by
//! its budget, the next invocation covers *all* databases regardless of
//! the per-call limit, compensating for the lost coverage.
//!
//! Fast cycles only run after a budget-limited slow cycle and are rate
//! limited to one per twice the fast duration.

use crate::storage::Db;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Maximum number of databases visited per invocation.
pub const DBS_PER_CALL: usize = 16;

/// Number of random deadline entries probed per batch.
pub const SAMPLES_PER_BATCH: usize = 20;

/// Slow-mode budget as a percentage of one cron interval.
pub const SLOW_CYCLE_TIME_PERCENT: u64 = 25;

/// Fast-mode budget.
pub const FAST_CYCLE_DURATION: Duration = Duration::from_micros(1_000);

/// Which budget an invocation runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepMode {
    /// Pre-wait catch-up sweep with a fixed microsecond budget.
    Fast,
    /// Periodic cron sweep with a fraction-of-interval budget.
    Slow,
}

/// Persistent state of the active expiration engine.
#[derive(Debug)]
pub struct ExpirationCycle {
    /// Round-robin database cursor, persists across invocations so a
    /// budget-limited call resumes at the next database.
    cursor: usize,
    /// Whether the previous invocation stopped on its time budget.
    time_limit_hit: bool,
    /// When the last fast cycle started, for rate limiting.
    last_fast_cycle: Option<Instant>,
}

impl Default for ExpirationCycle {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpirationCycle {
    /// Creates the cycle state with the cursor at database 0.
    pub fn new() -> Self {
        Self {
            cursor: 0,
            time_limit_hit: false,
            last_fast_cycle: None,
        }
    }

    /// Whether the previous invocation ran out of budget. The event
    /// loop uses this to decide if a fast catch-up cycle is worthwhile.
    pub fn time_limit_hit(&self) -> bool {
        self.time_limit_hit
    }

    /// Runs one sweep over `dbs` under the budget selected by `mode`.
    ///
    /// `hz` is the cron frequency, used to derive the slow-mode budget.
    /// Returns the number of keys expired by this invocation.
    pub fn run(&mut self, dbs: &mut [Db], hz: u32, mode: SweepMode, now: u64) -> u64 {
        if dbs.is_empty() {
            return 0;
        }

        let start = Instant::now();

        if mode == SweepMode::Fast {
            // Fast cycles are only useful right after a slow cycle was
            // cut short, and never more often than every 2ms.
            if !self.time_limit_hit {
                return 0;
            }
            if let Some(last) = self.last_fast_cycle {
                if start.duration_since(last) < FAST_CYCLE_DURATION * 2 {
                    return 0;
                }
            }
            self.last_fast_cycle = Some(start);
        }

        let mut dbs_to_process = DBS_PER_CALL.min(dbs.len());
        if self.time_limit_hit {
            dbs_to_process = dbs.len();
        }

        let time_limit = match mode {
            SweepMode::Slow => {
                let micros = 1_000_000 * SLOW_CYCLE_TIME_PERCENT / u64::from(hz.max(1)) / 100;
                Duration::from_micros(micros.max(1))
            }
            SweepMode::Fast => FAST_CYCLE_DURATION,
        };

        self.time_limit_hit = false;

        let mut total_expired = 0u64;
        let mut iteration = 0u32;

        for _ in 0..dbs_to_process {
            let index = self.cursor % dbs.len();
            // Advance the cursor first: if the budget runs out inside
            // this database, the next invocation starts at the next one.
            self.cursor = self.cursor.wrapping_add(1);
            let db = &mut dbs[index];

            loop {
                // Nothing scheduled to expire here.
                if db.expires_len() == 0 {
                    break;
                }

                let expired = db.sample_expired(SAMPLES_PER_BATCH, now);
                total_expired += expired as u64;

                iteration += 1;
                if (iteration & 0xf) == 0 && start.elapsed() > time_limit {
                    self.time_limit_hit = true;
                }
                if self.time_limit_hit {
                    debug!(
                        db = index,
                        expired = total_expired,
                        "expiration cycle stopped on time budget"
                    );
                    return total_expired;
                }

                // A mostly-expired sample means this database deserves
                // another batch before we move on.
                if expired <= SAMPLES_PER_BATCH / 4 {
                    break;
                }
            }
        }

        if total_expired > 0 {
            trace!(expired = total_expired, mode = ?mode, "expiration cycle finished");
        }
        total_expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Value;
    use bytes::Bytes;

    fn db_with_expired(id: usize, n: usize) -> Db {
        let mut db = Db::new(id);
        for i in 0..n {
            let key = Bytes::from(format!("key:{}:{}", id, i));
            db.set_key(key.clone(), Value::str("v"));
            db.set_expire(key, 1_000);
        }
        db
    }

    #[test]
    fn test_sweep_drains_all_expired_keys() {
        let mut dbs = vec![db_with_expired(0, 500), db_with_expired(1, 500)];
        let mut cycle = ExpirationCycle::new();

        // Unbounded invocations must eventually leave zero expired
        // entries (liveness).
        let mut guard = 0;
        while dbs.iter().any(|db| db.expires_len() > 0) {
            cycle.run(&mut dbs, 10, SweepMode::Slow, 2_000);
            guard += 1;
            assert!(guard < 10_000, "sweep failed to converge");
        }

        assert!(dbs.iter().all(|db| db.is_empty()));
    }

    #[test]
    fn test_sweep_spares_live_and_persistent_keys() {
        let mut db = db_with_expired(0, 100);
        db.set_key(Bytes::from("persistent"), Value::str("v"));
        db.set_key(Bytes::from("future"), Value::str("v"));
        db.set_expire(Bytes::from("future"), 1_000_000);

        let mut dbs = vec![db];
        let mut cycle = ExpirationCycle::new();
        for _ in 0..100 {
            cycle.run(&mut dbs, 10, SweepMode::Slow, 2_000);
        }

        assert_eq!(dbs[0].len(), 2);
        assert!(dbs[0].contains(b"persistent", 2_000));
        assert!(dbs[0].contains(b"future", 2_000));
    }

    #[test]
    fn test_empty_databases_are_cheap_noops() {
        let mut dbs: Vec<Db> = (0..16).map(Db::new).collect();
        let mut cycle = ExpirationCycle::new();
        assert_eq!(cycle.run(&mut dbs, 10, SweepMode::Slow, 0), 0);
        assert!(!cycle.time_limit_hit());
    }

    #[test]
    fn test_cursor_covers_databases_beyond_per_call_limit() {
        // 20 databases, only 16 visited per call: the cursor must reach
        // the remaining 4 on the next invocation.
        let mut dbs: Vec<Db> = (0..20).map(|id| db_with_expired(id, 10)).collect();
        let mut cycle = ExpirationCycle::new();

        cycle.run(&mut dbs, 10, SweepMode::Slow, 2_000);
        cycle.run(&mut dbs, 10, SweepMode::Slow, 2_000);

        assert!(dbs.iter().all(|db| db.expires_len() == 0));
    }

    #[test]
    fn test_fast_mode_requires_prior_budget_exhaustion() {
        let mut dbs = vec![db_with_expired(0, 100)];
        let mut cycle = ExpirationCycle::new();

        // No slow cycle has hit its budget, so fast mode is a no-op.
        assert_eq!(cycle.run(&mut dbs, 10, SweepMode::Fast, 2_000), 0);
        assert_eq!(dbs[0].expires_len(), 100);
    }
}
