//! Generic Key Commands
//!
//! DEL, EXISTS, the EXPIRE family, TTL/PTTL, PERSIST and TYPE. The four
//! EXPIRE variants share one implementation parameterized by time base
//! and unit: relative variants pass "now" as the base, absolute (*AT)
//! variants pass zero.

use crate::commands::{parse_int, NOT_AN_INTEGER};
use crate::connection::Client;
use crate::server::Server;
use crate::storage::now_ms;
use bytes::Bytes;

/// DEL key [key ...]
pub fn del(server: &mut Server, client: &mut Client, argv: &[Bytes]) {
    let now = now_ms();
    let db = server.db_mut(client.db_index());
    let removed = argv[1..].iter().filter(|key| db.remove(key, now)).count();
    client.reply_integer(removed as i64);
}

/// EXISTS key [key ...]
pub fn exists(server: &mut Server, client: &mut Client, argv: &[Bytes]) {
    let now = now_ms();
    let db = server.db_mut(client.db_index());
    let found = argv[1..].iter().filter(|key| db.contains(key, now)).count();
    client.reply_integer(found as i64);
}

/// EXPIRE key seconds
pub fn expire(server: &mut Server, client: &mut Client, argv: &[Bytes]) {
    let now = now_ms();
    generic_expire(server, client, argv, now, 1_000);
}

/// PEXPIRE key milliseconds
pub fn pexpire(server: &mut Server, client: &mut Client, argv: &[Bytes]) {
    let now = now_ms();
    generic_expire(server, client, argv, now, 1);
}

/// EXPIREAT key unix-seconds
pub fn expireat(server: &mut Server, client: &mut Client, argv: &[Bytes]) {
    generic_expire(server, client, argv, 0, 1_000);
}

/// PEXPIREAT key unix-milliseconds
pub fn pexpireat(server: &mut Server, client: &mut Client, argv: &[Bytes]) {
    generic_expire(server, client, argv, 0, 1);
}

/// Shared implementation of the EXPIRE family.
///
/// `base_ms` is "now" for the relative variants and 0 for the absolute
/// ones; `unit_ms` converts the argument into milliseconds. A deadline
/// at or before now deletes the key immediately; scheduling a
/// past deadline would leave a key that every lookup sees as dead but
/// that still occupies memory until the active sweep finds it.
fn generic_expire(
    server: &mut Server,
    client: &mut Client,
    argv: &[Bytes],
    base_ms: u64,
    unit_ms: i64,
) {
    let Some(raw) = parse_int(&argv[2]) else {
        client.reply_error(NOT_AN_INTEGER);
        return;
    };

    let now = now_ms();
    let deadline = base_ms.saturating_add_signed(raw.saturating_mul(unit_ms));
    let db = server.db_mut(client.db_index());

    if !db.contains(&argv[1], now) {
        client.reply_integer(0);
        return;
    }

    if deadline <= now {
        db.remove(&argv[1], now);
    } else {
        db.set_expire(argv[1].clone(), deadline);
    }
    client.reply_integer(1);
}

/// TTL key
pub fn ttl(server: &mut Server, client: &mut Client, argv: &[Bytes]) {
    generic_ttl(server, client, argv, true);
}

/// PTTL key
pub fn pttl(server: &mut Server, client: &mut Client, argv: &[Bytes]) {
    generic_ttl(server, client, argv, false);
}

/// Shared implementation of TTL and PTTL: -2 for a missing key, -1 for
/// a persistent key, otherwise the remaining time (seconds rounded up,
/// or milliseconds).
fn generic_ttl(server: &mut Server, client: &mut Client, argv: &[Bytes], seconds: bool) {
    let now = now_ms();
    let db = server.db_mut(client.db_index());

    if !db.contains(&argv[1], now) {
        client.reply_integer(-2);
        return;
    }

    match db.expire_deadline(&argv[1], now) {
        None => client.reply_integer(-1),
        Some(deadline) => {
            let remaining_ms = deadline - now;
            let remaining = if seconds {
                (remaining_ms + 999) / 1_000
            } else {
                remaining_ms
            };
            client.reply_integer(remaining as i64);
        }
    }
}

/// PERSIST key
pub fn persist(server: &mut Server, client: &mut Client, argv: &[Bytes]) {
    let now = now_ms();
    let db = server.db_mut(client.db_index());

    if db.contains(&argv[1], now) && db.remove_expire(&argv[1]) {
        client.reply_integer(1);
    } else {
        client.reply_integer(0);
    }
}

/// TYPE key
pub fn key_type(server: &mut Server, client: &mut Client, argv: &[Bytes]) {
    let db = server.db_mut(client.db_index());
    let name = db
        .lookup(&argv[1], now_ms())
        .map(|value| value.type_name())
        .unwrap_or("none");
    client.reply_status(name);
}
