//! String Commands
//!
//! GET, SET (with EX/PX/NX/XX options), SETNX, SETEX, PSETEX, GETSET,
//! APPEND, STRLEN. All of them go through the lazy-expiring lookup, so
//! a key past its deadline behaves exactly like a missing key.

use crate::commands::{parse_int, NOT_AN_INTEGER, WRONG_TYPE};
use crate::connection::Client;
use crate::server::Server;
use crate::storage::{now_ms, Value};
use bytes::Bytes;

/// GET key
pub fn get(server: &mut Server, client: &mut Client, argv: &[Bytes]) {
    let db = server.db_mut(client.db_index());
    match db.lookup(&argv[1], now_ms()) {
        Some(Value::Str(data)) => {
            let data = data.clone();
            client.reply_bulk(data);
        }
        Some(_) => client.reply_error(WRONG_TYPE),
        None => client.reply_nil(),
    }
}

/// SET key value [EX seconds] [PX milliseconds] [NX|XX]
pub fn set(server: &mut Server, client: &mut Client, argv: &[Bytes]) {
    let mut ttl_ms: Option<i64> = None;
    let mut nx = false;
    let mut xx = false;

    let mut i = 3;
    while i < argv.len() {
        let option = argv[i].to_ascii_uppercase();
        match option.as_slice() {
            b"EX" | b"PX" => {
                i += 1;
                let Some(raw) = argv.get(i).and_then(parse_int) else {
                    client.reply_error("ERR syntax error");
                    return;
                };
                if raw <= 0 {
                    client.reply_error("ERR invalid expire time in 'set' command");
                    return;
                }
                ttl_ms = Some(if option == b"EX" { raw.saturating_mul(1000) } else { raw });
            }
            b"NX" => nx = true,
            b"XX" => xx = true,
            _ => {
                client.reply_error("ERR syntax error");
                return;
            }
        }
        i += 1;
    }

    let now = now_ms();
    let db = server.db_mut(client.db_index());
    let exists = db.contains(&argv[1], now);

    if (nx && exists) || (xx && !exists) {
        client.reply_nil();
        return;
    }

    db.set_key(argv[1].clone(), Value::Str(argv[2].clone()));
    if let Some(ttl) = ttl_ms {
        db.set_expire(argv[1].clone(), now + ttl as u64);
    }
    client.reply_status("OK");
}

/// SETNX key value
pub fn setnx(server: &mut Server, client: &mut Client, argv: &[Bytes]) {
    let now = now_ms();
    let db = server.db_mut(client.db_index());
    if db.contains(&argv[1], now) {
        client.reply_integer(0);
    } else {
        db.set_key(argv[1].clone(), Value::Str(argv[2].clone()));
        client.reply_integer(1);
    }
}

/// SETEX key seconds value
pub fn setex(server: &mut Server, client: &mut Client, argv: &[Bytes]) {
    generic_setex(server, client, argv, 1_000, "setex");
}

/// PSETEX key milliseconds value
pub fn psetex(server: &mut Server, client: &mut Client, argv: &[Bytes]) {
    generic_setex(server, client, argv, 1, "psetex");
}

/// Shared implementation of SETEX and PSETEX; `unit_ms` converts the
/// argument into milliseconds.
fn generic_setex(
    server: &mut Server,
    client: &mut Client,
    argv: &[Bytes],
    unit_ms: i64,
    name: &str,
) {
    let Some(ttl) = parse_int(&argv[2]) else {
        client.reply_error(NOT_AN_INTEGER);
        return;
    };
    if ttl <= 0 {
        client.reply_error(format!("ERR invalid expire time in '{}' command", name));
        return;
    }

    let deadline = now_ms() + ttl.saturating_mul(unit_ms) as u64;
    let db = server.db_mut(client.db_index());
    db.set_key(argv[1].clone(), Value::Str(argv[3].clone()));
    db.set_expire(argv[1].clone(), deadline);
    client.reply_status("OK");
}

/// GETSET key value
pub fn getset(server: &mut Server, client: &mut Client, argv: &[Bytes]) {
    let now = now_ms();
    let db = server.db_mut(client.db_index());

    let previous = match db.lookup(&argv[1], now) {
        Some(Value::Str(data)) => Some(data.clone()),
        Some(_) => {
            client.reply_error(WRONG_TYPE);
            return;
        }
        None => None,
    };

    db.set_key(argv[1].clone(), Value::Str(argv[2].clone()));
    match previous {
        Some(data) => client.reply_bulk(data),
        None => client.reply_nil(),
    }
}

/// APPEND key value
pub fn append(server: &mut Server, client: &mut Client, argv: &[Bytes]) {
    let now = now_ms();
    let db = server.db_mut(client.db_index());

    if !db.contains(&argv[1], now) {
        // APPEND to a missing key creates it, with no deadline.
        let len = argv[2].len();
        db.set_key(argv[1].clone(), Value::Str(argv[2].clone()));
        client.reply_integer(len as i64);
        return;
    }

    match db.lookup_mut(&argv[1], now) {
        Some(Value::Str(data)) => {
            let mut combined = Vec::with_capacity(data.len() + argv[2].len());
            combined.extend_from_slice(data);
            combined.extend_from_slice(&argv[2]);
            let len = combined.len();
            *data = Bytes::from(combined);
            client.reply_integer(len as i64);
        }
        _ => client.reply_error(WRONG_TYPE),
    }
}

/// STRLEN key
pub fn strlen(server: &mut Server, client: &mut Client, argv: &[Bytes]) {
    let db = server.db_mut(client.db_index());
    match db.lookup(&argv[1], now_ms()) {
        Some(Value::Str(data)) => {
            let len = data.len();
            client.reply_integer(len as i64);
        }
        Some(_) => client.reply_error(WRONG_TYPE),
        None => client.reply_integer(0),
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::test_util::{output, run, setup};
    use crate::storage::{now_ms, Value};
    use bytes::Bytes;
    use std::collections::VecDeque;

    #[test]
    fn test_set_then_get() {
        let (mut server, mut client) = setup();
        run(&mut server, &mut client, &["SET", "name", "flint"]);
        assert_eq!(output(&mut client), b"+OK\r\n");

        run(&mut server, &mut client, &["GET", "name"]);
        assert_eq!(output(&mut client), b"$5\r\nflint\r\n");
    }

    #[test]
    fn test_get_missing_key_is_nil() {
        let (mut server, mut client) = setup();
        run(&mut server, &mut client, &["GET", "missing"]);
        assert_eq!(output(&mut client), b"$-1\r\n");
    }

    #[test]
    fn test_set_overwrites_and_clears_ttl() {
        let (mut server, mut client) = setup();
        run(&mut server, &mut client, &["SET", "k", "v1", "EX", "100"]);
        run(&mut server, &mut client, &["SET", "k", "v2"]);
        output(&mut client);

        run(&mut server, &mut client, &["TTL", "k"]);
        assert_eq!(output(&mut client), b":-1\r\n");
    }

    #[test]
    fn test_set_nx_and_xx() {
        let (mut server, mut client) = setup();

        // XX on a missing key fails.
        run(&mut server, &mut client, &["SET", "k", "v", "XX"]);
        assert_eq!(output(&mut client), b"$-1\r\n");

        // NX on a missing key succeeds.
        run(&mut server, &mut client, &["SET", "k", "v", "NX"]);
        assert_eq!(output(&mut client), b"+OK\r\n");

        // NX on an existing key fails.
        run(&mut server, &mut client, &["SET", "k", "v2", "NX"]);
        assert_eq!(output(&mut client), b"$-1\r\n");
    }

    #[test]
    fn test_set_rejects_bad_expire() {
        let (mut server, mut client) = setup();
        run(&mut server, &mut client, &["SET", "k", "v", "EX", "0"]);
        assert_eq!(
            output(&mut client),
            b"-ERR invalid expire time in 'set' command\r\n"
        );

        run(&mut server, &mut client, &["SET", "k", "v", "EX", "abc"]);
        assert_eq!(output(&mut client), b"-ERR syntax error\r\n");
    }

    #[test]
    fn test_setnx() {
        let (mut server, mut client) = setup();
        run(&mut server, &mut client, &["SETNX", "k", "v"]);
        assert_eq!(output(&mut client), b":1\r\n");
        run(&mut server, &mut client, &["SETNX", "k", "other"]);
        assert_eq!(output(&mut client), b":0\r\n");

        run(&mut server, &mut client, &["GET", "k"]);
        assert_eq!(output(&mut client), b"$1\r\nv\r\n");
    }

    #[test]
    fn test_setex_sets_deadline() {
        let (mut server, mut client) = setup();
        run(&mut server, &mut client, &["SETEX", "k", "100", "v"]);
        assert_eq!(output(&mut client), b"+OK\r\n");

        let deadline = server.db_mut(0).expire_deadline(b"k", now_ms());
        assert!(deadline.is_some());
    }

    #[test]
    fn test_setex_rejects_nonpositive_ttl() {
        let (mut server, mut client) = setup();
        run(&mut server, &mut client, &["SETEX", "k", "0", "v"]);
        assert_eq!(
            output(&mut client),
            b"-ERR invalid expire time in 'setex' command\r\n"
        );
        run(&mut server, &mut client, &["PSETEX", "k", "-5", "v"]);
        assert_eq!(
            output(&mut client),
            b"-ERR invalid expire time in 'psetex' command\r\n"
        );
    }

    #[test]
    fn test_getset_returns_previous_value() {
        let (mut server, mut client) = setup();
        run(&mut server, &mut client, &["GETSET", "k", "first"]);
        assert_eq!(output(&mut client), b"$-1\r\n");
        run(&mut server, &mut client, &["GETSET", "k", "second"]);
        assert_eq!(output(&mut client), b"$5\r\nfirst\r\n");
    }

    #[test]
    fn test_append_and_strlen() {
        let (mut server, mut client) = setup();
        run(&mut server, &mut client, &["APPEND", "k", "Hello"]);
        assert_eq!(output(&mut client), b":5\r\n");
        run(&mut server, &mut client, &["APPEND", "k", " World"]);
        assert_eq!(output(&mut client), b":11\r\n");
        run(&mut server, &mut client, &["STRLEN", "k"]);
        assert_eq!(output(&mut client), b":11\r\n");
        run(&mut server, &mut client, &["STRLEN", "missing"]);
        assert_eq!(output(&mut client), b":0\r\n");
    }

    #[test]
    fn test_wrong_type_is_rejected_without_mutation() {
        let (mut server, mut client) = setup();
        server
            .db_mut(0)
            .set_key(Bytes::from("queue"), Value::List(VecDeque::new()));

        run(&mut server, &mut client, &["GET", "queue"]);
        assert_eq!(
            output(&mut client),
            b"-WRONGTYPE Operation against a key holding the wrong kind of value\r\n"
        );
        run(&mut server, &mut client, &["APPEND", "queue", "x"]);
        assert!(output(&mut client).starts_with(b"-WRONGTYPE"));

        // The list value is untouched.
        let value = server.db_mut(0).lookup(b"queue", now_ms()).unwrap();
        assert_eq!(value, &Value::List(VecDeque::new()));
    }
}
