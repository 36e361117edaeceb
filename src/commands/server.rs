//! Connection and Server Commands
//!
//! PING, ECHO, SELECT, AUTH, QUIT, DBSIZE, FLUSHDB, FLUSHALL, TIME.

use crate::connection::Client;
use crate::protocol::Reply;
use crate::server::Server;
use bytes::Bytes;
use std::time::{SystemTime, UNIX_EPOCH};

/// PING [message]
pub fn ping(_server: &mut Server, client: &mut Client, argv: &[Bytes]) {
    match argv.get(1) {
        Some(message) => {
            let message = message.clone();
            client.reply_bulk(message);
        }
        None => client.reply(&Reply::pong()),
    }
}

/// ECHO message
pub fn echo(_server: &mut Server, client: &mut Client, argv: &[Bytes]) {
    client.reply_bulk(argv[1].clone());
}

/// SELECT index
pub fn select(server: &mut Server, client: &mut Client, argv: &[Bytes]) {
    let index = match std::str::from_utf8(&argv[1]).ok().and_then(|s| s.parse::<usize>().ok()) {
        Some(index) if index < server.dbs_len() => index,
        _ => {
            client.reply_error("ERR invalid DB index");
            return;
        }
    };
    client.select_db(index);
    client.reply_status("OK");
}

/// AUTH password
pub fn auth(server: &mut Server, client: &mut Client, argv: &[Bytes]) {
    match &server.config().requirepass {
        None => {
            client.reply_error("ERR Client sent AUTH, but no password is set.");
        }
        Some(password) if password.as_bytes() == &argv[1][..] => {
            client.set_authenticated(true);
            client.reply_status("OK");
        }
        Some(_) => {
            client.set_authenticated(false);
            client.reply_error("ERR invalid password");
        }
    }
}

/// QUIT: reply OK, then close once the reply is flushed.
pub fn quit(_server: &mut Server, client: &mut Client, _argv: &[Bytes]) {
    client.reply_status("OK");
    client.mark_close();
}

/// DBSIZE
pub fn dbsize(server: &mut Server, client: &mut Client, _argv: &[Bytes]) {
    let len = server.db_mut(client.db_index()).len();
    client.reply_integer(len as i64);
}

/// FLUSHDB
pub fn flushdb(server: &mut Server, client: &mut Client, _argv: &[Bytes]) {
    server.db_mut(client.db_index()).clear();
    client.reply_status("OK");
}

/// FLUSHALL
pub fn flushall(server: &mut Server, client: &mut Client, _argv: &[Bytes]) {
    for db in server.dbs_mut() {
        db.clear();
    }
    client.reply_status("OK");
}

/// TIME: unix seconds and the microsecond remainder, as two bulks.
pub fn time(_server: &mut Server, client: &mut Client, _argv: &[Bytes]) {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    client.reply_multi_bulk(vec![
        Reply::bulk(now.as_secs().to_string()),
        Reply::bulk(now.subsec_micros().to_string()),
    ]);
}
