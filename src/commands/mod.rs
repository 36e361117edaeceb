//! Command Table and Dispatch
//!
//! Decoded argument vectors are bound to handlers through a static
//! table of [`CommandSpec`] entries. Dispatch performs, in order:
//!
//! 1. case-insensitive lookup (unknown name → error reply);
//! 2. arity verification (positive arity = exact argument count
//!    including the command name, negative = at least that many);
//! 3. the authentication gate (with a configured password, an
//!    unauthenticated client may only run commands carrying the `s`
//!    flag, i.e. AUTH);
//! 4. synchronous handler invocation.
//!
//! Handlers run to completion before the next command is decoded from
//! the same connection, and the whole server runs on one thread, so
//! every keyspace mutation inside a handler is atomic with respect to
//! all other connections.
//!
//! All dispatch-level failures are error *replies*; the connection
//! stays open and the decoder keeps its position.
//!
//! ## Flags
//!
//! - `r`: reads the keyspace
//! - `w`: writes the keyspace (bumps the dirty counter consumed by
//!   snapshot scheduling)
//! - `a`: administrative
//! - `l`: allowed while a snapshot is loading
//! - `s`: allowed before authentication

pub mod key;
pub mod server;
pub mod string;

use crate::connection::Client;
use crate::server::Server;
use bytes::Bytes;
use std::collections::HashMap;

/// A command handler. Receives the server context, the issuing client,
/// and the full argument vector (`argv[0]` is the command name).
pub type CommandHandler = fn(&mut Server, &mut Client, &[Bytes]);

/// Immutable metadata for one command.
#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    /// Lowercase command name.
    pub name: &'static str,
    /// Positive: exact argument count. Negative: minimum count.
    pub arity: i32,
    /// Capability flags, see the module docs.
    pub flags: &'static str,
    /// The handler function.
    pub handler: CommandHandler,
}

impl CommandSpec {
    /// Whether this command carries `flag`.
    pub fn has_flag(&self, flag: char) -> bool {
        self.flags.contains(flag)
    }
}

/// Every command the server understands. Immutable after startup.
static COMMANDS: &[CommandSpec] = &[
    // String commands
    CommandSpec { name: "get", arity: 2, flags: "r", handler: string::get },
    CommandSpec { name: "set", arity: -3, flags: "w", handler: string::set },
    CommandSpec { name: "setnx", arity: 3, flags: "w", handler: string::setnx },
    CommandSpec { name: "setex", arity: 4, flags: "w", handler: string::setex },
    CommandSpec { name: "psetex", arity: 4, flags: "w", handler: string::psetex },
    CommandSpec { name: "getset", arity: 3, flags: "w", handler: string::getset },
    CommandSpec { name: "append", arity: 3, flags: "w", handler: string::append },
    CommandSpec { name: "strlen", arity: 2, flags: "r", handler: string::strlen },
    // Key commands
    CommandSpec { name: "del", arity: -2, flags: "w", handler: key::del },
    CommandSpec { name: "exists", arity: -2, flags: "r", handler: key::exists },
    CommandSpec { name: "expire", arity: 3, flags: "w", handler: key::expire },
    CommandSpec { name: "pexpire", arity: 3, flags: "w", handler: key::pexpire },
    CommandSpec { name: "expireat", arity: 3, flags: "w", handler: key::expireat },
    CommandSpec { name: "pexpireat", arity: 3, flags: "w", handler: key::pexpireat },
    CommandSpec { name: "ttl", arity: 2, flags: "r", handler: key::ttl },
    CommandSpec { name: "pttl", arity: 2, flags: "r", handler: key::pttl },
    CommandSpec { name: "persist", arity: 2, flags: "w", handler: key::persist },
    CommandSpec { name: "type", arity: 2, flags: "r", handler: key::key_type },
    // Connection commands
    CommandSpec { name: "ping", arity: -1, flags: "rl", handler: server::ping },
    CommandSpec { name: "echo", arity: 2, flags: "r", handler: server::echo },
    CommandSpec { name: "select", arity: 2, flags: "rl", handler: server::select },
    CommandSpec { name: "auth", arity: 2, flags: "rsl", handler: server::auth },
    CommandSpec { name: "quit", arity: 1, flags: "r", handler: server::quit },
    // Server commands
    CommandSpec { name: "dbsize", arity: 1, flags: "r", handler: server::dbsize },
    CommandSpec { name: "flushdb", arity: 1, flags: "w", handler: server::flushdb },
    CommandSpec { name: "flushall", arity: 1, flags: "w", handler: server::flushall },
    CommandSpec { name: "time", arity: 1, flags: "rl", handler: server::time },
];

/// Case-insensitive name → spec index, built once at startup.
#[derive(Debug)]
pub struct CommandTable {
    index: HashMap<&'static str, &'static CommandSpec>,
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandTable {
    /// Builds the lookup index over the static command list.
    pub fn new() -> Self {
        let index = COMMANDS.iter().map(|spec| (spec.name, spec)).collect();
        Self { index }
    }

    /// Looks up a command by name, case-insensitively.
    pub fn lookup(&self, name: &str) -> Option<&'static CommandSpec> {
        self.index.get(name.to_ascii_lowercase().as_str()).copied()
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the table is empty (never, in practice).
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Runs one decoded command against the server.
///
/// An empty argument vector (blank inline line, `*0` header) is
/// silently ignored.
pub fn dispatch(server: &mut Server, client: &mut Client, argv: &[Bytes]) {
    let Some(first) = argv.first() else {
        return;
    };
    let name = String::from_utf8_lossy(first).into_owned();

    let Some(spec) = server.commands().lookup(&name) else {
        client.reply_error(format!("ERR unknown command '{}'", name));
        return;
    };

    let argc = argv.len() as i32;
    if (spec.arity > 0 && argc != spec.arity) || argc < -spec.arity {
        client.reply_error(format!(
            "ERR wrong number of arguments for '{}' command",
            spec.name
        ));
        return;
    }

    if server.config().requirepass.is_some()
        && !client.is_authenticated()
        && !spec.has_flag('s')
    {
        client.reply_error("NOAUTH Authentication required.");
        return;
    }

    (spec.handler)(server, client, argv);

    server.note_command();
    if spec.has_flag('w') {
        server.note_dirty();
    }
}

/// Parses an argument as a signed 64-bit integer.
///
/// Handlers turn a `None` into the canonical
/// `ERR value is not an integer or out of range` reply.
pub(crate) fn parse_int(arg: &Bytes) -> Option<i64> {
    std::str::from_utf8(arg).ok()?.parse().ok()
}

/// The canonical not-an-integer error reply.
pub(crate) const NOT_AN_INTEGER: &str = "ERR value is not an integer or out of range";

/// The canonical wrong-type error reply.
pub(crate) const WRONG_TYPE: &str =
    "WRONGTYPE Operation against a key holding the wrong kind of value";


#[cfg(test)]
mod tests {
    use super::test_util::{output, run, setup};
    use super::*;
    use crate::server::Config;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let table = CommandTable::new();
        assert_eq!(table.lookup("GET").unwrap().name, "get");
        assert_eq!(table.lookup("get").unwrap().name, "get");
        assert_eq!(table.lookup("GeT").unwrap().name, "get");
        assert!(table.lookup("nosuchcommand").is_none());
    }

    #[test]
    fn test_unknown_command_is_reply_not_teardown() {
        let (mut server, mut client) = setup();
        run(&mut server, &mut client, &["FOOBAR"]);
        assert_eq!(output(&mut client), b"-ERR unknown command 'FOOBAR'\r\n");

        // The connection stays usable.
        run(&mut server, &mut client, &["PING"]);
        assert_eq!(output(&mut client), b"+PONG\r\n");
        assert!(!client.should_close());
    }

    #[test]
    fn test_exact_arity_violation() {
        let (mut server, mut client) = setup();
        run(&mut server, &mut client, &["GET"]);
        assert_eq!(
            output(&mut client),
            b"-ERR wrong number of arguments for 'get' command\r\n"
        );
    }

    #[test]
    fn test_minimum_arity_violation() {
        let (mut server, mut client) = setup();
        run(&mut server, &mut client, &["SET", "k"]);
        assert_eq!(
            output(&mut client),
            b"-ERR wrong number of arguments for 'set' command\r\n"
        );

        // At-least arities accept more arguments than the minimum.
        run(&mut server, &mut client, &["SET", "k", "v"]);
        assert_eq!(output(&mut client), b"+OK\r\n");
    }

    #[test]
    fn test_empty_argv_is_ignored() {
        let (mut server, mut client) = setup();
        dispatch(&mut server, &mut client, &[]);
        assert!(output(&mut client).is_empty());
    }

    #[test]
    fn test_auth_gate_blocks_until_authenticated() {
        let config = Config {
            requirepass: Some("sesame".to_string()),
            ..Config::default()
        };
        let mut server = Server::new(config);
        let mut client = Client::new();

        run(&mut server, &mut client, &["GET", "k"]);
        assert_eq!(output(&mut client), b"-NOAUTH Authentication required.\r\n");

        run(&mut server, &mut client, &["AUTH", "wrong"]);
        assert_eq!(output(&mut client), b"-ERR invalid password\r\n");
        assert!(!client.is_authenticated());

        run(&mut server, &mut client, &["AUTH", "sesame"]);
        assert_eq!(output(&mut client), b"+OK\r\n");
        assert!(client.is_authenticated());

        run(&mut server, &mut client, &["GET", "k"]);
        assert_eq!(output(&mut client), b"$-1\r\n");
    }

    #[test]
    fn test_write_commands_bump_dirty_counter() {
        let (mut server, mut client) = setup();
        let before = server.dirty();
        run(&mut server, &mut client, &["SET", "k", "v"]);
        run(&mut server, &mut client, &["GET", "k"]);
        assert_eq!(server.dirty(), before + 1);
    }
}
