//! flintkv server entry point: parses arguments, sets up logging,
//! builds the server context and runs the reactor.

use flintkv::reactor::EventLoop;
use flintkv::server::{Config, Server};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Parses configuration from command-line arguments.
fn config_from_args() -> Config {
    let mut config = Config::default();
    let args: Vec<String> = std::env::args().collect();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--host" | "-h" => {
                config.host = take_value(&args, &mut i, "--host");
            }
            "--port" | "-p" => {
                config.port = take_value(&args, &mut i, "--port").parse().unwrap_or_else(|_| {
                    eprintln!("Error: invalid port number");
                    std::process::exit(1);
                });
            }
            "--databases" => {
                config.databases =
                    take_value(&args, &mut i, "--databases").parse().unwrap_or_else(|_| {
                        eprintln!("Error: invalid database count");
                        std::process::exit(1);
                    });
            }
            "--hz" => {
                config.hz = take_value(&args, &mut i, "--hz").parse().unwrap_or_else(|_| {
                    eprintln!("Error: invalid hz value");
                    std::process::exit(1);
                });
            }
            "--requirepass" => {
                config.requirepass = Some(take_value(&args, &mut i, "--requirepass"));
            }
            "--lenient-protocol-limits" => {
                config.close_on_protocol_limit = false;
            }
            "--help" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-v" => {
                println!("flintkv version {}", flintkv::VERSION);
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    config
}

/// Returns the value following an option, exiting with a usage error if
/// it is missing.
fn take_value(args: &[String], i: &mut usize, option: &str) -> String {
    *i += 1;
    match args.get(*i) {
        Some(value) => value.clone(),
        None => {
            eprintln!("Error: {} requires a value", option);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"
flintkv - A Reactor-Driven In-Memory Key-Value Server

USAGE:
    flintkv [OPTIONS]

OPTIONS:
    -h, --host <HOST>             Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>             Port to listen on (default: 6379)
        --databases <N>           Number of logical databases (default: 16)
        --hz <N>                  Cron frequency per second (default: 10)
        --requirepass <PASSWORD>  Require AUTH before other commands
        --lenient-protocol-limits Keep connections open on oversize requests
    -v, --version                 Print version information
        --help                    Print this help message

CONNECTING:
    Use redis-cli or any Redis client:
    $ redis-cli -p 6379
    127.0.0.1:6379> PING
    PONG
"#
    );
}

fn main() -> anyhow::Result<()> {
    let config = config_from_args();

    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let mut event_loop = EventLoop::bind(&config.bind_address())?;
    info!(addr = %config.bind_address(), "listening");

    let mut server = Server::new(config);
    info!(
        databases = server.dbs_len(),
        commands = server.commands().len(),
        "server context initialized"
    );

    // The periodic cron: active expiration on a fixed interval.
    let interval = server.config().cron_interval();
    event_loop.schedule(interval, move |server| {
        server.cron_tick();
        Some(server.config().cron_interval())
    });

    event_loop.run(&mut server)?;
    Ok(())
}
