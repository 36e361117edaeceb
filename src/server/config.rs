//! Server Configuration
//!
//! A plain value, built once in `main` from the command line and owned
//! by the [`crate::server::Server`]. There is no global configuration
//! state.

use std::time::Duration;

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Number of logical databases (SELECT bound).
    pub databases: usize,
    /// Cron frequency: how many times per second the periodic timer
    /// fires. Also sizes the slow expiration-cycle budget.
    pub hz: u32,
    /// When set, clients must AUTH before any other command.
    pub requirepass: Option<String>,
    /// Whether oversize-request protocol violations close the
    /// connection (framing violations always do).
    pub close_on_protocol_limit: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            databases: 16,
            hz: 10,
            requirepass: None,
            close_on_protocol_limit: true,
        }
    }
}

impl Config {
    /// The listen address as `host:port`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Interval between periodic cron invocations.
    pub fn cron_interval(&self) -> Duration {
        Duration::from_millis(1_000 / u64::from(self.hz.max(1)))
    }
}
