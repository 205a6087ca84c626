//! Process configuration: command-line flags with environment fallbacks.

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, Subcommand};

use stockhold_observability::LogFormat;

#[derive(Debug, Clone, Parser)]
#[command(name = "stockhold-api", version, about = "Inventory reservation and order service")]
pub struct Config {
    /// Address the HTTP server listens on.
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: SocketAddr,

    /// Postgres connection string. Without it an in-memory store is used.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 10)]
    pub db_max_connections: u32,

    /// Upper bound on waiting for a row lock.
    #[arg(long, env = "LOCK_TIMEOUT_MS", default_value_t = 5_000)]
    pub lock_timeout_ms: u64,

    /// Seconds between reclamation passes; 0 disables the in-process scheduler.
    #[arg(long, env = "RECLAIM_INTERVAL_SECS", default_value_t = 60)]
    pub reclaim_interval_secs: u64,

    /// `json` or `pretty`.
    #[arg(long, env = "LOG_FORMAT", default_value = "json")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Run one reclamation pass and exit.
    ReclaimExpired,
}

impl Config {
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Serve)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn reclaim_interval(&self) -> Option<Duration> {
        (self.reclaim_interval_secs > 0).then(|| Duration::from_secs(self.reclaim_interval_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_parse_with_defaults() {
        let cfg = Config::try_parse_from([
            "stockhold-api",
            "--bind-addr",
            "127.0.0.1:9000",
            "--reclaim-interval-secs",
            "0",
            "--log-format",
            "pretty",
        ])
        .unwrap();
        assert_eq!(cfg.bind_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(cfg.reclaim_interval(), None);
        assert_eq!(cfg.log_format, LogFormat::Pretty);
        assert_eq!(cfg.command(), Command::Serve);
    }

    #[test]
    fn reclaim_subcommand_is_recognised() {
        let cfg = Config::try_parse_from([
            "stockhold-api",
            "--lock-timeout-ms",
            "250",
            "reclaim-expired",
        ])
        .unwrap();
        assert_eq!(cfg.command(), Command::ReclaimExpired);
        assert_eq!(cfg.lock_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        assert!(Config::try_parse_from(["stockhold-api", "--log-format", "xml"]).is_err());
    }
}
