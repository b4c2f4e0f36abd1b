//! Configuration management for the ticketing service.
//!
//! Loads configuration from environment variables with sensible defaults.
//! [`Config::from_lookup`] takes any key lookup so tests can supply values
//! without touching the process environment.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Booking store configuration
    pub database: DatabaseConfig,
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Payment processor configuration
    pub payments: PaymentsConfig,
    /// Reservation lifecycle configuration
    pub booking: BookingConfig,
}

/// `PostgreSQL` configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL. Required unless the server is built with
    /// the `in-memory-store` feature.
    pub url: Option<String>,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Apply embedded migrations on startup
    pub run_migrations: bool,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    Pretty,
    /// One JSON object per line
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Log output format
    pub log_format: LogFormat,
    /// Prometheus scrape port, `0` disables the exporter
    pub metrics_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
}

/// Payment processor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentsConfig {
    /// Base URL of the processor API
    pub api_base: String,
    /// Secret API key
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Webhook endpoint signing secret
    #[serde(skip_serializing)]
    pub webhook_secret: Option<String>,
    /// Accepted webhook timestamp skew in seconds
    pub webhook_tolerance: u64,
    /// Processor request timeout in seconds
    pub request_timeout: u64,
}

/// Reservation lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfig {
    /// Seconds a pending reservation may wait for payment, `0` keeps them forever
    pub pending_ttl: u64,
    /// Seconds between expiry sweeps
    pub reclaim_interval: u64,
    /// Retries of a contended unit of work
    pub max_retries: u32,
}

impl BookingConfig {
    /// Pending expiry, `None` when disabled.
    #[must_use]
    pub fn pending_ttl(&self) -> Option<chrono::Duration> {
        if self.pending_ttl == 0 {
            return None;
        }
        i64::try_from(self.pending_ttl)
            .ok()
            .and_then(chrono::Duration::try_seconds)
    }

    /// Interval between expiry sweeps.
    #[must_use]
    pub const fn reclaim_interval(&self) -> Duration {
        Duration::from_secs(self.reclaim_interval)
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| lookup(key).filter(|raw| !raw.trim().is_empty());
        let parsed = |key: &str| Raw(lookup(key));

        Self {
            database: DatabaseConfig {
                url: text("DATABASE_URL"),
                max_connections: parsed("DATABASE_MAX_CONNECTIONS").or(10),
                run_migrations: parsed("DATABASE_RUN_MIGRATIONS").or(true),
            },
            server: ServerConfig {
                host: text("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parsed("PORT").or(8080),
                log_format: lookup("LOG_FORMAT")
                    .and_then(|raw| raw.parse().ok())
                    .unwrap_or(LogFormat::Pretty),
                metrics_port: parsed("METRICS_PORT").or(9090),
                shutdown_timeout: parsed("SHUTDOWN_TIMEOUT").or(30),
            },
            payments: PaymentsConfig {
                api_base: text("PAYMENTS_API_BASE")
                    .unwrap_or_else(|| "https://api.stripe.com".to_string()),
                api_key: text("STRIPE_SECRET_KEY"),
                webhook_secret: text("STRIPE_WEBHOOK_SECRET"),
                webhook_tolerance: parsed("STRIPE_WEBHOOK_TOLERANCE").or(300),
                request_timeout: parsed("PAYMENTS_REQUEST_TIMEOUT").or(10),
            },
            booking: BookingConfig {
                pending_ttl: parsed("PENDING_TTL_SECONDS").or(1800),
                reclaim_interval: parsed("RECLAIM_INTERVAL_SECONDS").or(60),
                max_retries: parsed("BOOKING_MAX_RETRIES").or(5),
            },
        }
    }
}

/// Raw variable value awaiting a typed parse.
struct Raw(Option<String>);

impl Raw {
    fn or<T: FromStr>(self, default: T) -> T {
        self.0
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config(&[]);
        assert!(config.database.url.is_none());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.log_format, LogFormat::Pretty);
        assert_eq!(config.payments.webhook_tolerance, 300);
        assert_eq!(config.booking.pending_ttl(), Some(chrono::Duration::minutes(30)));
    }

    #[test]
    fn values_are_read_and_bad_ones_ignored() {
        let config = config(&[
            ("DATABASE_URL", "postgres://localhost/ticketing"),
            ("PORT", "not-a-port"),
            ("LOG_FORMAT", "JSON"),
            ("METRICS_PORT", "0"),
            ("PENDING_TTL_SECONDS", "0"),
            ("STRIPE_WEBHOOK_SECRET", "whsec_abc"),
        ]);
        assert_eq!(config.database.url.as_deref(), Some("postgres://localhost/ticketing"));
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.log_format, LogFormat::Json);
        assert_eq!(config.server.metrics_port, 0);
        assert_eq!(config.booking.pending_ttl(), None);
        assert_eq!(config.payments.webhook_secret.as_deref(), Some("whsec_abc"));
    }

    #[test]
    fn blank_database_url_means_in_memory() {
        let config = config(&[("DATABASE_URL", "  ")]);
        assert!(config.database.url.is_none());
    }
}
