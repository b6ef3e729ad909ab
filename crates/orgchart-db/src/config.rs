//! Connection settings for the tabular store database.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

/// Where the tabular store lives and how many connections to hold open.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Full PostgreSQL connection URL.
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl DbConfig {
    pub const DEFAULT_URL: &str = "postgresql://localhost:5432/orgchart";

    /// Environment variable overriding the configured URL.
    pub const ENV_VAR: &str = "ORGCHART_DATABASE_URL";

    pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    /// Parsed connection options for the configured URL.
    pub fn connect_options(&self) -> Result<PgConnectOptions> {
        PgConnectOptions::from_str(&self.database_url)
            .with_context(|| format!("invalid database URL {:?}", self.redacted()))
    }

    /// Name of the target database.
    pub fn database_name(&self) -> Result<String> {
        self.connect_options()?
            .get_database()
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .with_context(|| format!("database URL {:?} names no database", self.redacted()))
    }

    /// Same server, `postgres` maintenance database. Used to create the
    /// target database when it is missing.
    pub fn maintenance_options(&self) -> Result<PgConnectOptions> {
        Ok(self.connect_options()?.database("postgres"))
    }

    pub fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
    }

    /// `host:port/database`, safe to log (no credentials).
    pub fn redacted(&self) -> String {
        match PgConnectOptions::from_str(&self.database_url) {
            Ok(opts) => format!(
                "{}:{}/{}",
                opts.get_host(),
                opts.get_port(),
                opts.get_database().unwrap_or_default()
            ),
            Err(_) => "<unparseable url>".to_string(),
        }
    }
}
