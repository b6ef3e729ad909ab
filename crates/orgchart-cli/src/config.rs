//! Configuration file management for orgchart.
//!
//! Provides a TOML-based config file at `~/.config/orgchart/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use orgchart_core::permission::Caller;
use orgchart_core::settings::{PermissionSettings, PlanSettings, Settings, ShareSettings};
use orgchart_db::config::DbConfig;

/// Env var overriding `server.base_url`.
pub const BASE_URL_ENV: &str = "ORGCHART_BASE_URL";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    pub server: ServerSection,
    pub auth: AuthSection,
    pub plans: PlansSection,
    pub share: ShareSection,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: DbConfig::DEFAULT_URL.to_string(),
            max_connections: DbConfig::DEFAULT_MAX_CONNECTIONS,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
    pub port: u16,
    /// Public entry URL share links point at. Derived from bind/port if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Trusted header carrying the caller's email, set by the fronting proxy.
    pub identity_header: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
            base_url: None,
            identity_header: "x-forwarded-email".to_string(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    /// Owner recorded when the permission table is first created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap_owner: Option<String>,
    /// Identity the operator commands (`user`, `share`, `plan delete`) run as.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator_email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PlansSection {
    pub cache_ttl_secs: u64,
    pub enforce_tree_integrity: bool,
}

impl Default for PlansSection {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            enforce_tree_integrity: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareSection {
    pub ttl_hours: i64,
}

impl Default for ShareSection {
    fn default() -> Self {
        Self { ttl_hours: 24 }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the orgchart config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/orgchart` or `~/.config/orgchart`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("orgchart");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("orgchart")
}

/// Return the path to the orgchart config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. `Ok(None)` when it does not exist.
pub fn load_config() -> Result<Option<ConfigFile>> {
    let path = config_path();
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(Some(config))
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    // Owner read/write only.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub identity_header: String,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct OrgchartConfig {
    pub db_config: DbConfig,
    pub server: ServerConfig,
    /// Identity of the operator running CLI commands.
    pub operator: Caller,
    pub settings: Settings,
}

impl OrgchartConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - DB URL: `cli_db_url` > `ORGCHART_DATABASE_URL` > `database.url` > `DbConfig::DEFAULT_URL`
    /// - Base URL: `ORGCHART_BASE_URL` > `server.base_url` > `http://<bind>:<port>/`
    /// - Operator: `cli_operator` > `auth.operator_email` > `auth.bootstrap_owner`
    pub fn resolve(cli_db_url: Option<&str>, cli_operator: Option<&str>) -> Result<Self> {
        let file = load_config()?.unwrap_or_default();
        Self::from_file(file, cli_db_url, cli_operator)
    }

    fn from_file(
        file: ConfigFile,
        cli_db_url: Option<&str>,
        cli_operator: Option<&str>,
    ) -> Result<Self> {
        let db_url = match cli_db_url {
            Some(url) => url.to_string(),
            None => std::env::var(DbConfig::ENV_VAR).unwrap_or(file.database.url),
        };

        let base_url = match std::env::var(BASE_URL_ENV) {
            Ok(url) => url,
            Err(_) => file
                .server
                .base_url
                .clone()
                .unwrap_or_else(|| format!("http://{}:{}/", file.server.bind, file.server.port)),
        };

        if file.share.ttl_hours <= 0 {
            bail!(
                "share.ttl_hours must be positive, got {}",
                file.share.ttl_hours
            );
        }
        if file.server.identity_header.trim().is_empty() {
            bail!("server.identity_header must not be empty");
        }

        let operator = cli_operator
            .map(str::to_string)
            .or(file.auth.operator_email)
            .or_else(|| file.auth.bootstrap_owner.clone());

        Ok(Self {
            db_config: DbConfig::new(db_url).with_max_connections(file.database.max_connections),
            server: ServerConfig {
                bind: file.server.bind,
                port: file.server.port,
                identity_header: file.server.identity_header.to_ascii_lowercase(),
            },
            operator: Caller { email: operator },
            settings: Settings {
                plans: PlanSettings {
                    cache_ttl: Duration::from_secs(file.plans.cache_ttl_secs),
                    enforce_tree_integrity: file.plans.enforce_tree_integrity,
                },
                permissions: PermissionSettings {
                    bootstrap_owner: file.auth.bootstrap_owner,
                },
                share: ShareSettings {
                    base_url,
                    ttl: chrono::Duration::hours(file.share.ttl_hours),
                },
            },
        })
    }

    /// Override bind address and port (from `serve` flags). Re-derives the
    /// base URL only when it was derived in the first place.
    pub fn with_listen(mut self, bind: Option<String>, port: Option<u16>) -> Self {
        let derived = format!("http://{}:{}/", self.server.bind, self.server.port);
        if let Some(bind) = bind {
            self.server.bind = bind;
        }
        if let Some(port) = port {
            self.server.port = port;
        }
        if self.settings.share.base_url == derived {
            self.settings.share.base_url =
                format!("http://{}:{}/", self.server.bind, self.server.port);
        }
        self
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
