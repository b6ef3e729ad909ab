//! Typed settings for the core services, resolved once at startup.

use std::time::Duration;

/// Plan repository settings.
#[derive(Debug, Clone)]
pub struct PlanSettings {
    /// Time-to-live of the `all_plans` cache entry.
    pub cache_ttl: Duration,
    /// Reject saves whose node list has duplicate ids, dangling parent
    /// references or parent cycles.
    pub enforce_tree_integrity: bool,
}

impl Default for PlanSettings {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            enforce_tree_integrity: true,
        }
    }
}

/// Permission store settings.
#[derive(Debug, Clone, Default)]
pub struct PermissionSettings {
    /// Email that becomes owner when the permission table is first created.
    /// Falls back to the first caller with a known identity.
    pub bootstrap_owner: Option<String>,
}

/// Share link settings.
#[derive(Debug, Clone)]
pub struct ShareSettings {
    /// The service's own entry URL; tokens are appended as `?token=`.
    pub base_url: String,
    /// How long an issued link stays valid.
    pub ttl: chrono::Duration,
}

impl Default for ShareSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/".to_string(),
            ttl: chrono::Duration::hours(24),
        }
    }
}

/// Settings for the whole core.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub plans: PlanSettings,
    pub permissions: PermissionSettings,
    pub share: ShareSettings,
}
