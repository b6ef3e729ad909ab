//! Who may view, edit, or manage sharing.
//!
//! Entries live in the hidden, protected `_permissions` sheet: a header row
//! (`email`, `name`, `permission`, `addedDate`, `addedBy`) followed by one
//! row per user. The sheet is created on first access with a single owner
//! entry; a creation that fails partway leaves no sheet behind. Anyone without an entry is an implicit view-only user.
//!
//! Every add/update/remove is mirrored to storage-level access through
//! [`access::AccessSync`] after the row is written; the mirror is
//! best-effort and never changes the result.

pub mod access;

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{OrgError, OrgResult};
use crate::settings::PermissionSettings;
use crate::store::{Range, Row, TabularStore, cell_text};

use self::access::{AccessChange, AccessSync};

pub const PERMISSIONS_SHEET: &str = "_permissions";

const HEADERS: [&str; 5] = ["email", "name", "permission", "addedDate", "addedBy"];
const PERMISSION_COL: u32 = 3;
const FIRST_ENTRY_ROW: u32 = 2;

/// `added_by` of the bootstrap entry.
const BOOTSTRAP_ADDED_BY: &str = "system";

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

// ---------------------------------------------------------------------------
// Permission level
// ---------------------------------------------------------------------------

/// Permission level, ordered `View < Edit < Owner`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    #[default]
    View,
    Edit,
    Owner,
}

impl Permission {
    /// Owner and edit are equivalent for every management action.
    pub fn can_manage(self) -> bool {
        matches!(self, Self::Owner | Self::Edit)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Owner => "owner",
            Self::Edit => "edit",
            Self::View => "view",
        };
        f.pad(s)
    }
}

impl FromStr for Permission {
    type Err = PermissionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Self::Owner),
            "edit" => Ok(Self::Edit),
            "view" => Ok(Self::View),
            other => Err(PermissionParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Permission`] string.
#[derive(Debug, Clone)]
pub struct PermissionParseError(pub String);

impl fmt::Display for PermissionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid permission: {:?} (expected owner, edit or view)", self.0)
    }
}

impl std::error::Error for PermissionParseError {}

// ---------------------------------------------------------------------------
// Identities and entries
// ---------------------------------------------------------------------------

/// The identity a request runs as, supplied by the hosting platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    pub email: Option<String>,
}

impl Caller {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Trimmed, lowercased email; `None` when absent or blank.
    pub fn normalized_email(&self) -> Option<String> {
        self.email
            .as_deref()
            .map(normalize_email)
            .filter(|e| !e.is_empty())
    }
}

/// One row of the permission table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionEntry {
    pub email: String,
    pub name: String,
    pub permission: Permission,
    pub added_at: Option<DateTime<Utc>>,
    pub added_by: String,
}

impl PermissionEntry {
    fn to_row(&self) -> Row {
        vec![
            json!(self.email),
            json!(self.name),
            json!(self.permission.to_string()),
            self.added_at
                .map(|t| json!(t.to_rfc3339()))
                .unwrap_or(serde_json::Value::Null),
            json!(self.added_by),
        ]
    }

    fn from_row(row: &[serde_json::Value]) -> Option<Self> {
        let text = |i: usize| row.get(i).map(cell_text).unwrap_or_default();
        let email = normalize_email(&text(0));
        if email.is_empty() {
            return None;
        }
        let permission = text(2).trim().parse().unwrap_or_else(|e| {
            warn!(email = %email, error = %e, "unknown permission in table, treating as view");
            Permission::View
        });
        let name = match text(1) {
            n if n.trim().is_empty() => display_name(&email),
            n => n,
        };
        Some(Self {
            email,
            name,
            permission,
            added_at: DateTime::parse_from_rfc3339(text(3).trim())
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            added_by: text(4),
        })
    }
}

/// The caller's resolved identity and permission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub email: Option<String>,
    pub name: String,
    pub permission: Permission,
    pub is_owner: bool,
}

impl CurrentUser {
    fn anonymous() -> Self {
        Self {
            email: None,
            name: String::new(),
            permission: Permission::View,
            is_owner: false,
        }
    }
}

/// Display name derived from the local part of an email.
pub fn display_name(email: &str) -> String {
    email.split('@').next().unwrap_or_default().to_string()
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Check the conventional `local@domain.tld` shape. Returns the normalized
/// email.
pub fn validate_email(email: &str) -> OrgResult<String> {
    let email = normalize_email(email);
    if EMAIL_RE.is_match(&email) {
        Ok(email)
    } else {
        Err(OrgError::Validation(format!("{email:?} is not a valid email address")))
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct PermissionStore {
    store: Arc<dyn TabularStore>,
    access: AccessSync,
    clock: Arc<dyn Clock>,
    settings: PermissionSettings,
}

impl PermissionStore {
    pub fn new(
        store: Arc<dyn TabularStore>,
        access: AccessSync,
        clock: Arc<dyn Clock>,
        settings: PermissionSettings,
    ) -> Self {
        Self {
            store,
            access,
            clock,
            settings,
        }
    }

    /// Resolve the caller against the table. Unknown callers are `view`.
    pub async fn current_user(&self, caller: &Caller) -> OrgResult<CurrentUser> {
        let Some(email) = caller.normalized_email() else {
            return Ok(CurrentUser::anonymous());
        };

        let permission = self
            .list(caller)
            .await?
            .into_iter()
            .find(|e| e.email == email)
            .map(|e| e.permission)
            .unwrap_or_default();

        Ok(CurrentUser {
            name: display_name(&email),
            email: Some(email),
            permission,
            is_owner: permission == Permission::Owner,
        })
    }

    /// Every entry, creating the table with its bootstrap owner if absent.
    pub async fn list(&self, caller: &Caller) -> OrgResult<Vec<PermissionEntry>> {
        if !self.ensure_table(caller).await? {
            return Ok(Vec::new());
        }
        Ok(self
            .read_entries()
            .await?
            .into_iter()
            .map(|(_, entry)| entry)
            .collect())
    }

    /// Reject callers below `edit`. Returns the resolved caller.
    pub async fn authorize(&self, caller: &Caller, action: &str) -> OrgResult<CurrentUser> {
        let user = self.current_user(caller).await?;
        if user.permission.can_manage() {
            return Ok(user);
        }
        warn!(
            caller = user.email.as_deref().unwrap_or("<anonymous>"),
            permission = %user.permission,
            action,
            "permission denied"
        );
        Err(OrgError::Authorization(format!(
            "permission denied: {action} requires edit or owner"
        )))
    }

    /// Grant `permission` to a new user.
    pub async fn add(
        &self,
        caller: &Caller,
        email: &str,
        permission: Permission,
    ) -> OrgResult<PermissionEntry> {
        let email = validate_email(email)?;
        let user = self.authorize(caller, "adding users").await?;

        if self.read_entries().await?.iter().any(|(_, e)| e.email == email) {
            return Err(OrgError::Duplicate(format!("user {email}")));
        }

        let entry = PermissionEntry {
            name: display_name(&email),
            email,
            permission,
            added_at: Some(self.clock.now()),
            added_by: user.email.unwrap_or_default(),
        };
        self.store
            .append_row(PERMISSIONS_SHEET, entry.to_row())
            .await?;
        self.access.enqueue(AccessChange::Grant {
            email: entry.email.clone(),
            permission,
        });

        info!(email = %entry.email, %permission, by = %entry.added_by, "user added");
        Ok(entry)
    }

    /// Change an existing user's permission in place.
    pub async fn update(
        &self,
        caller: &Caller,
        email: &str,
        permission: Permission,
    ) -> OrgResult<PermissionEntry> {
        let email = normalize_email(email);
        self.authorize(caller, "changing permissions").await?;

        let (row, mut entry) = self
            .read_entries()
            .await?
            .into_iter()
            .find(|(_, e)| e.email == email)
            .ok_or_else(|| OrgError::NotFound(format!("user {email}")))?;

        self.store
            .write_range(
                PERMISSIONS_SHEET,
                row,
                PERMISSION_COL,
                &[vec![json!(permission.to_string())]],
            )
            .await?;
        entry.permission = permission;
        self.access.enqueue(AccessChange::Grant {
            email: email.clone(),
            permission,
        });

        info!(email = %email, %permission, "permission updated");
        Ok(entry)
    }

    /// Remove every entry for `email`.
    pub async fn remove(&self, caller: &Caller, email: &str) -> OrgResult<()> {
        let email = normalize_email(email);
        self.authorize(caller, "removing users").await?;

        // Bottom-up so deleting a row never shifts one we still have to visit.
        let mut removed = 0;
        for (row, entry) in self.read_entries().await?.into_iter().rev() {
            if entry.email == email {
                self.store.delete_row(PERMISSIONS_SHEET, row).await?;
                removed += 1;
            }
        }
        if removed == 0 {
            return Err(OrgError::NotFound(format!("user {email}")));
        }

        self.access.enqueue(AccessChange::Revoke {
            email: email.clone(),
        });
        info!(email = %email, rows = removed, "user removed");
        Ok(())
    }

    /// Returns whether the table exists afterwards. It is not created when
    /// no bootstrap owner is configured and the caller is anonymous.
    async fn ensure_table(&self, caller: &Caller) -> OrgResult<bool> {
        if self.store.sheet(PERMISSIONS_SHEET).await?.is_some() {
            return Ok(true);
        }

        let owner = self
            .settings
            .bootstrap_owner
            .as_deref()
            .map(normalize_email)
            .filter(|e| !e.is_empty())
            .or_else(|| caller.normalized_email());
        let Some(owner) = owner else {
            debug!("permission table absent and no owner to bootstrap");
            return Ok(false);
        };

        if let Err(e) = self.store.create_sheet(PERMISSIONS_SHEET, true).await {
            // Lost a creation race: the other request bootstrapped it.
            if self.store.sheet(PERMISSIONS_SHEET).await?.is_some() {
                return Ok(true);
            }
            return Err(e);
        }

        let entry = PermissionEntry {
            name: display_name(&owner),
            email: owner,
            permission: Permission::Owner,
            added_at: Some(self.clock.now()),
            added_by: BOOTSTRAP_ADDED_BY.to_string(),
        };
        // All or nothing: a sheet without its owner row must not survive.
        if let Err(e) = self.bootstrap(&entry).await {
            if let Err(cleanup) = self.store.delete_sheet(PERMISSIONS_SHEET).await {
                warn!(error = %cleanup, "failed to remove partially created permission table");
            }
            return Err(e);
        }
        self.access.enqueue(AccessChange::Grant {
            email: entry.email.clone(),
            permission: Permission::Owner,
        });

        info!(owner = %entry.email, "permission table created");
        Ok(true)
    }

    async fn bootstrap(&self, owner: &PermissionEntry) -> OrgResult<()> {
        let header: Row = HEADERS.iter().map(|h| json!(h)).collect();
        self.store
            .write_range(PERMISSIONS_SHEET, 1, 1, &[header, owner.to_row()])
            .await?;
        self.store
            .protect_sheet(PERMISSIONS_SHEET, "Permission table; manage users through the app")
            .await
    }

    /// Entries with their row numbers, top to bottom.
    async fn read_entries(&self) -> OrgResult<Vec<(u32, PermissionEntry)>> {
        let last = self.store.last_row(PERMISSIONS_SHEET).await?;
        if last < FIRST_ENTRY_ROW {
            return Ok(Vec::new());
        }
        let rows = self
            .store
            .read_range(
                PERMISSIONS_SHEET,
                Range::rows_between(FIRST_ENTRY_ROW, last, HEADERS.len() as u32),
            )
            .await?;
        Ok(rows
            .iter()
            .zip(FIRST_ENTRY_ROW..)
            .filter_map(|(row, idx)| PermissionEntry::from_row(row).map(|e| (idx, e)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_round_trips_and_orders() {
        for p in [Permission::Owner, Permission::Edit, Permission::View] {
            assert_eq!(p.to_string().parse::<Permission>().unwrap(), p);
        }
        assert!("admin".parse::<Permission>().is_err());
        assert!(Permission::Owner > Permission::Edit);
        assert!(Permission::Edit > Permission::View);
        assert!(!Permission::View.can_manage());
    }

    #[test]
    fn email_shape() {
        assert_eq!(validate_email(" A@B.com ").unwrap(), "a@b.com");
        assert!(validate_email("a@b").is_err());
        assert!(validate_email("a b@c.com").is_err());
        assert!(validate_email("@c.com").is_err());
    }

    #[test]
    fn name_is_local_part() {
        assert_eq!(display_name("taro.yamada@example.com"), "taro.yamada");
    }

    #[test]
    fn entry_rows_tolerate_blanks_and_unknown_levels() {
        let row = vec![json!("X@Y.org"), json!(""), json!("admin"), json!("junk"), json!("")];
        let entry = PermissionEntry::from_row(&row).unwrap();
        assert_eq!(entry.email, "x@y.org");
        assert_eq!(entry.name, "x");
        assert_eq!(entry.permission, Permission::View);
        assert!(entry.added_at.is_none());
        assert!(PermissionEntry::from_row(&[json!(" ")]).is_none());
    }
}
