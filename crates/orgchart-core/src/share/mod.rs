//! Time-boxed anonymous share links.
//!
//! A token is 32 random bytes, hex-encoded. Only its SHA-256 digest is
//! stored, as the property `share_token:<digest>` holding the creation time
//! and granted level. Expiry is computed at validation time; an expired
//! token's property is deleted when it is first seen expired.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{OrgError, OrgResult};
use crate::permission::Permission;
use crate::settings::ShareSettings;
use crate::store::PropertyStore;

/// Namespace of share-token properties.
pub const TOKEN_KEY_PREFIX: &str = "share_token:";

const TOKEN_BYTES: usize = 32;

/// What is persisted per token. No expiry is stored.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredToken {
    created_at: DateTime<Utc>,
    permission: Permission,
}

/// A freshly issued link. The raw token is only ever returned here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareLink {
    pub token: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// The outcome of validating a live token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareGrant {
    pub permission: Permission,
}

/// Generate a random token: 32 bytes, hex-encoded (64 characters).
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Property key for a token.
pub fn token_key(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    format!("{TOKEN_KEY_PREFIX}{}", hex::encode(digest))
}

/// `base_url` with `token` appended as a query parameter.
pub fn share_url(base_url: &str, token: &str) -> String {
    let sep = if base_url.contains('?') { '&' } else { '?' };
    format!("{base_url}{sep}token={token}")
}

fn is_well_formed(token: &str) -> bool {
    token.len() == TOKEN_BYTES * 2 && token.bytes().all(|b| b.is_ascii_hexdigit())
}

pub struct ShareTokenIssuer {
    properties: Arc<dyn PropertyStore>,
    clock: Arc<dyn Clock>,
    settings: ShareSettings,
}

impl ShareTokenIssuer {
    pub fn new(
        properties: Arc<dyn PropertyStore>,
        clock: Arc<dyn Clock>,
        settings: ShareSettings,
    ) -> Self {
        Self {
            properties,
            clock,
            settings,
        }
    }

    /// Issue a view-only link.
    pub async fn issue(&self) -> OrgResult<ShareLink> {
        let token = generate_token();
        let created_at = self.clock.now();
        let stored = StoredToken {
            created_at,
            permission: Permission::View,
        };
        self.properties
            .set(&token_key(&token), &serde_json::to_string(&stored)?)
            .await?;

        let expires_at = created_at + self.settings.ttl;
        info!(%expires_at, "share link issued");
        Ok(ShareLink {
            url: share_url(&self.settings.base_url, &token),
            token,
            expires_at,
        })
    }

    /// Check a token. Absent or malformed tokens are `TokenInvalid`; a token
    /// whose age has reached the validity window is deleted and reported
    /// `TokenExpired` (and `TokenInvalid` on every later call).
    pub async fn validate(&self, token: &str) -> OrgResult<ShareGrant> {
        let token = token.trim();
        if !is_well_formed(token) {
            debug!("malformed share token");
            return Err(OrgError::TokenInvalid);
        }

        let key = token_key(token);
        let Some(raw) = self.properties.get(&key).await? else {
            return Err(OrgError::TokenInvalid);
        };
        let stored: StoredToken = match serde_json::from_str(&raw) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "unreadable share token record");
                return Err(OrgError::TokenInvalid);
            }
        };

        let elapsed = self.clock.now() - stored.created_at;
        if elapsed >= self.settings.ttl {
            self.properties.delete(&key).await?;
            info!(created_at = %stored.created_at, "expired share link removed");
            return Err(OrgError::TokenExpired);
        }

        Ok(ShareGrant {
            permission: stored.permission,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_64_hex_chars_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(is_well_formed(&a));
        assert_ne!(a, b);
    }

    #[test]
    fn key_hides_the_token() {
        let token = generate_token();
        let key = token_key(&token);
        assert!(key.starts_with(TOKEN_KEY_PREFIX));
        assert!(!key.contains(&token));
        assert_eq!(key, token_key(&token));
    }

    #[test]
    fn url_respects_existing_query() {
        assert_eq!(share_url("https://h/app", "ab"), "https://h/app?token=ab");
        assert_eq!(
            share_url("https://h/app?lang=ja", "ab"),
            "https://h/app?lang=ja&token=ab"
        );
    }
}
