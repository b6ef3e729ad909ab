//! Error taxonomy shared by every component.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Errors surfaced by the repository, permission store and share issuer.
#[derive(Debug, thiserror::Error)]
pub enum OrgError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("{0}")]
    Authorization(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    Duplicate(String),

    #[error("plan {0:?} is reserved and cannot be deleted")]
    ReservedPlan(String),

    #[error("store access failed: {0}")]
    StoreAccess(String),

    #[error("share link has expired")]
    TokenExpired,

    #[error("share link is invalid")]
    TokenInvalid,
}

pub type OrgResult<T> = Result<T, OrgError>;

impl OrgError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Authorization(_) => ErrorKind::Authorization,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Duplicate(_) => ErrorKind::Duplicate,
            Self::ReservedPlan(_) => ErrorKind::Reserved,
            Self::StoreAccess(_) => ErrorKind::StoreAccess,
            Self::TokenExpired => ErrorKind::TokenExpired,
            Self::TokenInvalid => ErrorKind::TokenInvalid,
        }
    }
}

impl From<anyhow::Error> for OrgError {
    fn from(err: anyhow::Error) -> Self {
        Self::StoreAccess(format!("{err:#}"))
    }
}

impl From<serde_json::Error> for OrgError {
    fn from(err: serde_json::Error) -> Self {
        Self::StoreAccess(format!("malformed stored data: {err}"))
    }
}

/// Machine-readable error code carried in API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authorization,
    NotFound,
    Duplicate,
    Reserved,
    StoreAccess,
    TokenExpired,
    TokenInvalid,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::Authorization => "authorization",
            Self::NotFound => "not_found",
            Self::Duplicate => "duplicate",
            Self::Reserved => "reserved",
            Self::StoreAccess => "store_access",
            Self::TokenExpired => "token_expired",
            Self::TokenInvalid => "token_invalid",
        };
        f.write_str(s)
    }
}
