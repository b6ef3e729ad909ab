//! Core of the org-chart plan editor: the plan/node model and its
//! repository, the permission store, share links, and the service boundary
//! that authorizes every call before touching the store.

pub mod cache;
pub mod clock;
pub mod error;
pub mod permission;
pub mod plan;
pub mod service;
pub mod settings;
pub mod share;
pub mod store;

pub use error::{ErrorKind, OrgError, OrgResult};
