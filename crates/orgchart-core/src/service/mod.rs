//! The boundary used by the presentation layer.
//!
//! Every method resolves the caller, checks the permission the operation
//! needs, then delegates. Results are `OrgResult`s; [`ApiResponse`] turns
//! them into the uniform `{success, data | error}` envelope.

pub mod export;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::{ErrorKind, OrgError, OrgResult};
use crate::permission::access::AccessSync;
use crate::permission::{Caller, CurrentUser, Permission, PermissionEntry, PermissionStore};
use crate::plan::{NodeUpdate, Plan, PlanRepository};
use crate::settings::Settings;
use crate::share::{ShareLink, ShareTokenIssuer};
use crate::store::{PropertyStore, TabularStore};

/// Uniform response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorKind>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
        }
    }

    pub fn error(err: &OrgError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.to_string()),
            code: Some(err.kind()),
        }
    }
}

impl<T> From<OrgResult<T>> for ApiResponse<T> {
    fn from(result: OrgResult<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::error(&e),
        }
    }
}

/// Every plan plus who is asking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlansView {
    pub plans: BTreeMap<String, Plan>,
    pub user: CurrentUser,
}

/// The resolved context of an entry request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryContext {
    pub user: CurrentUser,
    pub via_share_token: bool,
}

/// A CSV export with its suggested filename.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvExport {
    pub filename: String,
    pub content: String,
}

#[derive(Clone)]
pub struct PlanService {
    plans: Arc<PlanRepository>,
    permissions: Arc<PermissionStore>,
    shares: Arc<ShareTokenIssuer>,
    clock: Arc<dyn Clock>,
}

impl PlanService {
    pub fn new(
        plans: Arc<PlanRepository>,
        permissions: Arc<PermissionStore>,
        shares: Arc<ShareTokenIssuer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            plans,
            permissions,
            shares,
            clock,
        }
    }

    /// Wire every component over one backing store.
    pub fn from_store<S>(
        store: Arc<S>,
        access: AccessSync,
        clock: Arc<dyn Clock>,
        settings: &Settings,
    ) -> Self
    where
        S: TabularStore + PropertyStore + 'static,
    {
        let tabular: Arc<dyn TabularStore> = store.clone();
        let properties: Arc<dyn PropertyStore> = store;
        Self::new(
            Arc::new(PlanRepository::new(
                tabular.clone(),
                clock.clone(),
                settings.plans.clone(),
            )),
            Arc::new(PermissionStore::new(
                tabular,
                access,
                clock.clone(),
                settings.permissions.clone(),
            )),
            Arc::new(ShareTokenIssuer::new(
                properties,
                clock.clone(),
                settings.share.clone(),
            )),
            clock,
        )
    }

    pub async fn list_all_plans(&self, caller: &Caller) -> OrgResult<PlansView> {
        logged("list_all_plans", async {
            let user = self.permissions.current_user(caller).await?;
            let plans = self.plans.list_all().await?;
            Ok(PlansView { plans, user })
        })
        .await
    }

    pub async fn save_plan(&self, caller: &Caller, plan_id: &str, plan: &Plan) -> OrgResult<()> {
        logged("save_plan", async {
            self.permissions.authorize(caller, "saving plans").await?;
            self.plans.save(plan_id, plan).await
        })
        .await
    }

    pub async fn delete_plan(&self, caller: &Caller, plan_id: &str) -> OrgResult<()> {
        logged("delete_plan", async {
            self.permissions.authorize(caller, "deleting plans").await?;
            self.plans.delete(plan_id).await
        })
        .await
    }

    /// Returns how many updates matched a node.
    pub async fn batch_update_nodes(
        &self,
        caller: &Caller,
        plan_id: &str,
        updates: &[NodeUpdate],
    ) -> OrgResult<usize> {
        logged("batch_update_nodes", async {
            self.permissions.authorize(caller, "editing nodes").await?;
            self.plans.batch_update(plan_id, updates).await
        })
        .await
    }

    /// View permission suffices.
    pub async fn export_csv(&self, caller: &Caller, plan_id: &str) -> OrgResult<CsvExport> {
        logged("export_csv", async {
            self.permissions.current_user(caller).await?;
            let plan = self.plans.get(plan_id).await?;
            let name = if plan.name.trim().is_empty() {
                plan_id
            } else {
                plan.name.as_str()
            };
            Ok(CsvExport {
                filename: export::export_filename(name, self.clock.now().date_naive()),
                content: export::to_csv(&plan),
            })
        })
        .await
    }

    pub async fn list_shared_users(&self, caller: &Caller) -> OrgResult<Vec<PermissionEntry>> {
        logged("list_shared_users", self.permissions.list(caller)).await
    }

    pub async fn add_shared_user(
        &self,
        caller: &Caller,
        email: &str,
        permission: Permission,
    ) -> OrgResult<PermissionEntry> {
        logged(
            "add_shared_user",
            self.permissions.add(caller, email, permission),
        )
        .await
    }

    pub async fn update_user_permission(
        &self,
        caller: &Caller,
        email: &str,
        permission: Permission,
    ) -> OrgResult<PermissionEntry> {
        logged(
            "update_user_permission",
            self.permissions.update(caller, email, permission),
        )
        .await
    }

    pub async fn remove_shared_user(&self, caller: &Caller, email: &str) -> OrgResult<()> {
        logged("remove_shared_user", self.permissions.remove(caller, email)).await
    }

    pub async fn generate_share_link(&self, caller: &Caller) -> OrgResult<ShareLink> {
        logged("generate_share_link", async {
            self.permissions
                .authorize(caller, "creating share links")
                .await?;
            self.shares.issue().await
        })
        .await
    }

    /// Resolve an entry request. A valid token raises the caller to at least
    /// its granted level; an invalid or expired one denies access outright.
    pub async fn resolve_entry(
        &self,
        caller: &Caller,
        token: Option<&str>,
    ) -> OrgResult<EntryContext> {
        logged("resolve_entry", async {
            let mut user = self.permissions.current_user(caller).await?;
            let Some(token) = token.filter(|t| !t.trim().is_empty()) else {
                return Ok(EntryContext {
                    user,
                    via_share_token: false,
                });
            };

            match self.shares.validate(token).await {
                Ok(grant) => {
                    user.permission = user.permission.max(grant.permission);
                    user.is_owner = user.permission == Permission::Owner;
                    Ok(EntryContext {
                        user,
                        via_share_token: true,
                    })
                }
                Err(e @ (OrgError::TokenExpired | OrgError::TokenInvalid)) => {
                    tracing::warn!(reason = %e, "share link rejected");
                    Err(OrgError::Authorization("access denied".to_string()))
                }
                Err(e) => Err(e),
            }
        })
        .await
    }
}

/// Run `fut` and log a failure at a level matching its kind.
async fn logged<T>(op: &'static str, fut: impl Future<Output = OrgResult<T>>) -> OrgResult<T> {
    let result = fut.await;
    if let Err(e) = &result {
        match e.kind() {
            ErrorKind::StoreAccess => tracing::error!(op, error = %e, "store failure"),
            ErrorKind::Authorization | ErrorKind::TokenExpired | ErrorKind::TokenInvalid => {
                tracing::warn!(op, error = %e, "request denied")
            }
            _ => tracing::info!(op, error = %e, "request rejected"),
        }
    }
    result
}
