//! Plan persistence with a read-through cache.
//!
//! Every plan is a sheet named after its id (see [`super::schema`] for the
//! layout). Sheets whose names start with [`RESERVED_PREFIX`] are
//! administrative and never listed as plans. New plans are cloned from the
//! hidden [`TEMPLATE_SHEET`].
//!
//! Every mutating path invalidates the `all_plans` cache entry before it
//! returns, whether the store write succeeded or not. A listing that was
//! read while a write was in flight is returned but not cached (see
//! [`PlanCache::put_if_current`]). Writers take no lock:
//! two saves to one plan race last-write-wins, and a batch update racing a
//! save can lose either side's changes.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::model::{NodeUpdate, Plan};
use super::schema::{self, FIRST_NODE_ROW, HEADER_ROW, META_TOP_ROW};
use super::validate::validate_tree;
use crate::cache::{ALL_PLANS_KEY, PlanCache};
use crate::clock::Clock;
use crate::error::{OrgError, OrgResult};
use crate::settings::PlanSettings;
use crate::store::{Range, Row, SheetInfo, TabularStore};

/// The live org. Never deletable.
pub const CURRENT_PLAN_ID: &str = "current";

/// Prefix of administrative sheets.
pub const RESERVED_PREFIX: &str = "_";

/// Hidden sheet every new plan is cloned from.
pub const TEMPLATE_SHEET: &str = "_template";

const MAX_PLAN_ID_LEN: usize = 64;

/// Check that `plan_id` is slug-like: 1-64 of `[A-Za-z0-9_-]`, not
/// starting with the reserved prefix.
pub fn validate_plan_id(plan_id: &str) -> OrgResult<()> {
    let well_formed = !plan_id.is_empty()
        && plan_id.len() <= MAX_PLAN_ID_LEN
        && !plan_id.starts_with(RESERVED_PREFIX)
        && plan_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if well_formed {
        Ok(())
    } else {
        Err(OrgError::Validation(format!(
            "plan id {plan_id:?} must be 1-{MAX_PLAN_ID_LEN} letters, digits, '-' or '_' \
             and must not start with {RESERVED_PREFIX:?}"
        )))
    }
}

pub struct PlanRepository {
    store: Arc<dyn TabularStore>,
    cache: PlanCache,
    clock: Arc<dyn Clock>,
    settings: PlanSettings,
}

impl PlanRepository {
    pub fn new(store: Arc<dyn TabularStore>, clock: Arc<dyn Clock>, settings: PlanSettings) -> Self {
        Self {
            store,
            cache: PlanCache::new(settings.cache_ttl),
            clock,
            settings,
        }
    }

    /// Every plan keyed by id, served from cache when fresh.
    ///
    /// A failed store read caches nothing.
    pub async fn list_all(&self) -> OrgResult<BTreeMap<String, Plan>> {
        if let Some(cached) = self.cache.get(ALL_PLANS_KEY).await {
            match serde_json::from_str(&cached) {
                Ok(plans) => {
                    debug!("plan cache hit");
                    return Ok(plans);
                }
                Err(e) => warn!(error = %e, "discarding unreadable plan cache entry"),
            }
        }

        let generation = self.cache.generation();
        let plans = self.load_all().await?;
        if self
            .cache
            .put_if_current(ALL_PLANS_KEY, serde_json::to_string(&plans)?, generation)
            .await
        {
            debug!(count = plans.len(), "plan cache filled");
        } else {
            debug!("plan listing raced a write, not cached");
        }
        Ok(plans)
    }

    /// A single plan by id.
    pub async fn get(&self, plan_id: &str) -> OrgResult<Plan> {
        self.list_all()
            .await?
            .remove(plan_id)
            .ok_or_else(|| OrgError::NotFound(format!("plan {plan_id:?}")))
    }

    /// Create or overwrite a plan.
    ///
    /// The metadata block is always rewritten and the node block is replaced
    /// wholesale.
    pub async fn save(&self, plan_id: &str, plan: &Plan) -> OrgResult<()> {
        validate_plan_id(plan_id)?;
        if self.settings.enforce_tree_integrity {
            validate_tree(&plan.nodes)?;
        }

        let result = self.write_plan(plan_id, plan).await;
        self.cache.invalidate(ALL_PLANS_KEY).await;
        result?;

        info!(plan_id, nodes = plan.nodes.len(), "plan saved");
        Ok(())
    }

    /// Delete a plan. [`CURRENT_PLAN_ID`] is refused.
    pub async fn delete(&self, plan_id: &str) -> OrgResult<()> {
        if plan_id == CURRENT_PLAN_ID {
            return Err(OrgError::ReservedPlan(plan_id.to_string()));
        }
        if plan_id.starts_with(RESERVED_PREFIX) {
            return Err(OrgError::NotFound(format!("plan {plan_id:?}")));
        }

        let result = self.store.delete_sheet(plan_id).await;
        self.cache.invalidate(ALL_PLANS_KEY).await;
        if !result? {
            return Err(OrgError::NotFound(format!("plan {plan_id:?}")));
        }

        info!(plan_id, "plan deleted");
        Ok(())
    }

    /// Merge partial updates onto nodes by id and rewrite the node block.
    ///
    /// Updates naming an unknown node are ignored. Returns how many updates
    /// matched a node. Reads through [`Self::list_all`], so a stale cache
    /// entry would feed the merge; mutating paths invalidate to prevent that.
    pub async fn batch_update(&self, plan_id: &str, updates: &[NodeUpdate]) -> OrgResult<usize> {
        let mut plan = self.get(plan_id).await?;

        let mut applied = 0;
        for update in updates {
            match plan.nodes.iter_mut().find(|n| n.id == update.id) {
                Some(node) => {
                    update.patch.apply(node);
                    applied += 1;
                }
                None => debug!(plan_id, node_id = %update.id, "ignoring update for unknown node"),
            }
        }

        if self.settings.enforce_tree_integrity {
            validate_tree(&plan.nodes)?;
        }

        let result = self.replace_nodes(plan_id, &plan.nodes).await;
        self.cache.invalidate(ALL_PLANS_KEY).await;
        result?;

        info!(plan_id, applied, requested = updates.len(), "batch update applied");
        Ok(applied)
    }

    async fn load_all(&self) -> OrgResult<BTreeMap<String, Plan>> {
        let mut plans = BTreeMap::new();
        for sheet in self.store.list_sheets().await? {
            if sheet.name.starts_with(RESERVED_PREFIX) {
                continue;
            }
            let plan = self.load_plan(&sheet.name).await?;
            plans.insert(sheet.name, plan);
        }
        Ok(plans)
    }

    async fn load_plan(&self, plan_id: &str) -> OrgResult<Plan> {
        let meta = self
            .store
            .read_range(plan_id, Range::new(META_TOP_ROW, 1, 3, 2))
            .await?;
        let (name, period, memo) = schema::parse_meta(&meta);

        let last = self.store.last_row(plan_id).await?;
        let nodes = if last < HEADER_ROW {
            Vec::new()
        } else {
            let block = self
                .store
                .read_range(plan_id, Range::rows_between(HEADER_ROW, last, schema::node_width()))
                .await?;
            schema::parse_nodes(&block)
        };

        Ok(Plan {
            name,
            period,
            memo,
            nodes,
        })
    }

    async fn write_plan(&self, plan_id: &str, plan: &Plan) -> OrgResult<()> {
        if self.store.sheet(plan_id).await?.is_none() {
            self.ensure_template().await?;
            let copied = self.store.copy_sheet(TEMPLATE_SHEET, plan_id).await;
            if self.adopt_lost_race(plan_id, copied).await? {
                info!(plan_id, "created plan sheet from template");
            }
        }

        self.store
            .write_range(
                plan_id,
                META_TOP_ROW,
                1,
                &schema::meta_rows(&plan.name, &plan.period, &plan.memo),
            )
            .await?;
        self.replace_nodes(plan_id, &plan.nodes).await
    }

    /// Clear every node row, then write `nodes` (nothing when empty).
    async fn replace_nodes(&self, plan_id: &str, nodes: &[super::Node]) -> OrgResult<()> {
        self.store
            .write_range(plan_id, HEADER_ROW, 1, &[schema::header_row()])
            .await?;

        let last = self.store.last_row(plan_id).await?;
        if last >= FIRST_NODE_ROW {
            self.store
                .clear_range(
                    plan_id,
                    Range::rows_between(FIRST_NODE_ROW, last, schema::node_width()),
                )
                .await?;
        }

        if nodes.is_empty() {
            return Ok(());
        }

        let now = self.clock.now();
        let rows: Vec<Row> = nodes.iter().map(|n| schema::node_row(n, now)).collect();
        self.store
            .write_range(plan_id, FIRST_NODE_ROW, 1, &rows)
            .await
    }

    async fn ensure_template(&self) -> OrgResult<()> {
        if self.store.sheet(TEMPLATE_SHEET).await?.is_some() {
            return Ok(());
        }
        let created = self.store.create_sheet(TEMPLATE_SHEET, true).await;
        if !self.adopt_lost_race(TEMPLATE_SHEET, created).await? {
            return Ok(());
        }
        self.store
            .write_range(TEMPLATE_SHEET, META_TOP_ROW, 1, &schema::meta_rows("", "", ""))
            .await?;
        self.store
            .write_range(TEMPLATE_SHEET, HEADER_ROW, 1, &[schema::header_row()])
            .await?;
        info!("created plan template sheet");
        Ok(())
    }

    /// Settle a sheet creation. `Ok(true)` when this call created `name`,
    /// `Ok(false)` when it failed because a concurrent writer created it
    /// first.
    async fn adopt_lost_race(
        &self,
        name: &str,
        created: OrgResult<SheetInfo>,
    ) -> OrgResult<bool> {
        match created {
            Ok(_) => Ok(true),
            Err(e) => {
                if self.store.sheet(name).await?.is_some() {
                    debug!(sheet = name, "sheet created concurrently, reusing it");
                    Ok(false)
                } else {
                    Err(e)
                }
            }
        }
    }
}
