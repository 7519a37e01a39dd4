//! Persistent storage for tenants and recipes using redb.
//!
//! # Table design
//!
//! Two tables, values JSON-encoded:
//! ```text
//! tenants: tenant_id            -> Tenant
//! recipes: "<tenant_id>/<kind>" -> Recipe
//! ```
//!
//! A tenant's recipes share the `<tenant_id>/` prefix, so one range scan
//! `"<tenant_id>/".."<tenant_id>0"` returns exactly that tenant's recipes
//! (`'0'` is the byte after `'/'`).
//!
//! # Atomicity
//!
//! redb admits a single write transaction at a time and `begin_write` blocks
//! until the previous one commits or aborts. Every read-check-write below
//! runs inside one write transaction, which makes it an atomic conditional
//! update. Dropping a write transaction without `commit` discards it.

use std::path::Path;

use chrono::Utc;
use redb::{Database, ReadableTable, Table, TableDefinition};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{ForgeError, Result};
use crate::recipe::{recipe_key, Recipe};
use crate::tenant::Tenant;
use crate::types::{ApplyStatus, RecipeKind};

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

const TENANTS: TableDefinition<&str, &[u8]> = TableDefinition::new("tenants");
const RECIPES: TableDefinition<&str, &[u8]> = TableDefinition::new("recipes");

fn db_err(e: impl std::fmt::Display) -> ForgeError {
    ForgeError::Store(e.to_string())
}

fn recipe_range(tenant_id: &str) -> (String, String) {
    (format!("{tenant_id}/"), format!("{tenant_id}0"))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(db_err)
}

fn read_tenant<T: ReadableTable<&'static str, &'static [u8]>>(
    table: &T,
    id: &str,
) -> Result<Tenant> {
    let guard = table
        .get(id)
        .map_err(db_err)?
        .ok_or_else(|| ForgeError::TenantNotFound(id.to_string()))?;
    decode(guard.value())
}

fn read_recipe<T: ReadableTable<&'static str, &'static [u8]>>(
    table: &T,
    tenant_id: &str,
    kind: RecipeKind,
) -> Result<Recipe> {
    let guard = table
        .get(recipe_key(tenant_id, kind).as_str())
        .map_err(db_err)?
        .ok_or_else(|| ForgeError::RecipeNotFound {
            tenant: tenant_id.to_string(),
            kind: kind.to_string(),
        })?;
    decode(guard.value())
}

fn write_tenant(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    tenant: &Tenant,
) -> Result<()> {
    let value = serde_json::to_vec(tenant)?;
    table
        .insert(tenant.id.as_str(), value.as_slice())
        .map_err(db_err)?;
    Ok(())
}

fn write_recipe(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    recipe: &Recipe,
) -> Result<()> {
    let value = serde_json::to_vec(recipe)?;
    table
        .insert(recipe.key().as_str(), value.as_slice())
        .map_err(db_err)?;
    Ok(())
}

fn scan_recipes<T: ReadableTable<&'static str, &'static [u8]>>(
    table: &T,
    tenant_id: &str,
) -> Result<Vec<Recipe>> {
    let (lo, hi) = recipe_range(tenant_id);
    let mut result = Vec::new();
    for entry in table.range(lo.as_str()..hi.as_str()).map_err(db_err)? {
        let (_, v) = entry.map_err(db_err)?;
        result.push(decode::<Recipe>(v.value())?);
    }
    result.sort_by_key(|r| r.kind);
    Ok(result)
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// What `startup_recovery` repaired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Recipes found `InProgress` and moved to `Failed`.
    pub recipes_failed: u32,
    /// Tenants whose `deploying` flag was cleared.
    pub gates_released: u32,
}

// ---------------------------------------------------------------------------
// TenantDb
// ---------------------------------------------------------------------------

/// Persistent store for tenants, their recipes and the deployment gate.
pub struct TenantDb {
    db: Database,
}

impl TenantDb {
    /// Open or create the redb database at `path`.
    ///
    /// Creates both tables if they don't already exist.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(db_err)?;
        let wt = db.begin_write().map_err(db_err)?;
        wt.open_table(TENANTS).map_err(db_err)?;
        wt.open_table(RECIPES).map_err(db_err)?;
        wt.commit().map_err(db_err)?;
        Ok(Self { db })
    }

    // -----------------------------------------------------------------------
    // Tenants
    // -----------------------------------------------------------------------

    /// Persist a new tenant together with its full recipe set.
    pub fn insert_tenant(&self, tenant: &Tenant, recipes: &[Recipe]) -> Result<()> {
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut tenants = wt.open_table(TENANTS).map_err(db_err)?;
            if tenants.get(tenant.id.as_str()).map_err(db_err)?.is_some() {
                return Err(ForgeError::TenantExists(tenant.id.clone()));
            }
            write_tenant(&mut tenants, tenant)?;

            let mut table = wt.open_table(RECIPES).map_err(db_err)?;
            for recipe in recipes {
                write_recipe(&mut table, recipe)?;
            }
        }
        wt.commit().map_err(db_err)?;
        info!(tenant = %tenant.id, recipes = recipes.len(), "tenant provisioned");
        Ok(())
    }

    /// Create a tenant named `name` with one recipe per known kind.
    pub fn provision_tenant(&self, name: &str) -> Result<Tenant> {
        let tenant = Tenant::new(name)?;
        self.insert_tenant(&tenant, &tenant.default_recipes())?;
        Ok(tenant)
    }

    pub fn get_tenant(&self, id: &str) -> Result<Tenant> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(TENANTS).map_err(db_err)?;
        read_tenant(&table, id)
    }

    /// List all tenants, oldest first.
    pub fn list_tenants(&self) -> Result<Vec<Tenant>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(TENANTS).map_err(db_err)?;
        let mut result = Vec::new();
        for entry in table.iter().map_err(db_err)? {
            let (_, v) = entry.map_err(db_err)?;
            result.push(decode::<Tenant>(v.value())?);
        }
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(result)
    }

    /// Delete a tenant and all of its recipes. Refused while deploying.
    pub fn delete_tenant(&self, id: &str) -> Result<()> {
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut tenants = wt.open_table(TENANTS).map_err(db_err)?;
            let tenant = read_tenant(&tenants, id)?;
            if tenant.deploying {
                return Err(ForgeError::DeploymentInProgress(id.to_string()));
            }
            tenants.remove(id).map_err(db_err)?;

            let mut recipes = wt.open_table(RECIPES).map_err(db_err)?;
            let keys: Vec<String> = scan_recipes(&recipes, id)?
                .iter()
                .map(Recipe::key)
                .collect();
            for key in keys {
                recipes.remove(key.as_str()).map_err(db_err)?;
            }
        }
        wt.commit().map_err(db_err)?;
        info!(tenant = %id, "tenant deleted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Exclusion gate
    // -----------------------------------------------------------------------

    /// Atomically flip `deploying` from false to true.
    ///
    /// Returns `true` if this call changed the flag, `false` if another
    /// worker already holds the gate.
    pub fn try_acquire_gate(&self, tenant_id: &str) -> Result<bool> {
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(TENANTS).map_err(db_err)?;
            let mut tenant = read_tenant(&table, tenant_id)?;
            if tenant.deploying {
                return Ok(false);
            }
            tenant.deploying = true;
            tenant.updated_at = Utc::now();
            write_tenant(&mut table, &tenant)?;
        }
        wt.commit().map_err(db_err)?;
        debug!(tenant = %tenant_id, "deployment gate acquired");
        Ok(true)
    }

    /// Clear `deploying`. Idempotent.
    pub fn release_gate(&self, tenant_id: &str) -> Result<()> {
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(TENANTS).map_err(db_err)?;
            let mut tenant = read_tenant(&table, tenant_id)?;
            if !tenant.deploying {
                return Ok(());
            }
            tenant.deploying = false;
            tenant.updated_at = Utc::now();
            write_tenant(&mut table, &tenant)?;
        }
        wt.commit().map_err(db_err)?;
        debug!(tenant = %tenant_id, "deployment gate released");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Recipes
    // -----------------------------------------------------------------------

    pub fn get_recipe(&self, tenant_id: &str, kind: RecipeKind) -> Result<Recipe> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(RECIPES).map_err(db_err)?;
        read_recipe(&table, tenant_id, kind)
    }

    /// All recipes of a tenant in kind order. Errors if the tenant is unknown.
    pub fn list_recipes(&self, tenant_id: &str) -> Result<Vec<Recipe>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        read_tenant(&rt.open_table(TENANTS).map_err(db_err)?, tenant_id)?;
        let table = rt.open_table(RECIPES).map_err(db_err)?;
        scan_recipes(&table, tenant_id)
    }

    /// Recipes of a tenant whose status is one of `statuses`.
    pub fn recipes_with_status(
        &self,
        tenant_id: &str,
        statuses: &[ApplyStatus],
    ) -> Result<Vec<Recipe>> {
        Ok(self
            .list_recipes(tenant_id)?
            .into_iter()
            .filter(|r| statuses.contains(&r.apply_status))
            .collect())
    }

    /// Recipes still waiting to be driven to `Success`.
    pub fn pending_recipes(&self, tenant_id: &str) -> Result<Vec<Recipe>> {
        self.recipes_with_status(tenant_id, &ApplyStatus::PENDING)
    }

    /// True iff no recipe of the tenant is `None` or `Failed`.
    pub fn all_applied(&self, tenant_id: &str) -> Result<bool> {
        Ok(self.pending_recipes(tenant_id)?.is_empty())
    }

    /// Edit a recipe's configuration as one committed unit.
    ///
    /// `edit` runs against a copy of the current configuration. If it returns
    /// `Ok`, the new configuration, a bumped revision and status `None` are
    /// committed together. If it returns `Err`, nothing is written.
    pub fn edit_recipe_config<F>(
        &self,
        tenant_id: &str,
        kind: RecipeKind,
        edit: F,
    ) -> Result<Recipe>
    where
        F: FnOnce(&mut serde_json::Value) -> Result<()>,
    {
        let wt = self.db.begin_write().map_err(db_err)?;
        let recipe = {
            let mut table = wt.open_table(RECIPES).map_err(db_err)?;
            let mut recipe = read_recipe(&table, tenant_id, kind)?;
            let mut config = recipe.config.clone();
            edit(&mut config)?;
            recipe.replace_config(config);
            write_recipe(&mut table, &recipe)?;
            recipe
        };
        wt.commit().map_err(db_err)?;
        info!(
            tenant = %tenant_id,
            recipe = %kind,
            revision = recipe.revision,
            "recipe config updated, status reset"
        );
        Ok(recipe)
    }

    /// Replace a recipe's configuration wholesale and reset its status.
    pub fn set_recipe_config(
        &self,
        tenant_id: &str,
        kind: RecipeKind,
        config: serde_json::Value,
    ) -> Result<Recipe> {
        self.edit_recipe_config(tenant_id, kind, move |current| {
            *current = config;
            Ok(())
        })
    }

    /// Mark a pending recipe `InProgress` and return it as it will be deployed.
    ///
    /// Returns `None` if the recipe is no longer pending.
    pub fn begin_attempt(&self, tenant_id: &str, kind: RecipeKind) -> Result<Option<Recipe>> {
        let wt = self.db.begin_write().map_err(db_err)?;
        let recipe = {
            let mut table = wt.open_table(RECIPES).map_err(db_err)?;
            let mut recipe = read_recipe(&table, tenant_id, kind)?;
            if !recipe.apply_status.is_pending() {
                return Ok(None);
            }
            recipe.mark_in_progress()?;
            write_recipe(&mut table, &recipe)?;
            recipe
        };
        wt.commit().map_err(db_err)?;
        Ok(Some(recipe))
    }

    /// Record the outcome of an attempt made against `revision`.
    ///
    /// `outcome` is the endpoint on success or the diagnostic on failure.
    /// If the configuration was edited since the attempt started, the
    /// outcome is stale and nothing is written; returns whether it was applied.
    pub fn record_outcome(
        &self,
        tenant_id: &str,
        kind: RecipeKind,
        revision: u64,
        outcome: std::result::Result<Option<String>, String>,
    ) -> Result<bool> {
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(RECIPES).map_err(db_err)?;
            let mut recipe = read_recipe(&table, tenant_id, kind)?;
            if recipe.revision != revision {
                debug!(
                    tenant = %tenant_id,
                    recipe = %kind,
                    attempted = revision,
                    current = recipe.revision,
                    "config changed during attempt, outcome discarded"
                );
                return Ok(false);
            }
            match outcome {
                Ok(endpoint) => recipe.mark_success(endpoint)?,
                Err(diagnostic) => recipe.mark_failed(diagnostic)?,
            }
            write_recipe(&mut table, &recipe)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Recovery
    // -----------------------------------------------------------------------

    /// Repair state left behind by a process that died mid-deployment.
    ///
    /// No worker survives a restart, so every `InProgress` recipe becomes
    /// `Failed` and every held gate is released.
    pub fn startup_recovery(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut tenants = wt.open_table(TENANTS).map_err(db_err)?;
            let mut stuck = Vec::new();
            for entry in tenants.iter().map_err(db_err)? {
                let (_, v) = entry.map_err(db_err)?;
                let tenant: Tenant = decode(v.value())?;
                if tenant.deploying {
                    stuck.push(tenant);
                }
            }
            for mut tenant in stuck {
                tenant.deploying = false;
                tenant.updated_at = Utc::now();
                write_tenant(&mut tenants, &tenant)?;
                report.gates_released += 1;
            }

            let mut recipes = wt.open_table(RECIPES).map_err(db_err)?;
            let mut interrupted = Vec::new();
            for entry in recipes.iter().map_err(db_err)? {
                let (_, v) = entry.map_err(db_err)?;
                let recipe: Recipe = decode(v.value())?;
                if recipe.apply_status == ApplyStatus::InProgress {
                    interrupted.push(recipe);
                }
            }
            for mut recipe in interrupted {
                recipe.mark_failed("interrupted by restart")?;
                write_recipe(&mut recipes, &recipe)?;
                report.recipes_failed += 1;
            }
        }
        wt.commit().map_err(db_err)?;
        if report != RecoveryReport::default() {
            info!(
                recipes_failed = report.recipes_failed,
                gates_released = report.gates_released,
                "startup recovery repaired interrupted deployments"
            );
        }
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
