use crate::error::{ForgeError, Result};
use crate::types::{ApplyStatus, RecipeKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Recipe
// ---------------------------------------------------------------------------

/// One independently deployable feature module of a tenant.
///
/// `apply_status` always describes the last attempt against the config at
/// `revision`. Every committed config edit bumps `revision` and resets the
/// status to `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub tenant_id: String,
    pub kind: RecipeKind,
    /// Tenant-authored configuration, opaque to the orchestrator.
    #[serde(default = "empty_config")]
    pub config: serde_json::Value,
    #[serde(default)]
    pub apply_status: ApplyStatus,
    #[serde(default)]
    pub revision: u64,
    /// Public invocation URL recorded by the last successful deploy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Diagnostic from the last failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub(crate) fn empty_config() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl Recipe {
    pub fn new(tenant_id: impl Into<String>, kind: RecipeKind) -> Self {
        let now = Utc::now();
        Self {
            tenant_id: tenant_id.into(),
            kind,
            config: empty_config(),
            apply_status: ApplyStatus::None,
            revision: 0,
            endpoint: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Storage key: `<tenant>/<kind>`.
    pub fn key(&self) -> String {
        recipe_key(&self.tenant_id, self.kind)
    }

    pub fn resource_name(&self) -> String {
        self.kind.resource_name(&self.tenant_id)
    }

    /// The `recipe.json` artifact embedded into the deploy bundle.
    pub fn bundle_manifest(&self) -> Result<String> {
        let manifest = serde_json::json!({
            "kind": self.kind,
            "revision": self.revision,
            "config": self.config,
        });
        Ok(serde_json::to_string_pretty(&manifest)?)
    }

    // -----------------------------------------------------------------------
    // Status transitions
    // -----------------------------------------------------------------------

    /// Move to `target` as the result of deployment activity.
    pub fn advance(&mut self, target: ApplyStatus) -> Result<()> {
        if !self.apply_status.can_advance_to(target) {
            return Err(ForgeError::InvalidTransition {
                from: self.apply_status.to_string(),
                to: target.to_string(),
                reason: "only pending recipes can be deployed".to_string(),
            });
        }
        self.apply_status = target;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn mark_in_progress(&mut self) -> Result<()> {
        self.advance(ApplyStatus::InProgress)
    }

    pub fn mark_success(&mut self, endpoint: Option<String>) -> Result<()> {
        self.advance(ApplyStatus::Success)?;
        if endpoint.is_some() {
            self.endpoint = endpoint;
        }
        self.last_error = None;
        Ok(())
    }

    pub fn mark_failed(&mut self, diagnostic: impl Into<String>) -> Result<()> {
        self.advance(ApplyStatus::Failed)?;
        self.last_error = Some(diagnostic.into());
        Ok(())
    }

    /// Commit a new configuration. Always legal, from any status.
    pub fn replace_config(&mut self, config: serde_json::Value) {
        self.config = config;
        self.apply_status = ApplyStatus::None;
        self.revision += 1;
        self.last_error = None;
        self.updated_at = Utc::now();
    }
}

pub fn recipe_key(tenant_id: &str, kind: RecipeKind) -> String {
    format!("{tenant_id}/{kind}")
}
