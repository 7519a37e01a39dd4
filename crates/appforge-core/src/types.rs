use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// RecipeKind
// ---------------------------------------------------------------------------

/// The feature module a recipe deploys. Selects the pipeline variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipeKind {
    Auth,
    Database,
    Storage,
    Bill,
    Logic,
}

impl RecipeKind {
    /// Every kind a newly provisioned tenant receives, in provisioning order.
    pub fn all() -> &'static [RecipeKind] {
        &[
            RecipeKind::Auth,
            RecipeKind::Database,
            RecipeKind::Storage,
            RecipeKind::Bill,
            RecipeKind::Logic,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecipeKind::Auth => "auth",
            RecipeKind::Database => "database",
            RecipeKind::Storage => "storage",
            RecipeKind::Bill => "bill",
            RecipeKind::Logic => "logic",
        }
    }

    /// Name shared by the role, function and API of this recipe for `tenant_id`.
    pub fn resource_name(self, tenant_id: &str) -> String {
        format!("{}-{}", self.as_str(), tenant_id)
    }
}

impl fmt::Display for RecipeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecipeKind {
    type Err = crate::error::ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auth" => Ok(RecipeKind::Auth),
            "database" => Ok(RecipeKind::Database),
            "storage" => Ok(RecipeKind::Storage),
            "bill" => Ok(RecipeKind::Bill),
            "logic" => Ok(RecipeKind::Logic),
            _ => Err(crate::error::ForgeError::UnknownRecipeKind(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ApplyStatus
// ---------------------------------------------------------------------------

/// Outcome of the last deployment attempt against a recipe's current config.
///
/// Transitions:
/// - `None | Failed → InProgress` (a worker picked the recipe up)
/// - `None | Failed | InProgress → Success | Failed` (pipeline outcome)
/// - `any → None` (configuration edit committed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyStatus {
    #[default]
    None,
    Failed,
    InProgress,
    Success,
}

impl ApplyStatus {
    /// Statuses a worker still has to drive to `Success`.
    pub const PENDING: [ApplyStatus; 2] = [ApplyStatus::None, ApplyStatus::Failed];

    pub fn all() -> &'static [ApplyStatus] {
        &[
            ApplyStatus::None,
            ApplyStatus::Failed,
            ApplyStatus::InProgress,
            ApplyStatus::Success,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ApplyStatus::None => "none",
            ApplyStatus::Failed => "failed",
            ApplyStatus::InProgress => "in_progress",
            ApplyStatus::Success => "success",
        }
    }

    pub fn is_pending(self) -> bool {
        Self::PENDING.contains(&self)
    }

    /// Whether a deployment-driven move from `self` to `target` is legal.
    ///
    /// Resets to `None` are not covered here; they belong to the config-edit
    /// path and are always allowed.
    pub fn can_advance_to(self, target: ApplyStatus) -> bool {
        use ApplyStatus::*;
        matches!(
            (self, target),
            (None | Failed, InProgress) | (None | Failed | InProgress, Success | Failed)
        )
    }
}

impl fmt::Display for ApplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ApplyStatus {
    type Err = crate::error::ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ApplyStatus::None),
            "failed" => Ok(ApplyStatus::Failed),
            "in_progress" => Ok(ApplyStatus::InProgress),
            "success" => Ok(ApplyStatus::Success),
            _ => Err(crate::error::ForgeError::InvalidApplyStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// StoreKind
// ---------------------------------------------------------------------------

/// Backing store provisioned ahead of a recipe's function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Table,
    Bucket,
}

impl StoreKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreKind::Table => "table",
            StoreKind::Bucket => "bucket",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
