use crate::error::{ForgeError, Result};
use crate::paths;
use crate::recipe::Recipe;
use crate::types::RecipeKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Tenant
// ---------------------------------------------------------------------------

/// An independently deployed application owning one recipe per kind.
///
/// `deploying` is the exclusion gate: true iff a deployment worker is
/// running for this tenant. Only `TenantDb::try_acquire_gate` and
/// `TenantDb::release_gate` write it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub deploying: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    /// Build a tenant whose id is the slugified name plus a short random suffix.
    ///
    /// Names with nothing to slugify (e.g. only non-ASCII letters) get an
    /// `app-<suffix>` id; the name itself is kept as given.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ForgeError::BlankTenantName);
        }
        let base = paths::slugify(&name);
        let base = if base.is_empty() { "app" } else { truncate(&base, 48) };
        let suffix = Uuid::new_v4().simple().to_string();
        let id = format!("{base}-{}", &suffix[..8]);
        Self::with_id(id, name)
    }

    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let id = id.into();
        paths::validate_slug(&id)?;
        let now = Utc::now();
        Ok(Self {
            id,
            name: name.into(),
            deploying: false,
            created_at: now,
            updated_at: now,
        })
    }

    /// The full recipe set a freshly provisioned tenant starts with.
    pub fn default_recipes(&self) -> Vec<Recipe> {
        RecipeKind::all()
            .iter()
            .map(|&kind| Recipe::new(&self.id, kind))
            .collect()
    }
}

fn truncate(s: &str, max: usize) -> &str {
    let cut = s.len().min(max);
    s[..cut].trim_end_matches('-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_slug_with_suffix() {
        let t = Tenant::new("My Shop").unwrap();
        assert!(t.id.starts_with("my-shop-"));
        assert_eq!(t.id.len(), "my-shop-".len() + 8);
        assert!(paths::validate_slug(&t.id).is_ok());
        assert!(!t.deploying);
    }

    #[test]
    fn ids_are_unique_per_provisioning() {
        let a = Tenant::new("shop").unwrap();
        let b = Tenant::new("shop").unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn non_ascii_name_gets_generated_id() {
        let t = Tenant::new("카페 앱").unwrap();
        assert!(t.id.starts_with("app-"));
        assert_eq!(t.id.len(), "app-".len() + 8);
        assert!(paths::validate_slug(&t.id).is_ok());
        assert_eq!(t.name, "카페 앱");

        let punct = Tenant::new("!!!").unwrap();
        assert!(punct.id.starts_with("app-"));
    }

    #[test]
    fn blank_name_is_rejected() {
        assert!(matches!(Tenant::new("   "), Err(ForgeError::BlankTenantName)));
    }

    #[test]
    fn long_names_are_truncated_to_a_valid_slug() {
        let t = Tenant::new("a".repeat(47) + "-bbbbbbbb").unwrap();
        assert!(paths::validate_slug(&t.id).is_ok());
    }

    #[test]
    fn default_recipes_cover_every_kind() {
        let t = Tenant::with_id("shop-1", "Shop").unwrap();
        let recipes = t.default_recipes();
        assert_eq!(recipes.len(), RecipeKind::all().len());
        assert!(recipes.iter().all(|r| r.tenant_id == "shop-1"));
    }
}
