pub mod deploy;
pub mod health;
pub mod recipes;
pub mod tenants;

use appforge_core::recipe::Recipe;

/// Status summary of one recipe as returned by every tenant/recipe route.
pub(crate) fn recipe_json(r: &Recipe) -> serde_json::Value {
    serde_json::json!({
        "kind": r.kind,
        "apply_status": r.apply_status,
        "revision": r.revision,
        "endpoint": r.endpoint,
        "last_error": r.last_error,
        "updated_at": r.updated_at,
    })
}
