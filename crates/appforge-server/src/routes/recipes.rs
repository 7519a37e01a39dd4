use axum::extract::{Path, State};
use axum::Json;

use appforge_core::types::RecipeKind;

use super::recipe_json;
use crate::error::AppError;
use crate::state::AppState;

/// GET /api/tenants/{id}/recipes/{kind}: one recipe including its config.
pub async fn get_recipe(
    State(app): State<AppState>,
    Path((id, kind)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    let kind: RecipeKind = kind.parse()?;
    let db = app.db.clone();
    let recipe = tokio::task::spawn_blocking(move || db.get_recipe(&id, kind))
        .await
        .map_err(AppError::join)??;

    let mut body = recipe_json(&recipe);
    body["tenant_id"] = serde_json::json!(recipe.tenant_id);
    body["config"] = recipe.config;
    Ok(Json(body))
}

/// PUT /api/tenants/{id}/recipes/{kind}/config: replace the configuration.
///
/// The request body is the new configuration. The recipe's status resets to
/// `none`, so the next deployment request redeploys it.
pub async fn put_recipe_config(
    State(app): State<AppState>,
    Path((id, kind)): Path<(String, String)>,
    Json(config): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    let kind: RecipeKind = kind.parse()?;
    if !config.is_object() {
        return Err(AppError::bad_request("recipe config must be a JSON object"));
    }
    let db = app.db.clone();
    let recipe = tokio::task::spawn_blocking(move || db.set_recipe_config(&id, kind, config))
        .await
        .map_err(AppError::join)??;

    Ok(Json(recipe_json(&recipe)))
}
