use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use super::recipe_json;
use crate::error::AppError;
use crate::state::AppState;

/// GET /api/tenants: list all tenants.
pub async fn list_tenants(
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let db = app.db.clone();
    let result = tokio::task::spawn_blocking(move || {
        let tenants = db.list_tenants()?;
        let list: Vec<serde_json::Value> = tenants
            .iter()
            .map(|t| {
                serde_json::json!({
                    "id": t.id,
                    "name": t.name,
                    "deploying": t.deploying,
                    "created_at": t.created_at,
                })
            })
            .collect();
        Ok::<_, appforge_core::ForgeError>(serde_json::json!(list))
    })
    .await
    .map_err(AppError::join)??;

    Ok(Json(result))
}

#[derive(serde::Deserialize)]
pub struct CreateTenantBody {
    pub name: String,
}

/// POST /api/tenants: provision a tenant with one recipe per kind.
pub async fn create_tenant(
    State(app): State<AppState>,
    Json(body): Json<CreateTenantBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    if body.name.trim().is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }
    let db = app.db.clone();
    let result = tokio::task::spawn_blocking(move || {
        let tenant = db.provision_tenant(body.name.trim())?;
        let recipes = db.list_recipes(&tenant.id)?;
        Ok::<_, appforge_core::ForgeError>(serde_json::json!({
            "id": tenant.id,
            "name": tenant.name,
            "deploying": tenant.deploying,
            "recipes": recipes.iter().map(recipe_json).collect::<Vec<_>>(),
            "created_at": tenant.created_at,
        }))
    })
    .await
    .map_err(AppError::join)??;

    Ok((StatusCode::CREATED, Json(result)))
}

/// GET /api/tenants/{id}: tenant detail with per-recipe status summary.
pub async fn get_tenant(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let db = app.db.clone();
    let result = tokio::task::spawn_blocking(move || {
        let tenant = db.get_tenant(&id)?;
        let recipes = db.list_recipes(&id)?;
        let all_applied = db.all_applied(&id)?;
        Ok::<_, appforge_core::ForgeError>(serde_json::json!({
            "id": tenant.id,
            "name": tenant.name,
            "deploying": tenant.deploying,
            "all_applied": all_applied,
            "recipes": recipes.iter().map(recipe_json).collect::<Vec<_>>(),
            "created_at": tenant.created_at,
            "updated_at": tenant.updated_at,
        }))
    })
    .await
    .map_err(AppError::join)??;

    Ok(Json(result))
}

/// DELETE /api/tenants/{id}: remove a tenant and its recipes.
pub async fn delete_tenant(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let db = app.db.clone();
    let deleted = id.clone();
    tokio::task::spawn_blocking(move || db.delete_tenant(&id))
        .await
        .map_err(AppError::join)??;

    Ok(Json(serde_json::json!({ "deleted": deleted })))
}
