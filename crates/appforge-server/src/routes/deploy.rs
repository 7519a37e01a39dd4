use axum::extract::{Path, State};
use axum::Json;

use appforge_core::credentials::Credentials;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Default, serde::Deserialize)]
pub struct DeployBody {
    /// Per-call credentials. Falls back to the server's credential source.
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

/// POST /api/tenants/{id}/deploy: request a deployment run.
///
/// Returns as soon as the worker is spawned (or refused); progress is
/// observable through the recipes' `apply_status`.
pub async fn request_deployment(
    State(app): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<DeployBody>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let orchestrator = app.orchestrator.clone();
    let source = app.credentials.clone();
    let status = tokio::task::spawn_blocking(move || {
        let credentials = match body.credentials {
            Some(c) => c,
            None => source.resolve(&id)?,
        };
        let request = orchestrator.request_deployment(&id, credentials)?;
        Ok::<_, appforge_core::ForgeError>(request.status())
    })
    .await
    .map_err(AppError::join)??;

    Ok(Json(serde_json::json!({ "status": status })))
}
