pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post, put};
use axum::Router;
use std::path::PathBuf;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(routes::health::health))
        // Tenants
        .route(
            "/api/tenants",
            get(routes::tenants::list_tenants).post(routes::tenants::create_tenant),
        )
        .route(
            "/api/tenants/{id}",
            get(routes::tenants::get_tenant).delete(routes::tenants::delete_tenant),
        )
        // Recipes
        .route(
            "/api/tenants/{id}/recipes/{kind}",
            get(routes::recipes::get_recipe),
        )
        .route(
            "/api/tenants/{id}/recipes/{kind}/config",
            put(routes::recipes::put_recipe_config),
        )
        // Deployment
        .route(
            "/api/tenants/{id}/deploy",
            post(routes::deploy::request_deployment),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Open the project at `root`, repair state left by a previous process and
/// serve the API on `port`.
pub async fn serve(root: PathBuf, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    serve_on(root, listener).await
}

/// Like [`serve`], on a pre-bound listener (useful with port 0).
pub async fn serve_on(root: PathBuf, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let app_state = tokio::task::spawn_blocking(move || {
        let state = AppState::open(root)?;
        let report = state.db.startup_recovery()?;
        if report.recipes_failed > 0 || report.gates_released > 0 {
            tracing::warn!(
                recipes_failed = report.recipes_failed,
                gates_released = report.gates_released,
                "recovered interrupted deployments"
            );
        }
        Ok::<_, appforge_core::ForgeError>(state)
    })
    .await??;

    let port = listener.local_addr()?.port();
    tracing::info!("appforge API listening on http://localhost:{port}");

    axum::serve(listener, build_router(app_state)).await?;
    Ok(())
}
