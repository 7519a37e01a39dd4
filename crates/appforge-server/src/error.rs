use appforge_core::error::ForgeError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

// ---------------------------------------------------------------------------
// Internal sentinel for explicit 400 Bad Request errors
// ---------------------------------------------------------------------------

/// Carries an explicit HTTP 400 through the `anyhow::Error` chain for request
/// problems that have no `ForgeError` counterpart.
#[derive(Debug)]
struct BadRequestError(String);

impl std::fmt::Display for BadRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadRequestError {}

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequestError(msg.into()).into())
    }

    pub(crate) fn join(e: tokio::task::JoinError) -> Self {
        Self(anyhow::anyhow!("task join error: {e}"))
    }
}

fn status_for(e: &ForgeError) -> StatusCode {
    match e {
        ForgeError::NotInitialized => StatusCode::BAD_REQUEST,
        ForgeError::TenantNotFound(_) | ForgeError::RecipeNotFound { .. } => StatusCode::NOT_FOUND,
        ForgeError::TenantExists(_) | ForgeError::DeploymentInProgress(_) => StatusCode::CONFLICT,
        ForgeError::UnknownRecipeKind(_)
        | ForgeError::InvalidApplyStatus(_)
        | ForgeError::InvalidSlug(_)
        | ForgeError::BlankTenantName
        | ForgeError::ConfigRejected(_)
        | ForgeError::MissingCredentials(_) => StatusCode::BAD_REQUEST,
        ForgeError::InvalidTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ForgeError::Gateway(_) => StatusCode::BAD_GATEWAY,
        ForgeError::Packaging(_)
        | ForgeError::Store(_)
        | ForgeError::Config(_)
        | ForgeError::WorkerPanicked(_)
        | ForgeError::Io(_)
        | ForgeError::Yaml(_)
        | ForgeError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = if self.0.downcast_ref::<BadRequestError>().is_some() {
            StatusCode::BAD_REQUEST
        } else if let Some(e) = self.0.downcast_ref::<ForgeError>() {
            status_for(e)
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appforge_core::gateway::GatewayError;

    fn status(e: ForgeError) -> StatusCode {
        AppError(e.into()).into_response().status()
    }

    #[test]
    fn not_found_variants_map_to_404() {
        assert_eq!(status(ForgeError::TenantNotFound("t".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status(ForgeError::RecipeNotFound {
                tenant: "t".into(),
                kind: "auth".into()
            }),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn conflicts_map_to_409() {
        assert_eq!(status(ForgeError::TenantExists("t".into())), StatusCode::CONFLICT);
        assert_eq!(
            status(ForgeError::DeploymentInProgress("t".into())),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn caller_mistakes_map_to_400() {
        assert_eq!(status(ForgeError::UnknownRecipeKind("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(ForgeError::MissingCredentials("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(ForgeError::NotInitialized), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::bad_request("name is empty").into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn gateway_errors_map_to_502() {
        assert_eq!(
            status(GatewayError::Transport("reset".into()).into()),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn internal_errors_map_to_500() {
        assert_eq!(status(ForgeError::Store("corrupt".into())), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            AppError(anyhow::anyhow!("unexpected")).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn response_body_is_json() {
        let response = AppError(ForgeError::TenantNotFound("shop".into()).into()).into_response();
        let ct = response
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .expect("should have content-type");
        assert!(ct.to_str().unwrap().contains("application/json"));
    }
}
