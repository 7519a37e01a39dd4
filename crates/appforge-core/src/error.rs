use thiserror::Error;

use crate::gateway::GatewayError;

#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("not initialized: run 'appforge init'")]
    NotInitialized,

    #[error("tenant not found: {0}")]
    TenantNotFound(String),

    #[error("tenant already exists: {0}")]
    TenantExists(String),

    #[error("recipe not found: {tenant}/{kind}")]
    RecipeNotFound { tenant: String, kind: String },

    #[error("unknown recipe kind: {0}")]
    UnknownRecipeKind(String),

    #[error("invalid apply status: {0}")]
    InvalidApplyStatus(String),

    #[error("invalid slug '{0}': must be lowercase alphanumeric with hyphens")]
    InvalidSlug(String),

    #[error("tenant name must not be blank")]
    BlankTenantName,

    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("tenant '{0}' has a deployment in progress")]
    DeploymentInProgress(String),

    #[error("recipe config rejected: {0}")]
    ConfigRejected(String),

    #[error("packaging failed: {0}")]
    Packaging(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    #[error("deployment worker for '{0}' panicked")]
    WorkerPanicked(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ForgeError>;
