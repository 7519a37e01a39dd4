//! Capability interface to the managed cloud platform.
//!
//! Every operation is idempotent: re-running a whole pipeline against a
//! partially applied tenant converges instead of failing. The gateway keeps
//! no state of its own beyond what the remote platform holds.

mod http;
mod memory;

pub use http::{HttpGateway, HttpGatewayFactory};
pub use memory::{FunctionRecord, MemoryGateway};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::{Config, GatewayKind};
use crate::credentials::Credentials;
use crate::error::{ForgeError, Result};
use crate::types::StoreKind;

// ---------------------------------------------------------------------------
// GatewayError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Creation refused because the resource exists. Callers that can fall
    /// back to an update must do so.
    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("remote error {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Opaque reference to an access role on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleHandle(pub String);

impl std::fmt::Display for RoleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Policies attached to every recipe role.
pub const ROLE_POLICIES: &[&str] = &[
    "function-execution",
    "logs-write",
    "table-full-access",
    "bucket-full-access",
];

/// Everything needed to create or update one remote function.
#[derive(Debug, Clone)]
pub struct FunctionSpec<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub runtime: &'a str,
    pub role: &'a RoleHandle,
    pub handler: &'a str,
    pub archive: &'a [u8],
}

/// Secondary index on a table store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreIndex {
    pub hash_key: String,
    pub hash_key_type: String,
    pub sort_key: String,
    pub sort_key_type: String,
}

/// Shape of a backing store. Buckets ignore `indexes`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSchema {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<StoreIndex>,
}

/// Which path `upsert_function` took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionUpsert {
    Created,
    Updated,
}

// ---------------------------------------------------------------------------
// CloudGateway
// ---------------------------------------------------------------------------

pub trait CloudGateway: Send + Sync {
    /// Create the role with [`ROLE_POLICIES`] if absent; return its handle either way.
    fn ensure_role(&self, name: &str) -> std::result::Result<RoleHandle, GatewayError>;

    /// Create a function. Fails with `AlreadyExists` if the name is taken.
    fn create_function(&self, spec: &FunctionSpec<'_>) -> std::result::Result<(), GatewayError>;

    /// Replace the code of an existing function in place.
    fn update_function_code(
        &self,
        name: &str,
        archive: &[u8],
    ) -> std::result::Result<(), GatewayError>;

    /// Wire a public invocation path to `function_name` and return its URL.
    fn connect_entry_point(
        &self,
        api_name: &str,
        function_name: &str,
    ) -> std::result::Result<String, GatewayError>;

    /// Provision a table or bucket if it does not exist yet.
    fn init_backing_store(
        &self,
        kind: StoreKind,
        name: &str,
        schema: &StoreSchema,
    ) -> std::result::Result<(), GatewayError>;

    /// Create the function, or update its code if it already exists.
    ///
    /// Only `AlreadyExists` triggers the fallback. Any other creation error,
    /// and any error from the update, propagates unchanged.
    fn upsert_function(
        &self,
        spec: &FunctionSpec<'_>,
    ) -> std::result::Result<FunctionUpsert, GatewayError> {
        match self.create_function(spec) {
            Ok(()) => Ok(FunctionUpsert::Created),
            Err(GatewayError::AlreadyExists(_)) => {
                debug!(function = %spec.name, "function exists, updating code");
                self.update_function_code(spec.name, spec.archive)?;
                Ok(FunctionUpsert::Updated)
            }
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// GatewayFactory
// ---------------------------------------------------------------------------

/// Opens a gateway session scoped to one orchestration run.
pub trait GatewayFactory: Send + Sync {
    fn open(
        &self,
        credentials: &Credentials,
    ) -> std::result::Result<Arc<dyn CloudGateway>, GatewayError>;
}

/// Build the factory selected by `gateway.kind`.
pub fn factory_from_config(config: &Config) -> Result<Arc<dyn GatewayFactory>> {
    match config.gateway.kind {
        GatewayKind::Memory => Ok(Arc::new(MemoryGateway::new())),
        GatewayKind::Http => {
            let endpoint = config.gateway.endpoint.clone().ok_or_else(|| {
                ForgeError::Config("gateway.endpoint is required for the http gateway".into())
            })?;
            Ok(Arc::new(HttpGatewayFactory::new(endpoint)))
        }
    }
}
