//! Per-tenant deployment orchestration.
//!
//! [`Orchestrator::request_deployment`] is the single entry point. It returns
//! immediately; the actual work happens on a detached worker thread that
//! retries the tenant's pending recipes for a bounded number of rounds. The
//! tenant's `deploying` flag guarantees at most one worker per tenant.

mod worker;

pub use worker::{RunReport, WorkerHandle};

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{BundleConfig, Config, OrchestratorConfig};
use crate::credentials::Credentials;
use crate::db::TenantDb;
use crate::error::Result;
use crate::gateway::GatewayFactory;
use crate::packager::Packager;
use worker::{GateGuard, Worker};

// ---------------------------------------------------------------------------
// DeployStatus / DeployRequest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployStatus {
    Started,
    AlreadyRunning,
    NothingToDo,
}

impl DeployStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeployStatus::Started => "started",
            DeployStatus::AlreadyRunning => "already_running",
            DeployStatus::NothingToDo => "nothing_to_do",
        }
    }
}

impl fmt::Display for DeployStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of [`Orchestrator::request_deployment`].
#[derive(Debug)]
pub enum DeployRequest {
    /// A worker was spawned. Joining the handle is optional.
    Started(WorkerHandle),
    /// Another worker already holds the tenant's gate.
    AlreadyRunning,
    /// Every recipe is already applied; no worker was spawned.
    NothingToDo,
}

impl DeployRequest {
    pub fn status(&self) -> DeployStatus {
        match self {
            DeployRequest::Started(_) => DeployStatus::Started,
            DeployRequest::AlreadyRunning => DeployStatus::AlreadyRunning,
            DeployRequest::NothingToDo => DeployStatus::NothingToDo,
        }
    }

    pub fn into_handle(self) -> Option<WorkerHandle> {
        match self {
            DeployRequest::Started(handle) => Some(handle),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Orchestrator {
    db: Arc<TenantDb>,
    gateways: Arc<dyn GatewayFactory>,
    packager: Packager,
    bundle: BundleConfig,
    settings: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        db: Arc<TenantDb>,
        gateways: Arc<dyn GatewayFactory>,
        packager: Packager,
        bundle: BundleConfig,
        settings: OrchestratorConfig,
    ) -> Self {
        Self {
            db,
            gateways,
            packager,
            bundle,
            settings,
        }
    }

    /// Wire an orchestrator from the project config rooted at `root`.
    pub fn from_config(
        root: &Path,
        config: &Config,
        db: Arc<TenantDb>,
        gateways: Arc<dyn GatewayFactory>,
    ) -> Self {
        Self::new(
            db,
            gateways,
            Packager::new(config.source_dir(root)),
            config.bundle.clone(),
            config.orchestrator.clone(),
        )
    }

    pub fn db(&self) -> &Arc<TenantDb> {
        &self.db
    }

    /// Drive every pending recipe of `tenant_id` towards `Success`.
    ///
    /// Returns without waiting for the worker. Errors only for unknown
    /// tenants, unusable credentials or persistence failures; deployment
    /// failures surface exclusively through each recipe's `apply_status`.
    pub fn request_deployment(
        &self,
        tenant_id: &str,
        credentials: Credentials,
    ) -> Result<DeployRequest> {
        if self.db.all_applied(tenant_id)? {
            info!(tenant = %tenant_id, outcome = "nothing_to_do", "deployment requested");
            return Ok(DeployRequest::NothingToDo);
        }
        credentials.validate()?;
        if !self.db.try_acquire_gate(tenant_id)? {
            info!(tenant = %tenant_id, outcome = "already_running", "deployment requested");
            return Ok(DeployRequest::AlreadyRunning);
        }

        let gate = GateGuard::adopt(Arc::clone(&self.db), tenant_id);
        let worker = Worker {
            db: Arc::clone(&self.db),
            gateways: Arc::clone(&self.gateways),
            packager: self.packager.clone(),
            bundle: self.bundle.clone(),
            settings: self.settings.clone(),
            tenant_id: tenant_id.to_string(),
            credentials,
        };
        let handle = worker.spawn(gate)?;
        info!(tenant = %tenant_id, outcome = "started", "deployment requested");
        Ok(DeployRequest::Started(handle))
    }
}
