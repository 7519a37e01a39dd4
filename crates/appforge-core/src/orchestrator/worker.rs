use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::{BundleConfig, OrchestratorConfig};
use crate::credentials::Credentials;
use crate::db::TenantDb;
use crate::error::{ForgeError, Result};
use crate::gateway::GatewayFactory;
use crate::packager::Packager;
use crate::pipeline::{Pipeline, PipelineContext};
use crate::recipe::Recipe;
use crate::types::RecipeKind;

// ---------------------------------------------------------------------------
// RunReport / WorkerHandle
// ---------------------------------------------------------------------------

/// Summary of one worker run, returned by [`WorkerHandle::join`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub tenant_id: String,
    /// Rounds that attempted at least one recipe.
    pub rounds: u32,
    /// True iff no recipe was left `None` or `Failed` when the worker exited.
    pub converged: bool,
    /// Pipeline attempts per recipe kind.
    pub attempts: BTreeMap<RecipeKind, u32>,
    /// Recipes whose pipeline panicked. They are recorded `Failed` once and
    /// not retried for the rest of the run.
    pub panicked: BTreeSet<RecipeKind>,
}

/// Handle to a detached deployment worker. Dropping it does not stop the worker.
#[derive(Debug)]
pub struct WorkerHandle {
    tenant_id: String,
    handle: JoinHandle<Result<RunReport>>,
}

impl WorkerHandle {
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the worker exits.
    pub fn join(self) -> Result<RunReport> {
        self.handle
            .join()
            .map_err(|_| ForgeError::WorkerPanicked(self.tenant_id))?
    }
}

// ---------------------------------------------------------------------------
// GateGuard
// ---------------------------------------------------------------------------

/// Releases the tenant's exclusion gate when dropped, on every exit path
/// of the worker including errors and unwinding.
pub(crate) struct GateGuard {
    db: Arc<TenantDb>,
    tenant_id: String,
}

impl GateGuard {
    /// Take ownership of a gate the caller has already acquired.
    pub(crate) fn adopt(db: Arc<TenantDb>, tenant_id: impl Into<String>) -> Self {
        Self {
            db,
            tenant_id: tenant_id.into(),
        }
    }
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        match self.db.release_gate(&self.tenant_id) {
            Ok(()) => info!(tenant = %self.tenant_id, "deployment gate released"),
            Err(e) => error!(
                tenant = %self.tenant_id,
                error = %e,
                "failed to release deployment gate; run recovery"
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

enum Attempt {
    /// The recipe was no longer pending.
    Skipped,
    Finished,
    Panicked,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

pub(crate) struct Worker {
    pub(crate) db: Arc<TenantDb>,
    pub(crate) gateways: Arc<dyn GatewayFactory>,
    pub(crate) packager: Packager,
    pub(crate) bundle: BundleConfig,
    pub(crate) settings: OrchestratorConfig,
    pub(crate) tenant_id: String,
    pub(crate) credentials: Credentials,
}

impl Worker {
    /// Start the worker on its own thread. `gate` moves into the thread, so
    /// the gate is released even if the thread cannot be spawned.
    pub(crate) fn spawn(self, gate: GateGuard) -> Result<WorkerHandle> {
        let tenant_id = self.tenant_id.clone();
        let handle = std::thread::Builder::new()
            .name(format!("deploy-{tenant_id}"))
            .spawn(move || {
                let _gate = gate;
                let result = self.run();
                if let Err(e) = &result {
                    error!(tenant = %self.tenant_id, error = %e, "deployment run aborted");
                }
                result
            })?;
        Ok(WorkerHandle { tenant_id, handle })
    }

    fn run(&self) -> Result<RunReport> {
        let mut report = RunReport {
            tenant_id: self.tenant_id.clone(),
            ..RunReport::default()
        };

        let gateway = match self.gateways.open(&self.credentials) {
            Ok(gateway) => gateway,
            Err(e) => {
                warn!(tenant = %self.tenant_id, error = %e, "cannot open gateway session");
                self.fail_pending(&format!("gateway session: {e}"))?;
                return Ok(report);
            }
        };
        let ctx = PipelineContext {
            gateway: gateway.as_ref(),
            packager: &self.packager,
            bundle: &self.bundle,
        };

        for round in 1..=self.settings.max_rounds {
            let pending = self.retryable(&report)?;
            if pending.is_empty() {
                break;
            }
            report.rounds = round;
            info!(
                tenant = %self.tenant_id,
                round,
                pending = pending.len(),
                "deployment round"
            );

            for recipe in pending {
                match self.attempt(&ctx, recipe.kind, round)? {
                    Attempt::Skipped => continue,
                    Attempt::Finished => {}
                    Attempt::Panicked => {
                        report.panicked.insert(recipe.kind);
                    }
                }
                *report.attempts.entry(recipe.kind).or_default() += 1;
            }

            if round < self.settings.max_rounds {
                let remaining = self.retryable(&report)?.len();
                if remaining > 0 {
                    info!(
                        tenant = %self.tenant_id,
                        round,
                        remaining,
                        backoff_secs = self.settings.backoff_secs,
                        "recipes left, retrying soon"
                    );
                    std::thread::sleep(self.settings.backoff());
                }
            }
        }

        report.converged = self.db.all_applied(&self.tenant_id)?;
        if report.converged {
            info!(tenant = %self.tenant_id, rounds = report.rounds, "deployment converged");
        } else if !report.panicked.is_empty() {
            error!(
                tenant = %self.tenant_id,
                rounds = report.rounds,
                panicked = ?report.panicked,
                "deployment stopped short: pipelines panicked and need operator attention"
            );
        } else {
            warn!(
                tenant = %self.tenant_id,
                rounds = report.rounds,
                "retry budget exhausted with recipes still failing"
            );
        }
        Ok(report)
    }

    /// Pending recipes, minus those quarantined after a panic.
    fn retryable(&self, report: &RunReport) -> Result<Vec<Recipe>> {
        let mut pending = self.db.pending_recipes(&self.tenant_id)?;
        pending.retain(|r| !report.panicked.contains(&r.kind));
        Ok(pending)
    }

    /// Run one recipe through its pipeline and record the outcome.
    ///
    /// Step failures and panics are recorded as `Failed` and never escape.
    /// Only persistence errors propagate.
    fn attempt(&self, ctx: &PipelineContext<'_>, kind: RecipeKind, round: u32) -> Result<Attempt> {
        let Some(recipe) = self.db.begin_attempt(&self.tenant_id, kind)? else {
            return Ok(Attempt::Skipped);
        };
        let mut result = Attempt::Finished;
        let pipeline = Pipeline::for_recipe(kind, &self.tenant_id);

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| pipeline.run(ctx, &recipe))) {
            Ok(Ok(endpoint)) => {
                info!(
                    tenant = %self.tenant_id,
                    recipe = %kind,
                    round,
                    endpoint = %endpoint,
                    "recipe deployed"
                );
                Ok(Some(endpoint))
            }
            Ok(Err(e)) => {
                warn!(
                    tenant = %self.tenant_id,
                    recipe = %kind,
                    round,
                    step = e.step,
                    error = %e.source,
                    "recipe deployment failed"
                );
                Err(e.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(
                    tenant = %self.tenant_id,
                    recipe = %kind,
                    round,
                    panic = %message,
                    "pipeline panicked; recipe will not be retried in this run"
                );
                result = Attempt::Panicked;
                Err(format!("pipeline panicked: {message}"))
            }
        };

        self.db
            .record_outcome(&self.tenant_id, kind, recipe.revision, outcome)?;
        Ok(result)
    }

    /// Record a run-level failure against every pending recipe.
    fn fail_pending(&self, diagnostic: &str) -> Result<()> {
        for recipe in self.db.pending_recipes(&self.tenant_id)? {
            let Some(recipe) = self.db.begin_attempt(&self.tenant_id, recipe.kind)? else {
                continue;
            };
            self.db.record_outcome(
                &self.tenant_id,
                recipe.kind,
                recipe.revision,
                Err(diagnostic.to_string()),
            )?;
        }
        Ok(())
    }
}
