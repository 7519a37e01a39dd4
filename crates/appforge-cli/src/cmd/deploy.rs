use crate::output::print_json;
use appforge_core::credentials::{CredentialSource, EnvCredentials};
use appforge_core::gateway;
use appforge_core::orchestrator::{DeployRequest, Orchestrator};
use std::path::Path;

use super::open_project;
use super::tenant::print_recipes;

/// Request a deployment and wait for the worker.
///
/// The worker thread lives in this process, so the command always waits for
/// it to exit before returning.
pub fn run(root: &Path, tenant: &str, region: Option<&str>, json: bool) -> anyhow::Result<()> {
    let (config, db) = open_project(root)?;
    config.ensure_valid()?;

    // redb holds an exclusive file lock, so no other worker can be alive
    // while this process has the database open. Any held gate is stale.
    let recovered = db.startup_recovery()?;
    if recovered.recipes_failed > 0 || recovered.gates_released > 0 {
        tracing::warn!(
            recipes_failed = recovered.recipes_failed,
            gates_released = recovered.gates_released,
            "recovered an interrupted deployment"
        );
    }

    let mut credentials =
        EnvCredentials::new(config.gateway.default_region.clone()).resolve(tenant)?;
    if let Some(region) = region {
        credentials.region = region.to_string();
    }

    let gateways = gateway::factory_from_config(&config)?;
    let orchestrator = Orchestrator::from_config(root, &config, db.clone(), gateways);
    let request = orchestrator.request_deployment(tenant, credentials)?;
    let status = request.status();

    let report = match request {
        DeployRequest::Started(handle) => Some(handle.join()?),
        DeployRequest::AlreadyRunning | DeployRequest::NothingToDo => None,
    };
    let recipes = db.list_recipes(tenant)?;

    if json {
        return print_json(&serde_json::json!({
            "status": status,
            "report": report,
            "recipes": recipes,
        }));
    }

    println!("Deployment {status} for tenant {tenant}");
    if let Some(report) = &report {
        println!(
            "Rounds: {}  Converged: {}",
            report.rounds,
            if report.converged { "yes" } else { "no" }
        );
    }
    println!();
    print_recipes(&recipes);
    Ok(())
}
