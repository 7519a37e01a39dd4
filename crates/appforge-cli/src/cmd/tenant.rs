use crate::output::{print_json, print_table};
use appforge_core::recipe::Recipe;
use clap::Subcommand;
use std::path::Path;

use super::open_project;

#[derive(Subcommand)]
pub enum TenantSubcommand {
    /// Provision a tenant with one recipe per kind
    Create { name: String },
    /// List all tenants
    List,
    /// Show a tenant and the status of each recipe
    Show { id: String },
    /// Delete a tenant and its recipes (refused while deploying)
    Delete { id: String },
}

pub fn run(root: &Path, subcmd: TenantSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        TenantSubcommand::Create { name } => create(root, &name, json),
        TenantSubcommand::List => list(root, json),
        TenantSubcommand::Show { id } => show(root, &id, json),
        TenantSubcommand::Delete { id } => delete(root, &id, json),
    }
}

fn create(root: &Path, name: &str, json: bool) -> anyhow::Result<()> {
    let (_, db) = open_project(root)?;
    let tenant = db.provision_tenant(name)?;
    if json {
        print_json(&tenant)?;
    } else {
        println!("Created tenant: {} ({})", tenant.id, tenant.name);
    }
    Ok(())
}

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let (_, db) = open_project(root)?;
    let tenants = db.list_tenants()?;
    if json {
        return print_json(&tenants);
    }
    if tenants.is_empty() {
        println!("No tenants.");
        return Ok(());
    }
    let rows = tenants
        .iter()
        .map(|t| {
            vec![
                t.id.clone(),
                t.name.clone(),
                if t.deploying { "yes" } else { "no" }.to_string(),
                t.created_at.format("%Y-%m-%d %H:%M").to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "DEPLOYING", "CREATED"], rows);
    Ok(())
}

pub(crate) fn print_recipes(recipes: &[Recipe]) {
    let rows = recipes
        .iter()
        .map(|r| {
            vec![
                r.kind.to_string(),
                r.apply_status.to_string(),
                r.revision.to_string(),
                r.endpoint.clone().unwrap_or_else(|| "-".into()),
                r.last_error.clone().unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["KIND", "STATUS", "REV", "ENDPOINT", "LAST ERROR"], rows);
}

fn show(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let (_, db) = open_project(root)?;
    let tenant = db.get_tenant(id)?;
    let recipes = db.list_recipes(id)?;
    let all_applied = db.all_applied(id)?;
    if json {
        return print_json(&serde_json::json!({
            "tenant": tenant,
            "all_applied": all_applied,
            "recipes": recipes,
        }));
    }
    println!("Tenant:      {} ({})", tenant.id, tenant.name);
    println!("Deploying:   {}", tenant.deploying);
    println!("All applied: {all_applied}");
    println!();
    print_recipes(&recipes);
    Ok(())
}

fn delete(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let (_, db) = open_project(root)?;
    db.delete_tenant(id)?;
    if json {
        print_json(&serde_json::json!({ "deleted": id }))?;
    } else {
        println!("Deleted tenant: {id}");
    }
    Ok(())
}
