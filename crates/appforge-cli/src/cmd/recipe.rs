use crate::output::print_json;
use anyhow::Context;
use appforge_core::error::ForgeError;
use appforge_core::types::RecipeKind;
use clap::Subcommand;
use std::path::{Path, PathBuf};

use super::open_project;

#[derive(Subcommand)]
pub enum RecipeSubcommand {
    /// Show a recipe's status and configuration
    Show { tenant: String, kind: RecipeKind },
    /// Replace a recipe's configuration (resets its status to none)
    SetConfig {
        tenant: String,
        kind: RecipeKind,
        /// New configuration as a JSON object
        #[arg(conflicts_with = "file", required_unless_present = "file")]
        config: Option<String>,
        /// Read the configuration from a JSON file
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Set individual top-level keys (KEY=VALUE, VALUE parsed as JSON when possible)
    Set {
        tenant: String,
        kind: RecipeKind,
        #[arg(required = true)]
        pairs: Vec<String>,
    },
}

pub fn run(root: &Path, subcmd: RecipeSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        RecipeSubcommand::Show { tenant, kind } => show(root, &tenant, kind, json),
        RecipeSubcommand::SetConfig {
            tenant,
            kind,
            config,
            file,
        } => {
            let raw = match (config, file) {
                (Some(c), _) => c,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                (None, None) => anyhow::bail!("either CONFIG or --file is required"),
            };
            set_config(root, &tenant, kind, &raw, json)
        }
        RecipeSubcommand::Set { tenant, kind, pairs } => set(root, &tenant, kind, &pairs, json),
    }
}

fn show(root: &Path, tenant: &str, kind: RecipeKind, json: bool) -> anyhow::Result<()> {
    let (_, db) = open_project(root)?;
    let recipe = db.get_recipe(tenant, kind)?;
    if json {
        return print_json(&recipe);
    }
    println!("Recipe:   {}/{}", recipe.tenant_id, recipe.kind);
    println!("Status:   {}", recipe.apply_status);
    println!("Revision: {}", recipe.revision);
    if let Some(endpoint) = &recipe.endpoint {
        println!("Endpoint: {endpoint}");
    }
    if let Some(err) = &recipe.last_error {
        println!("Error:    {err}");
    }
    println!("Config:\n{}", serde_json::to_string_pretty(&recipe.config)?);
    Ok(())
}

fn set_config(
    root: &Path,
    tenant: &str,
    kind: RecipeKind,
    raw: &str,
    json: bool,
) -> anyhow::Result<()> {
    let config: serde_json::Value =
        serde_json::from_str(raw).context("configuration is not valid JSON")?;
    if !config.is_object() {
        anyhow::bail!("configuration must be a JSON object");
    }
    let (_, db) = open_project(root)?;
    let recipe = db.set_recipe_config(tenant, kind, config)?;
    report(&recipe, json)
}

fn set(
    root: &Path,
    tenant: &str,
    kind: RecipeKind,
    pairs: &[String],
    json: bool,
) -> anyhow::Result<()> {
    let (_, db) = open_project(root)?;
    let recipe = db.edit_recipe_config(tenant, kind, |config| {
        let map = config
            .as_object_mut()
            .ok_or_else(|| ForgeError::ConfigRejected("current config is not an object".into()))?;
        for pair in pairs {
            let (key, value) = pair
                .split_once('=')
                .filter(|(k, _)| !k.is_empty())
                .ok_or_else(|| {
                    ForgeError::ConfigRejected(format!("expected KEY=VALUE, got '{pair}'"))
                })?;
            let value = serde_json::from_str(value)
                .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
            map.insert(key.to_string(), value);
        }
        Ok(())
    })?;
    report(&recipe, json)
}

fn report(recipe: &appforge_core::recipe::Recipe, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(recipe);
    }
    println!(
        "Updated {}/{} to revision {} (status: {})",
        recipe.tenant_id, recipe.kind, recipe.revision, recipe.apply_status
    );
    Ok(())
}
