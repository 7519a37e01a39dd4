use anyhow::Context;
use appforge_core::config::{Config, GatewayKind};
use appforge_core::db::TenantDb;
use appforge_core::{io, paths};
use std::path::Path;

const HANDLER_TEMPLATE: &str = r#"import json
import os

HERE = os.path.dirname(__file__)


def _artifact(name):
    with open(os.path.join(HERE, name)) as f:
        return f.read()


TENANT_ID = _artifact("tenant_id.txt").strip()
RECIPE = json.loads(_artifact("recipe.json"))


def handle(event, context):
    return {
        "statusCode": 200,
        "body": json.dumps({"tenant": TENANT_ID, "kind": RECIPE["kind"]}),
    }
"#;

pub fn run(root: &Path, endpoint: Option<&str>) -> anyhow::Result<()> {
    println!("Initializing appforge in: {}", root.display());

    let dir = paths::appforge_dir(root);
    io::ensure_dir(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let config_path = paths::config_path(root);
    let config = if config_path.exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
        Config::load(root)?
    } else {
        let mut cfg = Config::new();
        match endpoint {
            Some(url) => {
                cfg.gateway.kind = GatewayKind::Http;
                cfg.gateway.endpoint = Some(url.to_string());
            }
            None => cfg.gateway.kind = GatewayKind::Memory,
        }
        cfg.ensure_valid()?;
        cfg.save(root).context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
        cfg
    };

    for w in config.validate() {
        eprintln!("  {w}");
    }

    TenantDb::open(&paths::db_path(root))
        .with_context(|| format!("failed to create {}", paths::DB_FILE))?;
    println!("  ready:   {}", paths::DB_FILE);

    let handler = config.source_dir(root).join("handler.py");
    if io::write_if_missing(&handler, HANDLER_TEMPLATE.as_bytes())? {
        println!("  created: {}", handler.strip_prefix(root).unwrap_or(&handler).display());
    }

    println!("\nappforge initialized. Next: appforge tenant create <name>");
    Ok(())
}
