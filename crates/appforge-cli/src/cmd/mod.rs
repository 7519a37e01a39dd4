pub mod deploy;
pub mod init;
pub mod recipe;
pub mod recover;
pub mod serve;
pub mod tenant;

use anyhow::Context;
use appforge_core::config::Config;
use appforge_core::db::TenantDb;
use appforge_core::paths;
use std::path::Path;
use std::sync::Arc;

/// Load the project config and open its database.
pub(crate) fn open_project(root: &Path) -> anyhow::Result<(Config, Arc<TenantDb>)> {
    let config = Config::load(root)?;
    let db = TenantDb::open(&paths::db_path(root))
        .with_context(|| format!("failed to open {}", paths::DB_FILE))?;
    Ok((config, Arc::new(db)))
}
