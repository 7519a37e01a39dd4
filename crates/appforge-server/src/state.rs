use std::path::PathBuf;
use std::sync::Arc;

use appforge_core::config::Config;
use appforge_core::credentials::{CredentialSource, EnvCredentials};
use appforge_core::db::TenantDb;
use appforge_core::gateway;
use appforge_core::orchestrator::Orchestrator;
use appforge_core::paths;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub root: PathBuf,
    pub db: Arc<TenantDb>,
    pub orchestrator: Arc<Orchestrator>,
    /// Fallback when a deploy request carries no credentials.
    pub credentials: Arc<dyn CredentialSource>,
}

impl AppState {
    pub fn new(
        root: PathBuf,
        orchestrator: Orchestrator,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            root,
            db: Arc::clone(orchestrator.db()),
            orchestrator: Arc::new(orchestrator),
            credentials,
        }
    }

    /// Load the project at `root`: config, database, gateway and the
    /// environment credential source.
    pub fn open(root: PathBuf) -> appforge_core::Result<Self> {
        let config = Config::load(&root)?;
        config.ensure_valid()?;
        let db = Arc::new(TenantDb::open(&paths::db_path(&root))?);
        let gateways = gateway::factory_from_config(&config)?;
        let orchestrator = Orchestrator::from_config(&root, &config, db, gateways);
        let credentials = Arc::new(EnvCredentials::new(config.gateway.default_region.clone()));
        Ok(Self::new(root, orchestrator, credentials))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_uninitialized_root_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            AppState::open(dir.path().to_path_buf()),
            Err(appforge_core::ForgeError::NotInitialized)
        ));
    }

    #[test]
    fn open_initialized_root_shares_db_with_orchestrator() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::new();
        config.gateway.kind = appforge_core::config::GatewayKind::Memory;
        config.save(dir.path()).unwrap();

        let state = AppState::open(dir.path().to_path_buf()).unwrap();
        assert!(Arc::ptr_eq(&state.db, state.orchestrator.db()));
        assert_eq!(state.root, dir.path());
    }
}
