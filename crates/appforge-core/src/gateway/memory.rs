use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use sha2::{Digest, Sha256};

use super::{
    CloudGateway, FunctionSpec, GatewayError, GatewayFactory, RoleHandle, StoreSchema,
};
use crate::credentials::Credentials;
use crate::types::StoreKind;

/// A function as the in-memory platform stores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRecord {
    pub runtime: String,
    pub handler: String,
    pub role: RoleHandle,
    /// Hex SHA-256 of the current code archive.
    pub code_digest: String,
    /// Starts at 1 on create; bumped by every code update.
    pub version: u32,
}

#[derive(Default)]
struct State {
    region: Option<String>,
    roles: BTreeSet<String>,
    functions: BTreeMap<String, FunctionRecord>,
    entry_points: BTreeMap<String, String>,
    stores: BTreeMap<(StoreKind, String), StoreSchema>,
    sessions: usize,
}

/// In-process platform for local runs and tests.
///
/// Cloning shares state, so the handle given to an orchestrator can be
/// inspected afterwards.
#[derive(Clone, Default)]
pub struct MemoryGateway {
    state: Arc<Mutex<State>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn function(&self, name: &str) -> Option<FunctionRecord> {
        self.lock().functions.get(name).cloned()
    }

    pub fn entry_point(&self, api_name: &str) -> Option<String> {
        self.lock().entry_points.get(api_name).cloned()
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.lock().roles.contains(name)
    }

    pub fn store(&self, kind: StoreKind, name: &str) -> Option<StoreSchema> {
        self.lock().stores.get(&(kind, name.to_string())).cloned()
    }

    /// Number of sessions opened through [`GatewayFactory::open`].
    pub fn sessions(&self) -> usize {
        self.lock().sessions
    }
}

fn digest(archive: &[u8]) -> String {
    format!("{:x}", Sha256::digest(archive))
}

impl CloudGateway for MemoryGateway {
    fn ensure_role(&self, name: &str) -> Result<RoleHandle, GatewayError> {
        let mut state = self.lock();
        state.roles.insert(name.to_string());
        let region = state.region.clone().unwrap_or_else(|| "local".to_string());
        Ok(RoleHandle(format!("role:{region}:{name}")))
    }

    fn create_function(&self, spec: &FunctionSpec<'_>) -> Result<(), GatewayError> {
        let mut state = self.lock();
        if state.functions.contains_key(spec.name) {
            return Err(GatewayError::AlreadyExists(spec.name.to_string()));
        }
        state.functions.insert(
            spec.name.to_string(),
            FunctionRecord {
                runtime: spec.runtime.to_string(),
                handler: spec.handler.to_string(),
                role: spec.role.clone(),
                code_digest: digest(spec.archive),
                version: 1,
            },
        );
        Ok(())
    }

    fn update_function_code(&self, name: &str, archive: &[u8]) -> Result<(), GatewayError> {
        let mut state = self.lock();
        let func = state
            .functions
            .get_mut(name)
            .ok_or_else(|| GatewayError::NotFound(name.to_string()))?;
        func.code_digest = digest(archive);
        func.version += 1;
        Ok(())
    }

    fn connect_entry_point(
        &self,
        api_name: &str,
        function_name: &str,
    ) -> Result<String, GatewayError> {
        let mut state = self.lock();
        if !state.functions.contains_key(function_name) {
            return Err(GatewayError::NotFound(function_name.to_string()));
        }
        let region = state.region.clone().unwrap_or_else(|| "local".to_string());
        let url = format!("memory://{region}/{api_name}");
        state.entry_points.insert(api_name.to_string(), url.clone());
        Ok(url)
    }

    fn init_backing_store(
        &self,
        kind: StoreKind,
        name: &str,
        schema: &StoreSchema,
    ) -> Result<(), GatewayError> {
        self.lock()
            .stores
            .entry((kind, name.to_string()))
            .or_insert_with(|| schema.clone());
        Ok(())
    }
}

impl GatewayFactory for MemoryGateway {
    fn open(&self, credentials: &Credentials) -> Result<Arc<dyn CloudGateway>, GatewayError> {
        {
            let mut state = self.lock();
            state.sessions += 1;
            state.region = Some(credentials.region.clone());
        }
        Ok(Arc::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::FunctionUpsert;

    fn spec<'a>(role: &'a RoleHandle, archive: &'a [u8]) -> FunctionSpec<'a> {
        FunctionSpec {
            name: "auth-shop",
            description: "auth",
            runtime: "python3.6",
            role,
            handler: "service.handler.handle",
            archive,
        }
    }

    #[test]
    fn upsert_creates_then_updates() {
        let gw = MemoryGateway::new();
        let role = gw.ensure_role("auth-shop").unwrap();

        assert_eq!(gw.upsert_function(&spec(&role, b"v1")), Ok(FunctionUpsert::Created));
        let first = gw.function("auth-shop").unwrap();
        assert_eq!(first.version, 1);

        assert_eq!(gw.upsert_function(&spec(&role, b"v2")), Ok(FunctionUpsert::Updated));
        let second = gw.function("auth-shop").unwrap();
        assert_eq!(second.version, 2);
        assert_ne!(first.code_digest, second.code_digest);
    }

    #[test]
    fn ensure_role_is_idempotent() {
        let gw = MemoryGateway::new();
        let a = gw.ensure_role("r").unwrap();
        let b = gw.ensure_role("r").unwrap();
        assert_eq!(a, b);
        assert!(gw.has_role("r"));
    }

    #[test]
    fn entry_point_requires_function() {
        let gw = MemoryGateway::new();
        assert!(matches!(
            gw.connect_entry_point("auth-shop", "auth-shop"),
            Err(GatewayError::NotFound(_))
        ));
    }

    #[test]
    fn backing_store_keeps_first_schema() {
        let gw = MemoryGateway::new();
        let schema = StoreSchema {
            indexes: vec![super::super::StoreIndex {
                hash_key: "partition".into(),
                hash_key_type: "S".into(),
                sort_key: "email".into(),
                sort_key_type: "S".into(),
            }],
        };
        gw.init_backing_store(StoreKind::Table, "auth-shop", &schema).unwrap();
        gw.init_backing_store(StoreKind::Table, "auth-shop", &StoreSchema::default())
            .unwrap();
        assert_eq!(gw.store(StoreKind::Table, "auth-shop"), Some(schema));
        assert!(gw.store(StoreKind::Bucket, "auth-shop").is_none());
    }

    #[test]
    fn sessions_share_state_and_take_region() {
        let gw = MemoryGateway::new();
        let session = gw
            .open(&Credentials::new("a", "s", "eu-west-1"))
            .unwrap();
        let role = session.ensure_role("db-shop").unwrap();
        assert_eq!(role.0, "role:eu-west-1:db-shop");
        assert!(gw.has_role("db-shop"));
        assert_eq!(gw.sessions(), 1);
    }
}
