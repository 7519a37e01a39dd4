use thiserror::Error;
use tracing::{debug, info};

use crate::config::BundleConfig;
use crate::error::ForgeError;
use crate::gateway::{CloudGateway, FunctionSpec, FunctionUpsert, StoreIndex, StoreSchema};
use crate::packager::Packager;
use crate::recipe::Recipe;
use crate::types::{RecipeKind, StoreKind};

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// One idempotent remote operation in a recipe's apply sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Provision a table or bucket the recipe's function depends on.
    InitBackingStore {
        store: StoreKind,
        name: String,
        schema: StoreSchema,
    },
    /// Ensure the role, package the bundle and create-or-update the function.
    ApplyCloudApi,
    /// Wire the public entry point to the function.
    DeployCloudApi,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::InitBackingStore { .. } => "init_backing_store",
            Step::ApplyCloudApi => "apply_cloud_api",
            Step::DeployCloudApi => "deploy_cloud_api",
        }
    }
}

/// A step failed. Always retryable from the orchestrator's point of view.
#[derive(Debug, Error)]
#[error("{step} failed: {source}")]
pub struct StepError {
    pub step: &'static str,
    #[source]
    pub source: ForgeError,
}

impl StepError {
    fn new(step: &Step, source: impl Into<ForgeError>) -> Self {
        Self {
            step: step.name(),
            source: source.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Collaborators a pipeline run needs.
pub struct PipelineContext<'a> {
    pub gateway: &'a dyn CloudGateway,
    pub packager: &'a Packager,
    pub bundle: &'a BundleConfig,
}

/// Ordered apply sequence for one recipe.
///
/// Kind-specific pre-steps come first; `ApplyCloudApi` then `DeployCloudApi`
/// are always the last two steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    steps: Vec<Step>,
}

impl Pipeline {
    pub fn for_recipe(kind: RecipeKind, tenant_id: &str) -> Self {
        let mut steps = pre_steps(kind, &kind.resource_name(tenant_id));
        steps.push(Step::ApplyCloudApi);
        steps.push(Step::DeployCloudApi);
        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Run every step against `recipe`, stopping at the first failure.
    /// Returns the entry-point URL on success.
    pub fn run(&self, ctx: &PipelineContext<'_>, recipe: &Recipe) -> Result<String, StepError> {
        let name = recipe.resource_name();
        let mut endpoint = None;
        for step in &self.steps {
            debug!(
                tenant = %recipe.tenant_id,
                recipe = %recipe.kind,
                step = step.name(),
                "running step"
            );
            match step {
                Step::InitBackingStore {
                    store,
                    name: store_name,
                    schema,
                } => ctx
                    .gateway
                    .init_backing_store(*store, store_name, schema)
                    .map_err(|e| StepError::new(step, e))?,
                Step::ApplyCloudApi => apply_cloud_api(ctx, recipe, &name, step)?,
                Step::DeployCloudApi => {
                    let url = ctx
                        .gateway
                        .connect_entry_point(&name, &name)
                        .map_err(|e| StepError::new(step, e))?;
                    endpoint = Some(url);
                }
            }
        }
        endpoint.ok_or_else(|| {
            StepError::new(
                &Step::DeployCloudApi,
                ForgeError::Config("pipeline has no deploy step".into()),
            )
        })
    }
}

fn apply_cloud_api(
    ctx: &PipelineContext<'_>,
    recipe: &Recipe,
    name: &str,
    step: &Step,
) -> Result<(), StepError> {
    let role = ctx
        .gateway
        .ensure_role(name)
        .map_err(|e| StepError::new(step, e))?;
    let archive = ctx
        .packager
        .package(recipe)
        .map_err(|e| StepError::new(step, e))?;
    let description = format!("{} ({})", ctx.bundle.description, recipe.kind);
    let spec = FunctionSpec {
        name,
        description: &description,
        runtime: &ctx.bundle.runtime,
        role: &role,
        handler: &ctx.bundle.handler,
        archive: &archive,
    };
    let upsert = ctx
        .gateway
        .upsert_function(&spec)
        .map_err(|e| StepError::new(step, e))?;
    info!(
        tenant = %recipe.tenant_id,
        recipe = %recipe.kind,
        function = name,
        created = upsert == FunctionUpsert::Created,
        "function applied"
    );
    Ok(())
}

fn table(name: &str, indexes: Vec<StoreIndex>) -> Step {
    Step::InitBackingStore {
        store: StoreKind::Table,
        name: name.to_string(),
        schema: StoreSchema { indexes },
    }
}

fn pre_steps(kind: RecipeKind, name: &str) -> Vec<Step> {
    match kind {
        RecipeKind::Auth => vec![table(
            name,
            vec![StoreIndex {
                hash_key: "partition".into(),
                hash_key_type: "S".into(),
                sort_key: "email".into(),
                sort_key_type: "S".into(),
            }],
        )],
        RecipeKind::Database | RecipeKind::Logic => vec![table(name, Vec::new())],
        RecipeKind::Storage => vec![
            Step::InitBackingStore {
                store: StoreKind::Bucket,
                name: name.to_string(),
                schema: StoreSchema::default(),
            },
            table(name, Vec::new()),
        ],
        RecipeKind::Bill => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayError, MemoryGateway};
    use tempfile::TempDir;

    fn source_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("handler.py"), "def handle(e, c): pass\n").unwrap();
        dir
    }

    #[test]
    fn universal_steps_are_always_last() {
        for &kind in RecipeKind::all() {
            let steps = Pipeline::for_recipe(kind, "shop").steps().to_vec();
            let n = steps.len();
            assert!(n >= 2);
            assert_eq!(steps[n - 2], Step::ApplyCloudApi, "{kind}");
            assert_eq!(steps[n - 1], Step::DeployCloudApi, "{kind}");
        }
    }

    #[test]
    fn pre_steps_per_kind() {
        assert_eq!(Pipeline::for_recipe(RecipeKind::Bill, "shop").steps().len(), 2);

        let storage = Pipeline::for_recipe(RecipeKind::Storage, "shop");
        let stores: Vec<_> = storage
            .steps()
            .iter()
            .filter_map(|s| match s {
                Step::InitBackingStore { store, name, .. } => Some((*store, name.as_str())),
                _ => None,
            })
            .collect();
        assert_eq!(
            stores,
            vec![
                (StoreKind::Bucket, "storage-shop"),
                (StoreKind::Table, "storage-shop")
            ]
        );

        match &Pipeline::for_recipe(RecipeKind::Auth, "shop").steps()[0] {
            Step::InitBackingStore { schema, .. } => {
                assert_eq!(schema.indexes[0].hash_key, "partition");
                assert_eq!(schema.indexes[0].sort_key, "email");
            }
            other => panic!("unexpected first step {other:?}"),
        }
    }

    #[test]
    fn run_against_memory_gateway_provisions_everything() {
        let src = source_tree();
        let gw = MemoryGateway::new();
        let packager = Packager::new(src.path());
        let bundle = BundleConfig::default();
        let ctx = PipelineContext {
            gateway: &gw,
            packager: &packager,
            bundle: &bundle,
        };
        let recipe = Recipe::new("shop", RecipeKind::Storage);

        let url = Pipeline::for_recipe(recipe.kind, &recipe.tenant_id)
            .run(&ctx, &recipe)
            .unwrap();

        assert_eq!(url, "memory://local/storage-shop");
        assert!(gw.has_role("storage-shop"));
        assert!(gw.store(StoreKind::Bucket, "storage-shop").is_some());
        assert!(gw.store(StoreKind::Table, "storage-shop").is_some());
        let func = gw.function("storage-shop").unwrap();
        assert_eq!(func.runtime, "python3.6");
        assert_eq!(func.handler, "service.handler.handle");
    }

    #[test]
    fn rerun_is_idempotent_and_updates_code() {
        let src = source_tree();
        let gw = MemoryGateway::new();
        let packager = Packager::new(src.path());
        let bundle = BundleConfig::default();
        let ctx = PipelineContext {
            gateway: &gw,
            packager: &packager,
            bundle: &bundle,
        };
        let mut recipe = Recipe::new("shop", RecipeKind::Auth);
        let pipeline = Pipeline::for_recipe(recipe.kind, &recipe.tenant_id);

        pipeline.run(&ctx, &recipe).unwrap();
        recipe.replace_config(serde_json::json!({"login_method": "email"}));
        pipeline.run(&ctx, &recipe).unwrap();

        assert_eq!(gw.function("auth-shop").unwrap().version, 2);
    }

    #[test]
    fn packaging_failure_is_reported_as_apply_step() {
        let dir = TempDir::new().unwrap();
        let gw = MemoryGateway::new();
        let packager = Packager::new(dir.path().join("missing"));
        let bundle = BundleConfig::default();
        let ctx = PipelineContext {
            gateway: &gw,
            packager: &packager,
            bundle: &bundle,
        };
        let recipe = Recipe::new("shop", RecipeKind::Bill);
        let err = Pipeline::for_recipe(recipe.kind, &recipe.tenant_id)
            .run(&ctx, &recipe)
            .unwrap_err();
        assert_eq!(err.step, "apply_cloud_api");
        assert!(matches!(err.source, ForgeError::Packaging(_)));
        assert!(gw.function("bill-shop").is_none());
    }

    #[test]
    fn gateway_failure_carries_step_name() {
        struct Down;
        impl CloudGateway for Down {
            fn ensure_role(&self, _: &str) -> Result<crate::gateway::RoleHandle, GatewayError> {
                Err(GatewayError::Transport("down".into()))
            }
            fn create_function(&self, _: &FunctionSpec<'_>) -> Result<(), GatewayError> {
                unreachable!()
            }
            fn update_function_code(&self, _: &str, _: &[u8]) -> Result<(), GatewayError> {
                unreachable!()
            }
            fn connect_entry_point(&self, _: &str, _: &str) -> Result<String, GatewayError> {
                unreachable!()
            }
            fn init_backing_store(
                &self,
                _: StoreKind,
                _: &str,
                _: &StoreSchema,
            ) -> Result<(), GatewayError> {
                Err(GatewayError::Remote {
                    status: 500,
                    message: "table quota".into(),
                })
            }
        }

        let src = source_tree();
        let packager = Packager::new(src.path());
        let bundle = BundleConfig::default();
        let ctx = PipelineContext {
            gateway: &Down,
            packager: &packager,
            bundle: &bundle,
        };
        let recipe = Recipe::new("shop", RecipeKind::Database);
        let err = Pipeline::for_recipe(recipe.kind, &recipe.tenant_id)
            .run(&ctx, &recipe)
            .unwrap_err();
        assert_eq!(err.step, "init_backing_store");
        assert!(err.to_string().contains("table quota"));
    }
}
