#![allow(deprecated)]
use appforge_core::db::TenantDb;
use appforge_core::paths;
use appforge_core::types::RecipeKind;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn appforge(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("appforge").unwrap();
    cmd.current_dir(dir.path())
        .env("APPFORGE_ROOT", dir.path())
        .env_remove("APPFORGE_ACCESS_KEY")
        .env_remove("APPFORGE_SECRET_KEY")
        .env_remove("APPFORGE_REGION");
    cmd
}

fn with_credentials(mut cmd: Command) -> Command {
    cmd.env("APPFORGE_ACCESS_KEY", "AKTEST")
        .env("APPFORGE_SECRET_KEY", "secret");
    cmd
}

fn init_project(dir: &TempDir) {
    appforge(dir).arg("init").assert().success();
}

fn create_tenant(dir: &TempDir, name: &str) -> String {
    let out = appforge(dir)
        .args(["tenant", "create", name, "--json"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let tenant: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    tenant["id"].as_str().unwrap().to_string()
}

fn recipe_json(dir: &TempDir, tenant: &str, kind: &str) -> serde_json::Value {
    let out = appforge(dir)
        .args(["recipe", "show", tenant, kind, "--json"])
        .output()
        .unwrap();
    assert!(out.status.success());
    serde_json::from_slice(&out.stdout).unwrap()
}

// ---------------------------------------------------------------------------
// appforge init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_config_db_and_handler() {
    let dir = TempDir::new().unwrap();
    appforge(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("created: .appforge/config.yaml"));

    assert!(dir.path().join(".appforge/config.yaml").exists());
    assert!(dir.path().join(".appforge/appforge.redb").exists());
    assert!(dir.path().join("service/handler.py").exists());
    let config = std::fs::read_to_string(dir.path().join(".appforge/config.yaml")).unwrap();
    assert!(config.contains("kind: memory"));
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    appforge(&dir).arg("init").assert().success();
    appforge(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:  .appforge/config.yaml"));
}

#[test]
fn init_with_bad_endpoint_fails() {
    let dir = TempDir::new().unwrap();
    appforge(&dir)
        .args(["init", "--endpoint", "ftp://nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not an http(s) URL"));
}

#[test]
fn commands_before_init_fail() {
    let dir = TempDir::new().unwrap();
    appforge(&dir)
        .args(["tenant", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not initialized"));
}

// ---------------------------------------------------------------------------
// appforge tenant
// ---------------------------------------------------------------------------

#[test]
fn tenant_create_list_show_delete() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let id = create_tenant(&dir, "Acme Shop");
    assert!(id.starts_with("acme-shop-"));

    appforge(&dir)
        .args(["tenant", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains(id.as_str()));

    appforge(&dir)
        .args(["tenant", "show", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("storage"))
        .stdout(predicate::str::contains("none"));

    appforge(&dir)
        .args(["tenant", "delete", &id])
        .assert()
        .success();
    appforge(&dir)
        .args(["tenant", "show", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("tenant not found"));
}

// ---------------------------------------------------------------------------
// appforge recipe
// ---------------------------------------------------------------------------

#[test]
fn set_config_bumps_revision() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let id = create_tenant(&dir, "shop");

    appforge(&dir)
        .args(["recipe", "set-config", &id, "auth", r#"{"login_method":"email"}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("revision 1"));

    let recipe = recipe_json(&dir, &id, "auth");
    assert_eq!(recipe["revision"], 1);
    assert_eq!(recipe["config"]["login_method"], "email");
}

#[test]
fn set_merges_keys_and_rejects_malformed_pairs_atomically() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let id = create_tenant(&dir, "shop");

    appforge(&dir)
        .args(["recipe", "set", &id, "database", "tables=[\"orders\"]", "engine=fast"])
        .assert()
        .success();
    let recipe = recipe_json(&dir, &id, "database");
    assert_eq!(recipe["config"]["tables"][0], "orders");
    assert_eq!(recipe["config"]["engine"], "fast");
    assert_eq!(recipe["revision"], 1);

    appforge(&dir)
        .args(["recipe", "set", &id, "database", "replicas=3", "broken"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected KEY=VALUE"));
    let recipe = recipe_json(&dir, &id, "database");
    assert!(recipe["config"].get("replicas").is_none());
    assert_eq!(recipe["revision"], 1);
}

#[test]
fn unknown_recipe_kind_is_rejected() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let id = create_tenant(&dir, "shop");
    appforge(&dir)
        .args(["recipe", "show", &id, "payments"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown recipe kind"));
}

// ---------------------------------------------------------------------------
// appforge deploy / recover
// ---------------------------------------------------------------------------

#[test]
fn deploy_converges_with_memory_gateway() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let id = create_tenant(&dir, "shop");

    with_credentials(appforge(&dir))
        .args(["deploy", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deployment started"))
        .stdout(predicate::str::contains("Converged: yes"));

    let recipe = recipe_json(&dir, &id, "storage");
    assert_eq!(recipe["apply_status"], "success");
    assert!(recipe["endpoint"]
        .as_str()
        .unwrap()
        .ends_with(&format!("storage-{id}")));

    with_credentials(appforge(&dir))
        .args(["deploy", &id, "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"nothing_to_do\""));
}

#[test]
fn deploy_without_credentials_fails_and_leaves_gate_free() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let id = create_tenant(&dir, "shop");

    appforge(&dir)
        .args(["deploy", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("APPFORGE_ACCESS_KEY"));

    let out = appforge(&dir)
        .args(["tenant", "show", &id, "--json"])
        .output()
        .unwrap();
    let shown: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(shown["tenant"]["deploying"], false);
}

#[test]
fn deploy_releases_gate_left_by_killed_process() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let id = create_tenant(&dir, "shop");
    {
        let db = TenantDb::open(&paths::db_path(dir.path())).unwrap();
        assert!(db.try_acquire_gate(&id).unwrap());
        db.begin_attempt(&id, RecipeKind::Auth).unwrap().unwrap();
    }

    with_credentials(appforge(&dir))
        .args(["deploy", &id, "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"started\""));

    let recipe = recipe_json(&dir, &id, "auth");
    assert_eq!(recipe["apply_status"], "success");
    let out = appforge(&dir)
        .args(["tenant", "show", &id, "--json"])
        .output()
        .unwrap();
    let shown: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(shown["tenant"]["deploying"], false);
}

#[test]
fn recover_on_clean_project_reports_nothing() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    appforge(&dir)
        .args(["recover", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"recipes_failed\": 0"))
        .stdout(predicate::str::contains("\"gates_released\": 0"));
}
