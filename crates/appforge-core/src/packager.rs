//! Bundles a recipe's code tree into a deployable archive.
//!
//! Layout of the gzip-compressed tar:
//!
//! ```text
//! service/              <- copy of the configured source tree
//! service/recipe.json   <- kind, revision and configuration
//! service/tenant_id.txt <- owning tenant id
//! ```
//!
//! The deployed instance reads the two artifacts to learn which tenant and
//! configuration it serves without any lookup at invocation time.

use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;

use crate::error::{ForgeError, Result};
use crate::io::copy_tree;
use crate::recipe::Recipe;

/// Root namespace of every bundle.
pub const BUNDLE_ROOT: &str = "service";
pub const RECIPE_ARTIFACT: &str = "recipe.json";
pub const TENANT_ARTIFACT: &str = "tenant_id.txt";

#[derive(Debug, Clone)]
pub struct Packager {
    source_dir: PathBuf,
    scratch_dir: Option<PathBuf>,
}

impl Packager {
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            scratch_dir: None,
        }
    }

    /// Stage bundles under `dir` instead of the system temp directory.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// Build the archive for `recipe`. The staging directory is removed on
    /// every exit path when its guard drops.
    pub fn package(&self, recipe: &Recipe) -> Result<Vec<u8>> {
        if !self.source_dir.is_dir() {
            return Err(ForgeError::Packaging(format!(
                "source tree {} does not exist",
                self.source_dir.display()
            )));
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix("appforge-bundle-");
        let staging = match &self.scratch_dir {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        }
        .map_err(|e| ForgeError::Packaging(format!("cannot create staging dir: {e}")))?;

        let root = staging.path().join(BUNDLE_ROOT);
        let files = copy_tree(&self.source_dir, &root)
            .map_err(|e| ForgeError::Packaging(format!("copying source tree: {e}")))?;
        std::fs::write(root.join(RECIPE_ARTIFACT), recipe.bundle_manifest()?)
            .map_err(|e| ForgeError::Packaging(format!("writing {RECIPE_ARTIFACT}: {e}")))?;
        std::fs::write(root.join(TENANT_ARTIFACT), &recipe.tenant_id)
            .map_err(|e| ForgeError::Packaging(format!("writing {TENANT_ARTIFACT}: {e}")))?;

        let bytes = archive(&root)
            .map_err(|e| ForgeError::Packaging(format!("building archive: {e}")))?;
        debug!(
            tenant = %recipe.tenant_id,
            recipe = %recipe.kind,
            files,
            bytes = bytes.len(),
            "packaged bundle"
        );
        Ok(bytes)
    }
}

fn archive(root: &Path) -> std::io::Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut tar = tar::Builder::new(encoder);
    tar.follow_symlinks(false);
    tar.append_dir_all(BUNDLE_ROOT, root)?;
    tar.into_inner()?.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecipeKind;
    use flate2::read::GzDecoder;
    use std::collections::BTreeMap;
    use std::io::Read;
    use tempfile::TempDir;

    fn unpack(bytes: &[u8]) -> BTreeMap<String, String> {
        let mut archive = tar::Archive::new(GzDecoder::new(bytes));
        let mut files = BTreeMap::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let path = entry.path().unwrap().to_string_lossy().into_owned();
            let mut body = String::new();
            entry.read_to_string(&mut body).unwrap();
            files.insert(path, body);
        }
        files
    }

    fn source_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("handler.py"), "def handle(e, c): pass\n").unwrap();
        std::fs::create_dir_all(dir.path().join("lib")).unwrap();
        std::fs::write(dir.path().join("lib/util.py"), "X = 1\n").unwrap();
        dir
    }

    #[test]
    fn bundle_contains_code_and_artifacts() {
        let src = source_tree();
        let mut recipe = Recipe::new("shop-1a2b", RecipeKind::Auth);
        recipe.replace_config(serde_json::json!({"login_method": "email"}));

        let bytes = Packager::new(src.path()).package(&recipe).unwrap();
        let files = unpack(&bytes);

        assert!(files.contains_key("service/handler.py"));
        assert_eq!(files["service/lib/util.py"], "X = 1\n");
        assert_eq!(files["service/tenant_id.txt"], "shop-1a2b");
        let manifest: serde_json::Value =
            serde_json::from_str(&files["service/recipe.json"]).unwrap();
        assert_eq!(manifest["kind"], "auth");
        assert_eq!(manifest["config"]["login_method"], "email");
    }

    #[test]
    fn generated_artifacts_override_source_files() {
        let src = source_tree();
        std::fs::write(src.path().join("tenant_id.txt"), "stale").unwrap();
        let recipe = Recipe::new("shop-1a2b", RecipeKind::Bill);
        let files = unpack(&Packager::new(src.path()).package(&recipe).unwrap());
        assert_eq!(files["service/tenant_id.txt"], "shop-1a2b");
    }

    #[test]
    fn staging_is_removed_after_success() {
        let src = source_tree();
        let scratch = TempDir::new().unwrap();
        let packager = Packager::new(src.path()).with_scratch_dir(scratch.path());
        packager
            .package(&Recipe::new("t", RecipeKind::Logic))
            .unwrap();
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn missing_source_is_a_packaging_error_and_leaves_nothing_behind() {
        let scratch = TempDir::new().unwrap();
        let packager =
            Packager::new(scratch.path().join("nope")).with_scratch_dir(scratch.path());
        let err = packager
            .package(&Recipe::new("t", RecipeKind::Storage))
            .unwrap_err();
        assert!(matches!(err, ForgeError::Packaging(_)));
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn failure_after_staging_leaves_nothing_behind() {
        let src = source_tree();
        // A directory where the manifest goes makes the artifact write fail
        // after the tree has been copied into staging.
        std::fs::create_dir_all(src.path().join(RECIPE_ARTIFACT)).unwrap();
        std::fs::write(src.path().join(RECIPE_ARTIFACT).join("x"), "x").unwrap();
        let scratch = TempDir::new().unwrap();
        let packager = Packager::new(src.path()).with_scratch_dir(scratch.path());

        let err = packager
            .package(&Recipe::new("t", RecipeKind::Auth))
            .unwrap_err();

        match err {
            ForgeError::Packaging(msg) => assert!(msg.contains(RECIPE_ARTIFACT), "{msg}"),
            other => panic!("expected Packaging, got {other:?}"),
        }
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_not_followed() {
        let src = source_tree();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "s").unwrap();
        std::os::unix::fs::symlink(outside.path(), src.path().join("link")).unwrap();

        let files = unpack(
            &Packager::new(src.path())
                .package(&Recipe::new("t", RecipeKind::Database))
                .unwrap(),
        );
        assert!(files.keys().all(|k| !k.starts_with("service/link")));
    }
}
