use crate::error::{ForgeError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const APPFORGE_DIR: &str = ".appforge";
pub const CONFIG_FILE: &str = ".appforge/config.yaml";
pub const DB_FILE: &str = ".appforge/appforge.redb";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn appforge_dir(root: &Path) -> PathBuf {
    root.join(APPFORGE_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn db_path(root: &Path) -> PathBuf {
    root.join(DB_FILE)
}

/// Resolve a configured path relative to the project root unless absolute.
pub fn resolve(root: &Path, configured: &Path) -> PathBuf {
    if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        root.join(configured)
    }
}

// ---------------------------------------------------------------------------
// Slugs
// ---------------------------------------------------------------------------

fn slug_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").expect("valid regex"))
}

pub fn validate_slug(slug: &str) -> Result<()> {
    if slug.is_empty() || slug.len() > 64 || !slug_re().is_match(slug) {
        return Err(ForgeError::InvalidSlug(slug.to_string()));
    }
    Ok(())
}

/// Lowercase `name` and collapse every run of non-alphanumerics into one hyphen.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_hyphen = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_slugs() {
        assert!(validate_slug("shop").is_ok());
        assert!(validate_slug("my-shop-42").is_ok());
    }

    #[test]
    fn invalid_slugs() {
        assert!(validate_slug("").is_err());
        assert!(validate_slug("My-Shop").is_err());
        assert!(validate_slug("-shop").is_err());
        assert!(validate_slug("shop--x").is_err());
        assert!(validate_slug("shop/x").is_err());
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("My  Shop!! App"), "my-shop-app");
        assert_eq!(slugify("  leading"), "leading");
        assert_eq!(slugify("???"), "");
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        let root = Path::new("/srv/project");
        assert_eq!(resolve(root, Path::new("/opt/svc")), PathBuf::from("/opt/svc"));
        assert_eq!(resolve(root, Path::new("service")), root.join("service"));
    }
}
