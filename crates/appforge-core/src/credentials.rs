//! Cloud credentials supplied per orchestration run.
//!
//! Credentials are never persisted here. Callers pass them in directly or
//! resolve them through a [`CredentialSource`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ForgeError, Result};

/// Default environment variable prefix for [`EnvCredentials`].
const DEFAULT_PREFIX: &str = "APPFORGE";

/// Access key, secret and region used to open one gateway session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
    #[serde(default = "crate::config::default_region")]
    pub region: String,
}

impl Credentials {
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            region: region.into(),
        }
    }

    /// Reject bundles with blank fields before a session is opened.
    pub fn validate(&self) -> Result<()> {
        if self.access_key.trim().is_empty() {
            return Err(ForgeError::MissingCredentials("access key is empty".into()));
        }
        if self.secret_key.trim().is_empty() {
            return Err(ForgeError::MissingCredentials("secret key is empty".into()));
        }
        if self.region.trim().is_empty() {
            return Err(ForgeError::MissingCredentials("region is empty".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// CredentialSource
// ---------------------------------------------------------------------------

/// Resolves a usable credential bundle for a tenant on demand.
pub trait CredentialSource: Send + Sync {
    fn resolve(&self, tenant_id: &str) -> Result<Credentials>;
}

/// Reads `{PREFIX}_ACCESS_KEY`, `{PREFIX}_SECRET_KEY` and `{PREFIX}_REGION`.
///
/// The same bundle is returned for every tenant. A missing region falls back
/// to `default_region`.
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    prefix: String,
    default_region: String,
}

impl EnvCredentials {
    pub fn new(default_region: impl Into<String>) -> Self {
        Self::with_prefix(DEFAULT_PREFIX, default_region)
    }

    pub fn with_prefix(prefix: impl Into<String>, default_region: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            default_region: default_region.into(),
        }
    }

    fn var(&self, name: &str) -> Option<String> {
        std::env::var(format!("{}_{}", self.prefix, name))
            .ok()
            .filter(|v| !v.trim().is_empty())
    }
}

impl CredentialSource for EnvCredentials {
    fn resolve(&self, _tenant_id: &str) -> Result<Credentials> {
        let access_key = self.var("ACCESS_KEY").ok_or_else(|| {
            ForgeError::MissingCredentials(format!("{}_ACCESS_KEY is not set", self.prefix))
        })?;
        let secret_key = self.var("SECRET_KEY").ok_or_else(|| {
            ForgeError::MissingCredentials(format!("{}_SECRET_KEY is not set", self.prefix))
        })?;
        let region = self
            .var("REGION")
            .unwrap_or_else(|| self.default_region.clone());
        Ok(Credentials::new(access_key, secret_key, region))
    }
}

/// Hands out one fixed bundle; used by tests and single-account setups.
#[derive(Debug, Clone)]
pub struct StaticCredentials(pub Credentials);

impl CredentialSource for StaticCredentials {
    fn resolve(&self, _tenant_id: &str) -> Result<Credentials> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_secret() {
        let creds = Credentials::new("AKIA123", "super-secret", "eu-west-1");
        let dbg = format!("{creds:?}");
        assert!(dbg.contains("AKIA123"));
        assert!(!dbg.contains("super-secret"));
    }

    #[test]
    fn blank_fields_fail_validation() {
        assert!(Credentials::new("", "s", "r").validate().is_err());
        assert!(Credentials::new("a", " ", "r").validate().is_err());
        assert!(Credentials::new("a", "s", "").validate().is_err());
        assert!(Credentials::new("a", "s", "r").validate().is_ok());
    }

    #[test]
    fn missing_region_in_json_uses_default() {
        let creds: Credentials =
            serde_json::from_str(r#"{"access_key":"a","secret_key":"s"}"#).unwrap();
        assert_eq!(creds.region, "ap-northeast-2");
    }

    #[test]
    fn env_source_reads_prefixed_vars() {
        std::env::set_var("CREDTEST_A_ACCESS_KEY", "ak");
        std::env::set_var("CREDTEST_A_SECRET_KEY", "sk");
        let source = EnvCredentials::with_prefix("CREDTEST_A", "us-east-1");
        let creds = source.resolve("shop").unwrap();
        assert_eq!(creds.access_key, "ak");
        assert_eq!(creds.secret_key, "sk");
        assert_eq!(creds.region, "us-east-1");
    }

    #[test]
    fn env_source_without_vars_errors() {
        let source = EnvCredentials::with_prefix("CREDTEST_UNSET", "us-east-1");
        match source.resolve("shop") {
            Err(ForgeError::MissingCredentials(msg)) => {
                assert!(msg.contains("CREDTEST_UNSET_ACCESS_KEY"))
            }
            other => panic!("expected MissingCredentials, got {other:?}"),
        }
    }
}
