use crate::error::{ForgeError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self.level {
            WarnLevel::Warning => "warning",
            WarnLevel::Error => "error",
        };
        write!(f, "{level}: {}", self.message)
    }
}

// ---------------------------------------------------------------------------
// OrchestratorConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Upper bound on worker rounds per deployment request.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    /// Sleep between rounds while recipes remain pending.
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
}

fn default_max_rounds() -> u32 {
    5
}

fn default_backoff_secs() -> u64 {
    35
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            backoff_secs: default_backoff_secs(),
        }
    }
}

impl OrchestratorConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }
}

// ---------------------------------------------------------------------------
// BundleConfig
// ---------------------------------------------------------------------------

/// What gets packaged and how the remote platform should run it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleConfig {
    /// Code tree shipped with every recipe, relative to the project root.
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,
    #[serde(default = "default_runtime")]
    pub runtime: String,
    #[serde(default = "default_handler")]
    pub handler: String,
    #[serde(default = "default_description")]
    pub description: String,
}

fn default_source_dir() -> PathBuf {
    PathBuf::from("service")
}

fn default_runtime() -> String {
    "python3.6".to_string()
}

fn default_handler() -> String {
    "service.handler.handle".to_string()
}

fn default_description() -> String {
    "appforge recipe service".to_string()
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            runtime: default_runtime(),
            handler: default_handler(),
            description: default_description(),
        }
    }
}

// ---------------------------------------------------------------------------
// GatewayConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayKind {
    #[default]
    Http,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub kind: GatewayKind,
    /// Control plane base URL, required when `kind` is `http`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default = "default_region")]
    pub default_region: String,
}

pub(crate) fn default_region() -> String {
    "ap-northeast-2".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            kind: GatewayKind::default(),
            endpoint: None,
            default_region: default_region(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub bundle: BundleConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_version() -> u32 {
    1
}

impl Config {
    pub fn new() -> Self {
        Self {
            version: default_version(),
            ..Default::default()
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(ForgeError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    /// Absolute location of the code tree to package.
    pub fn source_dir(&self, root: &Path) -> PathBuf {
        paths::resolve(root, &self.bundle.source_dir)
    }

    /// Fail with `ForgeError::Config` if any `Error`-level warning is present.
    pub fn ensure_valid(&self) -> Result<()> {
        let errors: Vec<String> = self
            .validate()
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message)
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ForgeError::Config(errors.join("; ")))
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.orchestrator.max_rounds == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "orchestrator.max_rounds must be at least 1".to_string(),
            });
        } else if self.orchestrator.max_rounds > 20 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "orchestrator.max_rounds={} (>20 is unusual)",
                    self.orchestrator.max_rounds
                ),
            });
        }

        if self.gateway.kind == GatewayKind::Http {
            match self.gateway.endpoint.as_deref().map(str::trim) {
                None | Some("") => warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: "gateway.endpoint is required when gateway.kind is 'http'"
                        .to_string(),
                }),
                Some(url) if !url.starts_with("http://") && !url.starts_with("https://") => {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Error,
                        message: format!("gateway.endpoint '{url}' is not an http(s) URL"),
                    })
                }
                Some(_) => {}
            }
        }

        if self.bundle.handler.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "bundle.handler must not be empty".to_string(),
            });
        }
        if self.bundle.runtime.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "bundle.runtime must not be empty".to_string(),
            });
        }

        warnings
    }
}
