use crate::engine::RunPolicy;
use crate::errors::EngineError;
use crate::model::{SourceFormat, Vars};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;

/// Default config file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "stepwise.yaml";

/// Optional run configuration (`stepwise.yaml`). CLI flags override it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub version: u32,
    #[serde(default)]
    pub cases: Option<PathBuf>,
    #[serde(default)]
    pub format: SourceFormat,
    #[serde(default)]
    pub extensions: Option<PathBuf>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_true")]
    pub promote_outputs: bool,
    /// Seed values for the global tier.
    #[serde(default)]
    pub globals: Vars,
    /// Provider options, exposed as `provider.<key>`.
    #[serde(default)]
    pub provider: Vars,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: SUPPORTED_CONFIG_VERSION,
            cases: None,
            format: SourceFormat::default(),
            extensions: None,
            concurrency: default_concurrency(),
            promote_outputs: true,
            globals: Vars::new(),
            provider: Vars::new(),
        }
    }
}

fn default_concurrency() -> usize {
    1
}

fn default_true() -> bool {
    true
}

impl EngineConfig {
    pub fn run_policy(&self) -> RunPolicy {
        RunPolicy {
            concurrency: self.concurrency.max(1),
            promote_outputs: self.promote_outputs,
        }
    }

    /// Globals plus provider options under their `provider.` prefix.
    pub fn seed_vars(&self) -> Vars {
        let mut vars = self.globals.clone();
        for (key, value) in &self.provider {
            vars.insert(format!("provider.{key}"), value.clone());
        }
        vars
    }
}

pub fn load_config(path: &Path) -> Result<EngineConfig, EngineError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| EngineError::io(path.display().to_string(), e))?;
    let cfg: EngineConfig = serde_yaml::from_str(&raw).map_err(|e| {
        EngineError::Config(format!("failed to parse {}: {}", path.display(), e))
    })?;
    if cfg.version != SUPPORTED_CONFIG_VERSION {
        return Err(EngineError::Config(format!(
            "unsupported config version {} (supported: {})",
            cfg.version, SUPPORTED_CONFIG_VERSION
        )));
    }
    if cfg.concurrency == 0 {
        return Err(EngineError::Config("concurrency must be at least 1".into()));
    }
    Ok(cfg)
}
