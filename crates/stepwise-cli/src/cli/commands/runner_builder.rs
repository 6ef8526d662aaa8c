//! Resolves the effective configuration and builds the pieces a run needs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use stepwise_core::config::DEFAULT_CONFIG_FILE;
use stepwise_core::loader::CaseLoader;
use stepwise_core::{
    load_config, Case, ContextStore, EngineConfig, EngineError, ExtensionLoader, KeywordRegistry,
};

use super::super::args::{RunArgs, SourceArgs};

/// Explicit `--config`, else `./stepwise.yaml` when present, else defaults.
pub(crate) fn resolve_config(source: &SourceArgs) -> Result<EngineConfig, EngineError> {
    let mut cfg = match &source.config {
        Some(path) => load_config(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
            load_config(Path::new(DEFAULT_CONFIG_FILE))?
        }
        None => EngineConfig::default(),
    };
    if let Some(cases) = &source.cases {
        cfg.cases = Some(cases.clone());
    }
    if let Some(format) = source.format {
        cfg.format = format;
    }
    if let Some(extensions) = &source.extensions {
        cfg.extensions = Some(extensions.clone());
    }
    Ok(cfg)
}

/// Applies run-only flags on top of the resolved config.
pub(crate) fn apply_run_overrides(cfg: &mut EngineConfig, args: &RunArgs) {
    if let Some(n) = args.concurrency {
        cfg.concurrency = usize::try_from(n).unwrap_or(usize::MAX);
    }
    if args.no_promote {
        cfg.promote_outputs = false;
    }
    for (key, value) in &args.provider_opts {
        cfg.provider.insert(key.clone(), value.clone());
    }
}

pub(crate) fn cases_dir(cfg: &EngineConfig) -> Result<PathBuf, EngineError> {
    cfg.cases.clone().ok_or_else(|| {
        EngineError::Config("no case directory: pass --cases or set `cases` in the config".into())
    })
}

pub(crate) fn build_registry(cfg: &EngineConfig) -> KeywordRegistry {
    let registry = KeywordRegistry::with_builtins();
    match &cfg.extensions {
        Some(dir) => registry.with_extensions(ExtensionLoader::new(dir)),
        None => registry,
    }
}

/// Global tier: config globals and provider options, then `--var` values.
pub(crate) fn seed_context(cfg: &EngineConfig, vars: &[(String, Value)]) -> ContextStore {
    let mut seed = cfg.seed_vars();
    for (key, value) in vars {
        seed.insert(key.clone(), value.clone());
    }
    ContextStore::with_vars(seed)
}

/// Loads and expands cases. `--var` values are merged again afterwards so
/// they win over the shared context file.
pub(crate) fn load_cases(
    cfg: &EngineConfig,
    registry: &Arc<KeywordRegistry>,
    context: &ContextStore,
    vars: &[(String, Value)],
) -> Result<Vec<Case>, EngineError> {
    let dir = cases_dir(cfg)?;
    let cases = CaseLoader::new(context)
        .with_signatures(registry.as_ref())
        .load(&dir, cfg.format)?;
    context.merge(vars.iter().cloned().collect());
    Ok(cases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stepwise_core::SourceFormat;

    fn source(config: Option<PathBuf>) -> SourceArgs {
        SourceArgs {
            cases: Some(PathBuf::from("from-flag")),
            format: None,
            config,
            extensions: None,
        }
    }

    #[test]
    fn flags_override_config_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("custom.yaml");
        std::fs::write(
            &path,
            "version: 1\ncases: from-config\nformat: csv\nconcurrency: 2\nglobals:\n  base: http://cfg\n",
        )?;
        let cfg = resolve_config(&source(Some(path)))?;
        assert_eq!(cfg.cases, Some(PathBuf::from("from-flag")));
        assert_eq!(cfg.format, SourceFormat::Csv);
        assert_eq!(cfg.concurrency, 2);
        Ok(())
    }

    #[test]
    fn cli_vars_win_over_globals() {
        let mut cfg = EngineConfig::default();
        cfg.globals.insert("base".into(), json!("http://cfg"));
        cfg.provider.insert("browser".into(), json!("chrome"));
        let store = seed_context(&cfg, &[("base".into(), json!("http://cli"))]);
        assert_eq!(store.get("base"), Some(json!("http://cli")));
        assert_eq!(store.get("provider.browser"), Some(json!("chrome")));
    }

    #[test]
    fn cli_vars_win_over_shared_context_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("context.yaml"), "base: http://file\nretries: 2\n")?;
        std::fs::write(dir.path().join("1_a.yaml"), "desc: A\nsteps: []\n")?;
        let cfg = EngineConfig {
            cases: Some(dir.path().to_path_buf()),
            ..EngineConfig::default()
        };
        let vars = vec![("base".to_string(), json!("http://cli"))];
        let store = seed_context(&cfg, &vars);
        let cases = load_cases(&cfg, &Arc::new(build_registry(&cfg)), &store, &vars)?;
        assert_eq!(cases.len(), 1);
        assert_eq!(store.get("base"), Some(json!("http://cli")));
        assert_eq!(store.get("retries"), Some(json!(2)));
        Ok(())
    }

    #[test]
    fn missing_case_dir_is_config_error() {
        let err = cases_dir(&EngineConfig::default()).unwrap_err();
        assert_eq!(err.reason_code(), "E_CONFIG");
    }
}
