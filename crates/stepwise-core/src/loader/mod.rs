//! Case discovery and parsing.
//!
//! A case directory holds one source file per case (YAML) or per group of
//! cases (CSV), each named with a numeric ordering prefix (`1_login.yaml`,
//! `02-search.csv`), plus an optional shared `context.yaml` that seeds the
//! global tier.

pub mod expand;
pub mod tabular;
pub mod yaml;

use crate::context::ContextStore;
use crate::errors::EngineError;
use crate::model::{Case, SourceFormat, Vars};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File names recognised as the shared context file, in priority order.
pub const CONTEXT_FILES: &[&str] = &["context.yaml", "context.yml"];

/// Supplies declared argument names for positional (tabular) parameters.
pub trait SignatureSource {
    fn param_names(&self, keyword: &str) -> Option<Vec<String>>;
}

/// Loads every case under `dir` using the default loader.
pub fn load(dir: &Path, format: SourceFormat, context: &ContextStore) -> Result<Vec<Case>, EngineError> {
    CaseLoader::new(context).load(dir, format)
}

pub struct CaseLoader<'a> {
    context: &'a ContextStore,
    signatures: Option<&'a dyn SignatureSource>,
}

impl<'a> CaseLoader<'a> {
    pub fn new(context: &'a ContextStore) -> Self {
        Self {
            context,
            signatures: None,
        }
    }

    pub fn with_signatures(mut self, signatures: &'a dyn SignatureSource) -> Self {
        self.signatures = Some(signatures);
        self
    }

    pub fn load(&self, dir: &Path, format: SourceFormat) -> Result<Vec<Case>, EngineError> {
        if !dir.is_dir() {
            return Err(EngineError::io(
                dir.display().to_string(),
                std::io::Error::new(std::io::ErrorKind::NotFound, "case directory not found"),
            ));
        }

        self.load_shared_context(dir);

        let files = discover(dir, format)?;
        let mut cases = Vec::new();
        for source in &files {
            let loaded = match format {
                SourceFormat::Yaml => yaml::parse_file(&source.path)?,
                SourceFormat::Csv => tabular::parse_file(&source.path, self.signatures)?,
            };
            debug!(
                file = %source.path.display(),
                cases = loaded.len(),
                "parsed case source"
            );
            cases.extend(loaded.into_iter().map(|mut case| {
                case.order = source.order;
                case.source = Some(source.path.display().to_string());
                case
            }));
        }

        if cases.is_empty() {
            return Err(EngineError::EmptyCaseSet {
                dir: dir.display().to_string(),
            });
        }
        info!(dir = %dir.display(), files = files.len(), cases = cases.len(), "cases loaded");
        Ok(cases)
    }

    /// Merges the shared context file into the global tier. A broken file is
    /// reported and otherwise ignored.
    fn load_shared_context(&self, dir: &Path) {
        let Some(path) = CONTEXT_FILES.iter().map(|n| dir.join(n)).find(|p| p.is_file()) else {
            return;
        };
        match read_context_file(&path) {
            Ok(vars) => {
                debug!(file = %path.display(), keys = vars.len(), "shared context loaded");
                self.context.merge(vars);
            }
            Err(reason) => {
                warn!(file = %path.display(), error = %reason, "ignoring unreadable shared context");
            }
        }
    }
}

fn read_context_file(path: &Path) -> Result<Vars, String> {
    let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    if text.trim().is_empty() {
        return Ok(Vars::new());
    }
    match serde_yaml::from_str::<serde_json::Value>(&text).map_err(|e| e.to_string())? {
        serde_json::Value::Object(map) => Ok(map),
        serde_json::Value::Null => Ok(Vars::new()),
        _ => Err("top level must be a mapping".to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SourceFile {
    pub order: u64,
    pub path: PathBuf,
}

/// Lists case files of `format` sorted by (prefix, name). Files of other
/// formats, hidden files and the shared context file are ignored.
pub(crate) fn discover(dir: &Path, format: SourceFormat) -> Result<Vec<SourceFile>, EngineError> {
    let entries =
        std::fs::read_dir(dir).map_err(|e| EngineError::io(dir.display().to_string(), e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| EngineError::io(dir.display().to_string(), e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with('.') || CONTEXT_FILES.contains(&name) {
            continue;
        }
        let matches_format = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| format.extensions().contains(&ext.to_ascii_lowercase().as_str()));
        if !matches_format {
            continue;
        }
        let order = ordering_prefix(name).ok_or_else(|| {
            EngineError::malformed(
                path.display().to_string(),
                "file name must start with a numeric ordering prefix (e.g. 1_login.yaml)",
            )
        })?;
        files.push(SourceFile { order, path });
    }
    files.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.path.cmp(&b.path)));
    Ok(files)
}

/// Leading decimal digits of a file name.
pub fn ordering_prefix(file_name: &str) -> Option<u64> {
    let digits: String = file_name.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}
