//! Tabular (CSV) case sources.
//!
//! One header row, then one row per step:
//!
//! ```text
//! title,step,keyword,param1,param2
//! Login,open page,navigate,${base}/login,
//! ,check status,assert,${status},200
//! Search,query,navigate,${base}/search,
//! ```
//!
//! A non-blank `title` starts a new case; blank titles continue the current
//! one. Positional `param*` cells are named after the keyword's declared
//! arguments when known, `param_<n>` otherwise.

use super::yaml::RESERVED_STEP_KEYS;
use super::SignatureSource;
use crate::errors::EngineError;
use crate::model::{Case, Step, Vars};
use serde_json::Value;
use std::path::Path;

const TITLE_COLUMNS: &[&str] = &["title", "case", "desc"];
const LABEL_COLUMNS: &[&str] = &["step", "label"];
const KEYWORD_COLUMN: &str = "keyword";

struct Columns {
    title: usize,
    label: Option<usize>,
    keyword: usize,
    params: Vec<usize>,
    /// Reserved step options (`continue_on_error`, `save_as`, `when`).
    options: Vec<(usize, String)>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, String> {
        let names: Vec<String> = headers.iter().map(|h| h.trim().to_ascii_lowercase()).collect();
        let find = |candidates: &[&str]| names.iter().position(|n| candidates.contains(&n.as_str()));

        let title = find(TITLE_COLUMNS).ok_or("missing 'title' column")?;
        let keyword = find(&[KEYWORD_COLUMN]).ok_or("missing 'keyword' column")?;
        let label = find(LABEL_COLUMNS);
        let params = names
            .iter()
            .enumerate()
            .filter(|(_, n)| n.starts_with("param"))
            .map(|(i, _)| i)
            .collect();
        let options = names
            .iter()
            .enumerate()
            .filter(|(_, n)| RESERVED_STEP_KEYS.contains(&n.as_str()) && n.as_str() != KEYWORD_COLUMN)
            .map(|(i, n)| (i, n.clone()))
            .collect();
        Ok(Self {
            title,
            label,
            keyword,
            params,
            options,
        })
    }
}

pub fn parse_file(
    path: &Path,
    signatures: Option<&dyn SignatureSource>,
) -> Result<Vec<Case>, EngineError> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| EngineError::malformed(path.display().to_string(), e.to_string()))?;
    parse_reader(reader, signatures)
        .map_err(|reason| EngineError::malformed(path.display().to_string(), reason))
}

pub fn parse_str(text: &str, signatures: Option<&dyn SignatureSource>) -> Result<Vec<Case>, String> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    parse_reader(reader, signatures)
}

fn parse_reader<R: std::io::Read>(
    mut reader: csv::Reader<R>,
    signatures: Option<&dyn SignatureSource>,
) -> Result<Vec<Case>, String> {
    let headers = reader.headers().map_err(|e| e.to_string())?.clone();
    let columns = Columns::from_headers(&headers)?;

    let mut cases: Vec<Case> = Vec::new();
    for (row_index, record) in reader.records().enumerate() {
        // header is line 1
        let line = row_index + 2;
        let record = record.map_err(|e| format!("line {line}: {e}"))?;
        if record.iter().all(str::is_empty) {
            continue;
        }

        let title = record.get(columns.title).unwrap_or_default();
        if !title.is_empty() {
            cases.push(Case::new(title, Vec::new()));
        }
        let Some(case) = cases.last_mut() else {
            return Err(format!("line {line}: row has no case title"));
        };

        let keyword = record.get(columns.keyword).unwrap_or_default();
        if keyword.is_empty() {
            if title.is_empty() {
                return Err(format!("line {line}: missing keyword"));
            }
            // title-only row opens a case without a step
            continue;
        }

        let label = columns
            .label
            .and_then(|i| record.get(i))
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("step_{}", case.steps.len() + 1));

        let mut step = Step::new(label, keyword);
        step.arguments = positional_arguments(&record, &columns.params, keyword, signatures);
        for (index, option) in &columns.options {
            let cell = record.get(*index).unwrap_or_default();
            if cell.is_empty() {
                continue;
            }
            match option.as_str() {
                "continue_on_error" => {
                    step.continue_on_error = Some(matches!(
                        cell.to_ascii_lowercase().as_str(),
                        "true" | "yes" | "1"
                    ));
                }
                "save_as" => step.save_as = Some(cell.to_string()),
                "when" => step.when = Some(cell.to_string()),
                _ => {}
            }
        }
        case.steps.push(step);
    }
    Ok(cases)
}

/// Names positional cells; empty trailing cells are dropped, empty inner cells
/// are kept as empty strings so later positions stay aligned.
fn positional_arguments(
    record: &csv::StringRecord,
    params: &[usize],
    keyword: &str,
    signatures: Option<&dyn SignatureSource>,
) -> Vars {
    let cells: Vec<&str> = params
        .iter()
        .map(|&i| record.get(i).unwrap_or_default())
        .collect();
    let used = cells.iter().rposition(|c| !c.is_empty()).map_or(0, |p| p + 1);
    let names = signatures
        .and_then(|s| s.param_names(keyword))
        .unwrap_or_default();

    cells[..used]
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            let name = names
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("param_{}", i + 1));
            (name, Value::String((*cell).to_string()))
        })
        .collect()
}
