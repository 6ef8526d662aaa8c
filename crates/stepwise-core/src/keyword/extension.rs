//! Extension keywords: executables dropped into an extension directory.
//!
//! A keyword `foo` is served by the first file named `foo` or `foo.<ext>`
//! (sorted by name) that is executable. The runner writes
//! `{"keyword": "foo", "arguments": {..}}` to its stdin. On exit 0, stdout is
//! read as a `KeywordOutput` JSON object, as any other JSON value (the result
//! value), or as plain text (trimmed). A non-zero exit fails the step with
//! stderr as the message. An optional `foo.signature.yaml` declares
//! `params` and `description`.

use super::{AsyncKeyword, Handler, KeywordEntry, KeywordError, KeywordOutput, KeywordSignature};
use crate::model::Vars;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

pub const SIGNATURE_SUFFIX: &str = ".signature.yaml";

/// Keys that mark a stdout JSON object as a full `KeywordOutput`.
const OUTPUT_KEYS: &[&str] = &["value", "outputs", "attachments"];

const MAX_STDERR_CHARS: usize = 2000;

#[derive(Debug)]
pub struct ExtensionLoader {
    dir: PathBuf,
    probes: AtomicUsize,
}

impl ExtensionLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            probes: AtomicUsize::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of directory probes performed so far.
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn probe(&self, name: &str) -> Result<KeywordEntry, KeywordError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let unknown = || KeywordError::UnknownKeyword {
            name: name.to_string(),
        };

        if !is_safe_name(name) {
            debug!(keyword = %name, "refusing to probe unsafe keyword name");
            return Err(unknown());
        }
        let Some(program) = self.find_program(name) else {
            debug!(keyword = %name, dir = %self.dir.display(), "no extension found");
            return Err(unknown());
        };

        let signature = self.read_signature(name);
        Ok(KeywordEntry {
            signature,
            handler: Handler::from_async(ScriptKeyword {
                keyword: name.to_string(),
                program,
            }),
        })
    }

    fn find_program(&self, name: &str) -> Option<PathBuf> {
        let entries = std::fs::read_dir(&self.dir).ok()?;
        let prefix = format!("{name}.");
        let mut candidates: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name().and_then(|n| n.to_str()).is_some_and(|file| {
                    (file == name || file.starts_with(&prefix)) && !file.ends_with(SIGNATURE_SUFFIX)
                })
            })
            .filter(|p| p.is_file())
            .collect();
        candidates.sort();
        candidates.into_iter().find(|p| {
            let ok = is_executable(p);
            if !ok {
                warn!(file = %p.display(), "extension candidate is not executable");
            }
            ok
        })
    }

    fn read_signature(&self, name: &str) -> KeywordSignature {
        let path = self.dir.join(format!("{name}{SIGNATURE_SUFFIX}"));
        let mut signature = match std::fs::read_to_string(&path) {
            Ok(text) => serde_yaml::from_str::<KeywordSignature>(&text).unwrap_or_else(|e| {
                warn!(file = %path.display(), error = %e, "ignoring invalid extension signature");
                KeywordSignature::default()
            }),
            Err(_) => KeywordSignature::default(),
        };
        signature.name = name.to_string();
        signature
    }
}

fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).is_ok_and(|m| m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Async handler that runs one extension executable per invocation.
#[derive(Debug)]
struct ScriptKeyword {
    keyword: String,
    program: PathBuf,
}

#[async_trait]
impl AsyncKeyword for ScriptKeyword {
    async fn call(&self, args: Vars) -> Result<KeywordOutput, KeywordError> {
        let request = serde_json::json!({
            "keyword": self.keyword,
            "arguments": args,
        });
        let payload = serde_json::to_vec(&request)
            .map_err(|e| KeywordError::failed(format!("failed to encode request: {e}")))?;

        let mut command = Command::new(&self.program);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = spawn(&mut command).await.map_err(|e| {
            KeywordError::failed(format!(
                "failed to start extension {}: {e}",
                self.program.display()
            ))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            // the extension may exit without reading its input
            if let Err(e) = stdin.write_all(&payload).await {
                debug!(keyword = %self.keyword, error = %e, "extension did not read stdin");
            }
        }

        let output = child.wait_with_output().await.map_err(|e| {
            KeywordError::failed(format!("extension {} did not complete: {e}", self.keyword))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr: String = stderr.trim().chars().take(MAX_STDERR_CHARS).collect();
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            return Err(KeywordError::failed(if stderr.is_empty() {
                format!("extension {} exited with {code}", self.keyword)
            } else {
                format!("extension {} exited with {code}: {stderr}", self.keyword)
            }));
        }

        Ok(parse_stdout(&output.stdout))
    }
}

/// ETXTBSY: a freshly written script can still be open for writing in a
/// concurrently forked process.
const TEXT_FILE_BUSY: i32 = 26;
const SPAWN_ATTEMPTS: u32 = 3;

async fn spawn(command: &mut Command) -> std::io::Result<tokio::process::Child> {
    let mut attempt = 1;
    loop {
        match command.spawn() {
            Err(e) if e.raw_os_error() == Some(TEXT_FILE_BUSY) && attempt < SPAWN_ATTEMPTS => {
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            other => return other,
        }
    }
}

/// Interprets extension stdout.
pub fn parse_stdout(stdout: &[u8]) -> KeywordOutput {
    let text = String::from_utf8_lossy(stdout);
    let text = text.trim();
    if text.is_empty() {
        return KeywordOutput::none();
    }
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map))
            if !map.is_empty() && map.keys().all(|k| OUTPUT_KEYS.contains(&k.as_str())) =>
        {
            serde_json::from_value(Value::Object(map.clone()))
                .unwrap_or_else(|_| KeywordOutput::value(Value::Object(map)))
        }
        Ok(value) => KeywordOutput::value(value),
        Err(_) => KeywordOutput::value(text.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stdout_forms() {
        assert_eq!(parse_stdout(b"  \n"), KeywordOutput::none());
        assert_eq!(parse_stdout(b"hello\n"), KeywordOutput::value("hello"));
        assert_eq!(parse_stdout(b"42"), KeywordOutput::value(42));
        assert_eq!(
            parse_stdout(br#"{"value": 1, "outputs": {"t": "x"}}"#),
            KeywordOutput::value(1).with_output("t", "x")
        );
        assert_eq!(
            parse_stdout(br#"{"status": 200}"#),
            KeywordOutput::value(json!({"status": 200}))
        );
    }

    #[test]
    fn unsafe_names_are_never_probed() {
        let loader = ExtensionLoader::new("/nonexistent");
        for name in ["", "../x", "a/b", ".hidden"] {
            assert!(matches!(
                loader.probe(name),
                Err(KeywordError::UnknownKeyword { .. })
            ));
        }
    }

    #[test]
    fn missing_directory_is_unknown_keyword() {
        let loader = ExtensionLoader::new("/nonexistent/stepwise-ext");
        assert!(loader.probe("login").is_err());
        assert_eq!(loader.probe_count(), 1);
    }
}
