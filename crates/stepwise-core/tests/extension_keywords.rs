#![cfg(unix)]

use serde_json::json;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use stepwise_core::{
    Case, ContextStore, ExtensionLoader, HandlerKind, KeywordError, KeywordRegistry, Runner,
    Status, Step, Vars,
};
use tokio_util::sync::CancellationToken;

fn script(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[tokio::test]
async fn extension_output_and_signature() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    script(
        dir.path(),
        "login.sh",
        r#"cat > /dev/null
echo '{"value": "ok", "outputs": {"session": "s-42"}, "attachments": ["login.png"]}'"#,
    );
    std::fs::write(
        dir.path().join("login.signature.yaml"),
        "params: [user, password]\ndescription: Log a user in\n",
    )?;

    let registry = KeywordRegistry::with_builtins().with_extensions(ExtensionLoader::new(dir.path()));
    let entry = registry.resolve("login")?;
    assert_eq!(entry.kind(), HandlerKind::Async);
    assert_eq!(entry.signature.params, vec!["user", "password"]);

    let out = registry.invoke("login", Vars::new()).await?;
    assert_eq!(out.value, Some(json!("ok")));
    assert_eq!(out.outputs["session"], json!("s-42"));
    assert_eq!(out.attachments, vec!["login.png"]);
    Ok(())
}

#[tokio::test]
async fn extension_receives_rendered_request_on_stdin() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    // echo the request back as plain text
    script(dir.path(), "echo_request", "cat");

    let registry = Arc::new(
        KeywordRegistry::with_builtins().with_extensions(ExtensionLoader::new(dir.path())),
    );
    let context = ContextStore::new();
    context.set("user", json!("bob"));
    let runner = Runner::new(registry, context);
    let case = Case::new(
        "ext",
        vec![Step::new("echo", "echo_request").arg("who", "${user}")],
    );
    let result = runner.run_case(&case, &CancellationToken::new()).await?;
    assert_eq!(result.status, Status::Success, "{:?}", result.message);
    assert_eq!(
        result.steps[0].output,
        Some(json!({"keyword": "echo_request", "arguments": {"who": "bob"}}))
    );
    Ok(())
}

#[tokio::test]
async fn non_zero_exit_fails_with_stderr() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    script(dir.path(), "flaky.sh", "echo 'element not found' >&2\nexit 3");
    let registry = KeywordRegistry::new().with_extensions(ExtensionLoader::new(dir.path()));
    let err = registry.invoke("flaky", Vars::new()).await.unwrap_err();
    match err {
        KeywordError::Failed(msg) => {
            assert!(msg.contains("exited with 3"), "{msg}");
            assert!(msg.contains("element not found"), "{msg}");
        }
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[tokio::test]
async fn probe_happens_once_per_name() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    script(dir.path(), "ping", "echo pong");
    let registry = Arc::new(KeywordRegistry::new().with_extensions(ExtensionLoader::new(dir.path())));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            let hit = registry.invoke("ping", Vars::new()).await;
            let miss = registry.invoke("missing", Vars::new()).await;
            (hit, miss)
        }));
    }
    for task in tasks {
        let (hit, miss) = task.await?;
        assert_eq!(hit?.value, Some(json!("pong")));
        assert_eq!(
            miss.unwrap_err(),
            KeywordError::UnknownKeyword {
                name: "missing".into()
            }
        );
    }

    let probes = registry.extensions().map(|l| l.probe_count()).unwrap_or_default();
    assert_eq!(probes, 2);
    Ok(())
}

#[tokio::test]
async fn non_executable_files_are_not_keywords() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("notes.txt"), "not a script")?;
    let registry = KeywordRegistry::new().with_extensions(ExtensionLoader::new(dir.path()));
    assert!(matches!(
        registry.resolve("notes"),
        Err(KeywordError::UnknownKeyword { .. })
    ));
    Ok(())
}
