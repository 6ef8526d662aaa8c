use clap::{Parser, Subcommand};
use serde_json::Value;

mod run;
pub use run::*;

#[derive(Parser)]
#[command(name = "stepwise", version, about = "Keyword-driven test runner")]
pub struct Cli {
    /// log at debug level unless RUST_LOG is set
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Load, expand and execute every case
    Run(RunArgs),
    /// Load and expand cases without executing them
    Validate(ValidateArgs),
    /// List the built-in keywords and their parameters
    Keywords(KeywordsArgs),
}

/// Parses `key=value`. The value is typed when it reads as a JSON scalar.
pub fn parse_key_val(s: &str) -> Result<(String, Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=value: no `=` found in `{s}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("invalid KEY=value: empty key in `{s}`"));
    }
    let value = match serde_json::from_str::<Value>(value) {
        Ok(v) if !v.is_object() && !v.is_array() => v,
        _ => Value::String(value.to_string()),
    };
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn key_val_typing() {
        assert_eq!(parse_key_val("base=http://x").unwrap(), ("base".into(), json!("http://x")));
        assert_eq!(parse_key_val("retries=3").unwrap(), ("retries".into(), json!(3)));
        assert_eq!(parse_key_val("headless=true").unwrap(), ("headless".into(), json!(true)));
        assert_eq!(parse_key_val("list=[1,2]").unwrap(), ("list".into(), json!("[1,2]")));
        assert_eq!(parse_key_val("empty=").unwrap(), ("empty".into(), json!("")));
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=x").is_err());
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from([
            "stepwise",
            "run",
            "--cases",
            "suite",
            "--format",
            "csv",
            "--concurrency",
            "4",
            "--var",
            "base=http://x",
            "--provider-opt",
            "browser=headless",
            "--no-promote",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Command::Run(args) = cli.cmd else {
            panic!("expected run");
        };
        assert_eq!(args.source.cases.as_deref(), Some(std::path::Path::new("suite")));
        assert_eq!(args.source.format, Some(stepwise_core::SourceFormat::Csv));
        assert_eq!(args.concurrency, Some(4));
        assert_eq!(args.vars, vec![("base".to_string(), json!("http://x"))]);
        assert_eq!(args.provider_opts.len(), 1);
        assert!(args.no_promote);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let parsed = Cli::try_parse_from(["stepwise", "run", "--concurrency", "0"]);
        assert!(parsed.is_err());
    }
}
