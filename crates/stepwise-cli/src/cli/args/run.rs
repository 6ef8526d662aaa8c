//! Run, validate and keywords command arguments.

use std::path::PathBuf;

use clap::Parser;
use serde_json::Value;
use stepwise_core::SourceFormat;

use super::parse_key_val;

/// Where cases come from. Unset values fall back to the config file.
#[derive(Parser, Clone, Debug)]
pub struct SourceArgs {
    /// directory of case sources
    #[arg(long)]
    pub cases: Option<PathBuf>,

    /// case source format: yaml|csv
    #[arg(long)]
    pub format: Option<SourceFormat>,

    /// config file (defaults to ./stepwise.yaml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// directory of extension keyword executables
    #[arg(long, env = "STEPWISE_EXTENSIONS")]
    pub extensions: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// maximum number of cases executing at once
    #[arg(long, env = "STEPWISE_CONCURRENCY", value_parser = clap::value_parser!(u64).range(1..))]
    pub concurrency: Option<u64>,

    /// global variable, repeatable: --var base=http://localhost
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub vars: Vec<(String, Value)>,

    /// provider option, seeded as provider.<key>
    #[arg(long = "provider-opt", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub provider_opts: Vec<(String, Value)>,

    /// write the suite report as JSON
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// keep step outputs local to their case
    #[arg(long)]
    pub no_promote: bool,
}

#[derive(Parser, Clone, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

#[derive(Parser, Clone, Debug)]
pub struct KeywordsArgs {
    /// print signatures as JSON
    #[arg(long)]
    pub json: bool,
}
