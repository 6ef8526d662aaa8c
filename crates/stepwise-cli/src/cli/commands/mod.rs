use super::args::*;

pub mod keywords;
pub(crate) mod run;
pub(crate) mod runner_builder;
pub mod validate;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Run(args) => run::run(args, cli.verbose).await,
        Command::Validate(args) => validate::run(args),
        Command::Keywords(args) => keywords::run(args),
    }
}
