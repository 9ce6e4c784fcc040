use super::args::{Cli, Command};

mod export;
mod merge;
mod packs;
mod report;
mod run;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Run(args) => run::execute(args).await,
        Command::Packs(args) => packs::execute(args),
        Command::Export(args) => export::execute(args),
        Command::Report(args) => report::execute(args),
        Command::Merge(args) => merge::execute(args),
    }
}
