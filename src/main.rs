use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

use bedtime_stories::cli::{ArcCommand, Cli, Command};
use bedtime_stories::commands;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    bedtime_stories::logging::init().context("init logging")?;

    let cli = Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        Command::Generate(args) => {
            commands::generate(&cli.service, args)
                .await
                .context("generate")?;
        }
        Command::Tweak(args) => {
            commands::tweak(&cli.service, args).await.context("tweak")?;
        }
        Command::Arc {
            command: ArcCommand::Next(args),
        } => {
            commands::arc_next(&cli.service, args)
                .await
                .context("arc next")?;
        }
        Command::Arc {
            command: ArcCommand::Finish(args),
        } => {
            commands::arc_finish(&cli.service, args)
                .await
                .context("arc finish")?;
        }
        Command::Show(args) => {
            commands::show(args).await.context("show")?;
        }
    }

    Ok(())
}
