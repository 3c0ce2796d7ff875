use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::refine::DEFAULT_MAX_ROUNDS;
use crate::tweak::{DEFAULT_TWEAK_ROUNDS, TweakPreset};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(flatten)]
    pub service: ServiceArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Overrides for the generation service settings.
#[derive(Debug, Args)]
pub struct ServiceArgs {
    /// YAML file with service settings (model, base_url, timeout_secs, retries, initial_backoff_ms).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Model name (default: gpt-3.5-turbo, or `BEDTIME_OPENAI_MODEL`).
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// OpenAI-compatible API base URL (or `BEDTIME_OPENAI_BASE_URL`).
    #[arg(long, global = true)]
    pub base_url: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Write a new story (or the first chapter of an arc) from a request.
    Generate(GenerateArgs),
    /// Revise the current story, or the latest chapter, toward a tweak.
    Tweak(TweakArgs),
    Arc {
        #[command(subcommand)]
        command: ArcCommand,
    },
    /// Print a saved session.
    Show(ShowArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Short,
    Arc,
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Free-text story request.
    #[arg(long)]
    pub request: String,

    /// Session file to write.
    #[arg(long)]
    pub state: PathBuf,

    #[arg(long, value_enum, default_value_t = ModeArg::Short)]
    pub mode: ModeArg,

    /// Judge/edit rounds before the final judgement (short mode only).
    #[arg(long, default_value_t = DEFAULT_MAX_ROUNDS)]
    pub max_rounds: u32,

    /// Overwrite an existing session file.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct TweakArgs {
    /// Session file to update.
    #[arg(long)]
    pub state: PathBuf,

    /// What to change, e.g. "make the dragon purple".
    #[arg(long, required_unless_present = "preset", conflicts_with = "preset")]
    pub text: Option<String>,

    /// A canned tweak instead of `--text`.
    #[arg(long, value_enum)]
    pub preset: Option<TweakPreset>,

    /// Maximum edit rounds (at least one is always run).
    #[arg(long, default_value_t = DEFAULT_TWEAK_ROUNDS)]
    pub rounds: u32,
}

#[derive(Debug, Subcommand)]
pub enum ArcCommand {
    /// Add the next chapter.
    Next(ArcNextArgs),
    /// Write the finale.
    Finish(ArcFinishArgs),
}

#[derive(Debug, Args)]
pub struct ArcNextArgs {
    #[arg(long)]
    pub state: PathBuf,

    /// Steer this chapter toward setting up the finale.
    #[arg(long)]
    pub end_in_next: bool,
}

#[derive(Debug, Args)]
pub struct ArcFinishArgs {
    #[arg(long)]
    pub state: PathBuf,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    #[arg(long)]
    pub state: PathBuf,
}
