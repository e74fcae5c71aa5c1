use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "wash-advisor",
    version,
    about = "Quartile-colored score series, washer trigger decisions and best-window ranking"
)]
pub struct Cli {
    /// Score CSV to use instead of the newest colored file in WASH_DATA_DIR.
    #[arg(long, global = true)]
    pub series: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API and the background decision poller.
    Serve,
    /// Evaluate one decision and print it.
    Decide(DecideArgs),
    /// Print the best windows for a run of the given length.
    Windows(WindowsArgs),
    /// Print the colored intervals of the series.
    Timeline,
}

#[derive(Args)]
pub struct DecideArgs {
    /// Local timestamp such as `2025-10-18 14:07`; defaults to now.
    #[arg(long)]
    pub at: Option<String>,
}

#[derive(Args)]
pub struct WindowsArgs {
    #[arg(long, default_value_t = 60)]
    pub duration: u32,
    /// Score the deltas are measured against; defaults to the current interval's score.
    #[arg(long)]
    pub reference_score: Option<f64>,
    #[arg(long)]
    pub earliest_after: Option<String>,
    #[arg(long)]
    pub latest_before: Option<String>,
    #[arg(long)]
    pub deadline: Option<String>,
}
