//! CLI argument definitions using clap.

use clap::Parser;
use eyre::Result;

#[derive(Debug, Parser)]
#[command(name = "deepspec")]
#[command(about = "Render WAV files into spectrogram images in parallel")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub args: crate::plot::Args,
}

/// Execute CLI command - separated for testing.
pub fn run_cli(cli: Cli) -> Result<()> {
    tracing::debug!(?cli, "parsed arguments");

    crate::plot::execute(cli.args.try_into()?)
}
