/// Entry point for the murk CLI, a control-flow obfuscator for the murk function IR.
///
/// This module parses command-line arguments and dispatches to subcommands for obfuscating a
/// module, exporting control flow graphs, or running a function through the reference
/// interpreter. It initializes logging and handles the main execution flow.
use clap::Parser;
use murk_cli::commands::{Cmd, Command};
use tracing_subscriber::EnvFilter;

/// Command-line interface for murk.
///
/// murk reads modules serialized as JSON, applies instruction substitution, bogus control flow
/// and control-flow flattening, and writes the transformed module back out.
#[derive(Parser)]
#[command(name = "murk")]
#[command(about = "murk: control-flow obfuscator")]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    cli.command.execute()
}
