//! org-custom-resources - Lambda entry point and local runner

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use org_custom_resources::logging::init_logging;
use org_custom_resources::{runtime, Config};

/// CloudFormation custom resource provider for AWS Organizations.
#[derive(Debug, Parser)]
#[command(name = "org-custom-resources")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: Config,

    /// Defaults to `serve`.
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run as a Lambda custom runtime.
    Serve,
    /// Process a single event read from a JSON file.
    Invoke {
        /// Path to the event JSON.
        #[arg(long, short = 'e')]
        event: PathBuf,

        /// Print the status document instead of sending it to the ResponseURL.
        #[arg(long)]
        print_only: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.config.log_format);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => runtime::serve(&cli.config).await,
        Command::Invoke { event, print_only } => {
            runtime::invoke_file(&cli.config, &event, print_only).await?;
            Ok(())
        }
    }
}
