use anyhow::Result;
use clap::Parser;
use imago_core::{console, ImagoError};
use std::process;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Command};
use commands::install::InstallOptions;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        if let Some(ImagoError::Dependency(dependency)) = error.downcast_ref::<ImagoError>() {
            if dependency.conflicts.is_empty() {
                console::error(&format!("{dependency}"));
            }
            for conflict in &dependency.conflicts {
                console::error(&conflict.message);
            }
            process::exit(2);
        }

        console::error(&format!("{error}"));
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_tracing()?;

    let args = Cli::parse();

    match args.command {
        Command::Install {
            image,
            merge,
            non_interactive,
            os,
            architecture,
            dry_run,
            repositories,
            installed,
            verbose,
        } => {
            let options = InstallOptions {
                image,
                merge,
                non_interactive,
                os,
                architecture,
                dry_run,
                repositories,
                installed,
                verbose,
            };
            commands::install::run(options).await
        }
    }
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err))
}
