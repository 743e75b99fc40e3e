use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "imago", about = "resolve and install plugin package images")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve an image document and hand it to deployment.
    Install {
        /// Path to an image document, or an inline package list.
        image: String,
        /// Treat the current installation as soft constraints.
        #[arg(long)]
        merge: bool,
        /// Never prompt; assume the default answer.
        #[arg(long)]
        non_interactive: bool,
        /// Target operating system; defaults to the document, then the host.
        #[arg(long = "OS")]
        os: Option<String>,
        /// Target CPU architecture; defaults to the document, then the host.
        #[arg(long = "Architecture")]
        architecture: Option<String>,
        /// Print the resolved package set without deploying.
        #[arg(long)]
        dry_run: bool,
        /// Package repository URL or index path; repeatable, ordered.
        #[arg(long = "repository")]
        repositories: Vec<String>,
        /// JSON list of installed package definitions, used by --merge.
        #[arg(long)]
        installed: Option<PathBuf>,
        /// Log repository traffic and resolver progress.
        #[arg(long, short)]
        verbose: bool,
    },
}
