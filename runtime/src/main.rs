// Copyright 2026 flipbook-dl contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use flipbook_dl::cli::{self, get_cmd::GetArgs, output};

#[derive(Parser)]
#[command(
    name = "flipbook-dl",
    about = "Download flipbook publications as PDF",
    version,
    after_help = "Run 'flipbook-dl <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a publication and write it as a PDF
    Get(GetArgs),
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

fn init_tracing(quiet: bool, verbose: bool) {
    let default_level = if verbose {
        "flipbook_dl=debug"
    } else if quiet {
        "flipbook_dl=warn"
    } else {
        "flipbook_dl=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    output::init(cli.json, cli.quiet, cli.verbose);
    init_tracing(cli.quiet || cli.json, cli.verbose);

    let result = match cli.command {
        Commands::Get(args) => cli::get_cmd::run(args).await,
        Commands::Doctor => cli::doctor::run().await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "flipbook-dl", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        let retryable = output::is_retryable(e);
        if output::is_json() {
            output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
                "retryable": retryable,
            }));
        } else if !output::is_quiet() {
            eprintln!("  Error: {e:#}");
            if retryable {
                eprintln!("  Finished files are kept; run the same command again to resume.");
            }
        }
        std::process::exit(1);
    }

    result
}
