// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use cmd::commands::{ingest_command, merge_command, query_command, status_command};
use cmd::common::{OutputFormat, PondContext};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "trips")]
struct Cli {
    /// Pond root directory (defaults to $TRIPPOND)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load source files into partition stores
    Ingest {
        /// Partition ids to load; all registered partitions when omitted
        partitions: Vec<String>,
        /// Reload partitions even when their source is unchanged
        #[arg(long)]
        force: bool,
        /// Maximum number of partitions loaded at once
        #[arg(long)]
        jobs: Option<usize>,
    },
    /// Consolidate LOADED partitions into the unified store
    Merge,
    /// Run an aggregation query
    Query {
        /// PICKUP DROPOFF PU DO GROUP_BY VENDOR TAXI, `*` for unconstrained
        #[arg(num_args = 7, value_names = ["PICKUP", "DROPOFF", "PU", "DO", "GROUP_BY", "VENDOR", "TAXI"])]
        tokens: Vec<String>,
        /// Query one partition store instead of the unified store
        #[arg(long)]
        partition: Option<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// Show partition load and merge status
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    diagnostics::init();

    let cli = Cli::parse();
    let ctx = PondContext::new(cli.root);

    let cancel = ctx.cancel_flag().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            diagnostics::warn!("Interrupted, stopping after the current partitions");
            cancel.cancel();
        }
    });

    let print = |s: &str| println!("{s}");
    let result: Result<()> = match cli.command {
        Commands::Ingest {
            partitions,
            force,
            jobs,
        } => ingest_command(&ctx, partitions, force, jobs, print).await,
        Commands::Merge => merge_command(&ctx, print).await,
        Commands::Query {
            tokens,
            partition,
            format,
        } => query_command(&ctx, &tokens, partition, format, print).await,
        Commands::Status => status_command(&ctx, print).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            diagnostics::error!("Command failed: {e}", e: format!("{e:#}"));
            eprintln!("Error: {e:#}");
            if e
                .downcast_ref::<tripstore::Error>()
                .is_some_and(tripstore::Error::is_input_error)
            {
                eprintln!("Usage: trips query PICKUP DROPOFF PU DO GROUP_BY VENDOR TAXI (use * for any)");
            }
            ExitCode::FAILURE
        }
    }
}
