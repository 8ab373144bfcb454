/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Folio CLI - administration for the folio document generation queue.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use folio::{ConfigFile, GenerationRunnerConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

/// Folio - a database-coordinated document generation queue
#[derive(Parser)]
#[command(name = "folio")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (can also be set via DATABASE_URL environment variable)
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,

    /// Administrative commands for managing the queue
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Reset requests stuck IN_PROGRESS past the stale timeout back to PENDING
    RecoverStale {
        /// Override the configured stale timeout, in minutes
        #[arg(long)]
        timeout_minutes: Option<u64>,
    },

    /// Delete finished requests and documents past their retention date
    PurgeExpired {
        /// Preview what would be deleted without actually deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Show request counts per status
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let file = match &cli.config {
        Some(path) => ConfigFile::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ConfigFile::default(),
    };
    let config: GenerationRunnerConfig = file.runner_config();

    let database_url = cli
        .database_url
        .or_else(|| file.database.url.clone())
        .context("Database URL is required. Set --database-url, DATABASE_URL, or [database] url in the config file")?;

    match cli.command {
        Commands::Migrate => commands::migrate::run(&database_url, &config).await?,
        Commands::Admin { command } => match command {
            AdminCommands::RecoverStale { timeout_minutes } => {
                commands::recover_stale::run(&database_url, &config, timeout_minutes).await?;
            }
            AdminCommands::PurgeExpired { dry_run } => {
                commands::purge_expired::run(&database_url, &config, dry_run).await?;
            }
            AdminCommands::Stats => commands::stats::run(&database_url, &config).await?,
        },
    }

    Ok(())
}
