pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use storerank_core::config::{AppConfig, LoadOptions};

#[derive(Debug, Parser)]
#[command(
    name = "storerank",
    about = "Store price index ranking CLI",
    long_about = "Rank retail stores by price competitiveness from a catalog snapshot, list facets, and inspect configuration.",
    after_help = "Examples:\n  storerank rank --input snapshot.json\n  storerank rank --input snapshot.json --mode top-n-frequency --estimator median\n  storerank facets --input snapshot.json\n  storerank config"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a storerank.toml config file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Ingest a catalog snapshot, rank stores, and print the report as JSON")]
    Rank {
        #[arg(long, help = "Catalog snapshot: JSON array of {category, hits} pages")]
        input: PathBuf,
        #[arg(long = "exclude-store", help = "Store to leave out (repeatable)")]
        exclude_stores: Vec<String>,
        #[arg(long = "exclude-category", help = "Category to skip at ingestion (repeatable)")]
        exclude_categories: Vec<String>,
        #[arg(long, help = "weighted-index | top-n-frequency")]
        mode: Option<String>,
        #[arg(long, help = "mean | median (top-n-frequency mode)")]
        estimator: Option<String>,
        #[arg(long)]
        min_store_samples: Option<u32>,
        #[arg(long)]
        min_category_samples: Option<u32>,
        #[arg(long, help = "Worker threads for the accumulation fold")]
        shards: Option<usize>,
    },
    #[command(about = "List the distinct categories and stores in a catalog snapshot")]
    Facets {
        #[arg(long)]
        input: PathBuf,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let logging = AppConfig::load(LoadOptions {
        config_path: cli.config.clone(),
        ..LoadOptions::default()
    })
    .map(|config| config.logging)
    .unwrap_or_default();
    logging::init(&logging);

    let result = match cli.command {
        Command::Rank {
            input,
            exclude_stores,
            exclude_categories,
            mode,
            estimator,
            min_store_samples,
            min_category_samples,
            shards,
        } => commands::rank::run(commands::rank::RankArgs {
            input,
            config_path: cli.config,
            exclude_stores,
            exclude_categories,
            mode,
            estimator,
            min_store_samples,
            min_category_samples,
            shards,
        }),
        Command::Facets { input } => commands::facets::run(&input),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(cli.config) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
