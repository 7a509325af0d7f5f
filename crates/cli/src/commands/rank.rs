use std::collections::BTreeSet;
use std::path::PathBuf;

use storerank_core::config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
use storerank_core::{
    assemble, CatalogIngestor, CategoryId, DeterministicRankingEngine, Estimator, RankingEngine,
    RankingInput, RankingMode, ReportProvenance, StoreId,
};

use crate::commands::{
    load_catalog, CommandResult, EXIT_CONFIG_VALIDATION, EXIT_ENGINE, EXIT_INPUT,
};

const COMMAND: &str = "rank";

#[derive(Clone, Debug, Default)]
pub struct RankArgs {
    pub input: PathBuf,
    pub config_path: Option<PathBuf>,
    pub exclude_stores: Vec<String>,
    pub exclude_categories: Vec<String>,
    pub mode: Option<String>,
    pub estimator: Option<String>,
    pub min_store_samples: Option<u32>,
    pub min_category_samples: Option<u32>,
    pub shards: Option<usize>,
}

pub fn run(args: RankArgs) -> CommandResult {
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "config_validation",
                format!("configuration issue: {error}"),
                EXIT_CONFIG_VALIDATION,
            );
        }
    };

    let pages = match load_catalog(&args.input) {
        Ok(pages) => pages,
        Err(error) => {
            return CommandResult::failure(COMMAND, "catalog_input", format!("{error:#}"), EXIT_INPUT);
        }
    };

    let excluded_stores: BTreeSet<StoreId> = if args.exclude_stores.is_empty() {
        config.exclusions.stores.clone()
    } else {
        args.exclude_stores.iter().map(StoreId::new).collect()
    };
    let excluded_categories: BTreeSet<CategoryId> = if args.exclude_categories.is_empty() {
        config.exclusions.categories.clone()
    } else {
        args.exclude_categories.iter().map(CategoryId::new).collect()
    };

    let engine = match DeterministicRankingEngine::new(config.ranking) {
        Ok(engine) => engine,
        Err(error) => {
            return CommandResult::failure(COMMAND, "engine_config", error.to_string(), EXIT_ENGINE);
        }
    };

    let mut ingestor = CatalogIngestor::new(excluded_categories.clone());
    let ingested = ingestor.ingest_pages(&pages);
    let catalog = ingestor.finish();
    tracing::info!(
        event_name = "cli.rank.ingested",
        pages = pages.len(),
        pages_skipped = catalog.pages_skipped,
        products = catalog.products.len(),
        duplicates = ingested.duplicates,
        rejected = ingested.rejected,
        "catalog snapshot ingested"
    );

    let mut run = engine.rank(RankingInput {
        products: &catalog.products,
        excluded_stores: &excluded_stores,
    });
    run.diagnostics.record_ingest_issues(&catalog.issues);
    let report = assemble(
        run,
        config.ranking,
        ReportProvenance::now(excluded_stores, excluded_categories),
    );

    if report.is_empty() {
        return CommandResult::success_with(
            COMMAND,
            "no_data",
            "no store had enough comparable products to rank",
            &report,
        );
    }

    let message = format!(
        "ranked {} stores from {} products ({} mode)",
        report.result.store_count(),
        report.diagnostics.products_seen,
        report.result.mode().as_str()
    );
    CommandResult::success_with(COMMAND, "ok", message, &report)
}

fn load_config(args: &RankArgs) -> Result<AppConfig, ConfigError> {
    let mode = args.mode.as_deref().map(str::parse::<RankingMode>).transpose()?;
    let estimator = args.estimator.as_deref().map(str::parse::<Estimator>).transpose()?;

    AppConfig::load(LoadOptions {
        require_file: args.config_path.is_some(),
        config_path: args.config_path.clone(),
        overrides: ConfigOverrides {
            mode,
            estimator,
            min_store_samples: args.min_store_samples,
            min_category_samples: args.min_category_samples,
            shards: args.shards,
            ..ConfigOverrides::default()
        },
    })
}
