pub mod accumulate;
pub mod estimator;
pub mod normalize;
pub mod rank;
pub mod report;
pub mod threshold;

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::domain::offer::{ProductMap, ProductRecord, StoreId};
use crate::errors::{DataQualityIssue, EngineError};

use self::{
    accumulate::{accumulate, accumulate_sharded, Accumulation},
    estimator::Estimator,
    rank::{rank_top_n_frequency, rank_weighted_index, RankingMode, RankingOutcome},
    threshold::{
        apply_thresholds, Thresholds, DEFAULT_MIN_CATEGORY_SAMPLES, DEFAULT_MIN_STORE_SAMPLES,
    },
};

pub const DEFAULT_TOP_CATEGORIES_PER_STORE: usize = 5;
pub const DEFAULT_TOP_STORES_PER_CATEGORY: usize = 3;
pub const MAX_SHARDS: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingConfig {
    pub min_store_samples: u32,
    pub min_category_samples: u32,
    pub mode: RankingMode,
    /// Only consulted in top-N-frequency mode.
    pub estimator: Estimator,
    pub top_categories_per_store: usize,
    pub top_stores_per_category: usize,
    /// Worker threads for the accumulation fold; 1 runs it inline.
    pub shards: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            min_store_samples: DEFAULT_MIN_STORE_SAMPLES,
            min_category_samples: DEFAULT_MIN_CATEGORY_SAMPLES,
            mode: RankingMode::WeightedIndex,
            estimator: Estimator::Mean,
            top_categories_per_store: DEFAULT_TOP_CATEGORIES_PER_STORE,
            top_stores_per_category: DEFAULT_TOP_STORES_PER_CATEGORY,
            shards: 1,
        }
    }
}

impl RankingConfig {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            min_store_samples: self.min_store_samples,
            min_category_samples: self.min_category_samples,
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.top_categories_per_store == 0 {
            return Err(EngineError::Configuration(
                "top_categories_per_store must be greater than zero".to_string(),
            ));
        }
        if self.top_stores_per_category == 0 {
            return Err(EngineError::Configuration(
                "top_stores_per_category must be greater than zero".to_string(),
            ));
        }
        if self.shards == 0 || self.shards > MAX_SHARDS {
            return Err(EngineError::Configuration(format!(
                "shards must be in range 1..={MAX_SHARDS}"
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct RankingInput<'a> {
    pub products: &'a ProductMap,
    pub excluded_stores: &'a BTreeSet<StoreId>,
}

/// What one run dropped along the way, for surfacing "insufficient data".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDiagnostics {
    pub products_seen: u32,
    pub products_ineligible: u32,
    pub offers_dropped: u32,
    /// Hits and offers rejected while coercing catalog pages.
    pub ingest_dropped: u32,
    /// Engine and ingestion drops together, keyed by issue kind.
    pub dropped_by_kind: BTreeMap<String, u32>,
    pub stores_accumulated: u32,
    pub stores_below_threshold: Vec<StoreId>,
    pub categories_below_threshold: u32,
    /// Stores that passed the thresholds but had no index to rank by.
    pub stores_unindexed: Vec<StoreId>,
}

impl RunDiagnostics {
    fn count_kind(&mut self, issue: &DataQualityIssue) {
        *self.dropped_by_kind.entry(issue.kind().to_string()).or_insert(0) += 1;
    }

    /// Folds issues raised before the engine ran, so a report accounts for
    /// every record left out of it.
    pub fn record_ingest_issues(&mut self, issues: &[DataQualityIssue]) {
        self.ingest_dropped += issues.len() as u32;
        for issue in issues {
            self.count_kind(issue);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RankingRun {
    pub outcome: RankingOutcome,
    pub diagnostics: RunDiagnostics,
}

pub trait RankingEngine: Send + Sync {
    fn rank(&self, input: RankingInput<'_>) -> RankingRun;
}

pub struct DeterministicRankingEngine {
    config: RankingConfig,
}

impl DeterministicRankingEngine {
    /// Rejects an invalid configuration before any product is touched.
    pub fn new(config: RankingConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    fn accumulate(&self, input: &RankingInput<'_>) -> Accumulation {
        match NonZeroUsize::new(self.config.shards) {
            Some(shards) if shards.get() > 1 => {
                let products: Vec<&ProductRecord> = input.products.values().collect();
                accumulate_sharded(&products, input.excluded_stores, shards)
            }
            _ => accumulate(input.products.values(), input.excluded_stores),
        }
    }
}

impl RankingEngine for DeterministicRankingEngine {
    fn rank(&self, input: RankingInput<'_>) -> RankingRun {
        let accumulation = self.accumulate(&input);

        let mut diagnostics = RunDiagnostics {
            products_seen: accumulation.diagnostics.products_seen,
            products_ineligible: accumulation.diagnostics.products_ineligible,
            offers_dropped: accumulation.diagnostics.offers_dropped,
            stores_accumulated: accumulation.stores.len() as u32,
            ..RunDiagnostics::default()
        };
        for issue in &accumulation.issues {
            diagnostics.count_kind(issue);
        }

        let filtered = apply_thresholds(accumulation.stores, self.config.thresholds());
        diagnostics.stores_below_threshold = filtered.stores_below_threshold;
        diagnostics.categories_below_threshold = filtered.categories_below_threshold;

        let outcome = match self.config.mode {
            RankingMode::WeightedIndex => {
                let entries =
                    rank_weighted_index(&filtered.stores, self.config.top_categories_per_store);
                diagnostics.stores_unindexed = filtered
                    .stores
                    .keys()
                    .filter(|store| entries.iter().all(|entry| &entry.store != *store))
                    .cloned()
                    .collect();
                RankingOutcome::WeightedIndex(entries)
            }
            RankingMode::TopNFrequency => RankingOutcome::TopNFrequency(rank_top_n_frequency(
                &filtered.stores,
                self.config.estimator,
                self.config.top_stores_per_category,
            )),
        };

        tracing::info!(
            event_name = "ranking.run.completed",
            mode = self.config.mode.as_str(),
            products_seen = diagnostics.products_seen,
            products_ineligible = diagnostics.products_ineligible,
            offers_dropped = diagnostics.offers_dropped,
            stores_ranked = outcome.store_count(),
            "ranking run completed"
        );
        if outcome.is_empty() {
            tracing::warn!(
                event_name = "ranking.run.empty",
                stores_accumulated = diagnostics.stores_accumulated,
                "no store passed the sample thresholds"
            );
        }

        RankingRun { outcome, diagnostics }
    }
}
