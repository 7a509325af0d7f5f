use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::accumulate::StoreAccumulation;
use crate::domain::offer::StoreId;

pub const DEFAULT_MIN_STORE_SAMPLES: u32 = 5;
pub const DEFAULT_MIN_CATEGORY_SAMPLES: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Minimum compared products for a store to appear in the ranking.
    pub min_store_samples: u32,
    /// Minimum compared products for a category to count for a store.
    pub min_category_samples: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_store_samples: DEFAULT_MIN_STORE_SAMPLES,
            min_category_samples: DEFAULT_MIN_CATEGORY_SAMPLES,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ThresholdOutcome {
    pub stores: BTreeMap<StoreId, StoreAccumulation>,
    pub stores_below_threshold: Vec<StoreId>,
    pub categories_below_threshold: u32,
}

pub fn apply_thresholds(
    stores: BTreeMap<StoreId, StoreAccumulation>,
    thresholds: Thresholds,
) -> ThresholdOutcome {
    let mut outcome = ThresholdOutcome::default();

    for (store, mut totals) in stores {
        if totals.sample_count < thresholds.min_store_samples {
            tracing::debug!(
                event_name = "ranking.store.below_threshold",
                store = %store,
                sample_count = totals.sample_count,
                min_store_samples = thresholds.min_store_samples,
                "store dropped from ranking"
            );
            outcome.stores_below_threshold.push(store);
            continue;
        }

        let before = totals.per_category.len();
        totals
            .per_category
            .retain(|_, category| category.sample_count >= thresholds.min_category_samples);
        outcome.categories_below_threshold += (before - totals.per_category.len()) as u32;

        outcome.stores.insert(store, totals);
    }

    outcome
}
