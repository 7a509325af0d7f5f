use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::accumulate::StoreAccumulation;
use super::estimator::Estimator;
use crate::domain::offer::{CategoryId, StoreId};
use crate::errors::EngineError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingMode {
    /// Ratio of summed store prices to summed market references.
    #[default]
    WeightedIndex,
    /// Podium counts of the cheapest stores per category.
    TopNFrequency,
}

impl RankingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WeightedIndex => "weighted_index",
            Self::TopNFrequency => "top_n_frequency",
        }
    }
}

impl std::str::FromStr for RankingMode {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "weighted_index" => Ok(Self::WeightedIndex),
            "top_n_frequency" => Ok(Self::TopNFrequency),
            other => Err(EngineError::Configuration(format!(
                "unsupported ranking mode `{other}` (expected weighted_index|top_n_frequency)"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryIndex {
    pub category: CategoryId,
    pub index: Decimal,
    pub sample_count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub store: StoreId,
    /// Below one means cheaper than the market average.
    pub index: Decimal,
    pub sample_count: u32,
    pub top_categories: Vec<CategoryIndex>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStanding {
    pub store: StoreId,
    pub estimate: Decimal,
    pub sample_count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyEntry {
    pub store: StoreId,
    pub tally_total: u32,
    /// `positions[0]` counts first places, `positions[1]` second places, ...
    pub positions: Vec<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyReport {
    pub overall_ranking: Vec<TallyEntry>,
    pub per_category: BTreeMap<CategoryId, Vec<CategoryStanding>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "ranking", rename_all = "snake_case")]
pub enum RankingOutcome {
    WeightedIndex(Vec<RankedEntry>),
    TopNFrequency(FrequencyReport),
}

impl RankingOutcome {
    pub fn mode(&self) -> RankingMode {
        match self {
            Self::WeightedIndex(_) => RankingMode::WeightedIndex,
            Self::TopNFrequency(_) => RankingMode::TopNFrequency,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::WeightedIndex(entries) => entries.is_empty(),
            Self::TopNFrequency(report) => report.overall_ranking.is_empty(),
        }
    }

    /// Number of stores in the overall ranking.
    pub fn store_count(&self) -> usize {
        match self {
            Self::WeightedIndex(entries) => entries.len(),
            Self::TopNFrequency(report) => report.overall_ranking.len(),
        }
    }
}

fn ratio(sum_store_price: Decimal, sum_market_reference: Decimal) -> Option<Decimal> {
    sum_store_price.checked_div(sum_market_reference)
}

/// Orders stores by price index ascending, then store id.
pub fn rank_weighted_index(
    stores: &BTreeMap<StoreId, StoreAccumulation>,
    top_categories_per_store: usize,
) -> Vec<RankedEntry> {
    let mut entries: Vec<RankedEntry> = stores
        .values()
        .filter_map(|totals| {
            let Some(index) = ratio(totals.sum_store_price, totals.sum_market_reference) else {
                tracing::warn!(
                    event_name = "ranking.store.unindexable",
                    store = %totals.store,
                    sample_count = totals.sample_count,
                    "store has a zero market reference total"
                );
                return None;
            };

            let mut top_categories: Vec<CategoryIndex> = totals
                .per_category
                .iter()
                .filter_map(|(category, category_totals)| {
                    Some(CategoryIndex {
                        category: category.clone(),
                        index: ratio(
                            category_totals.sum_store_price,
                            category_totals.sum_market_reference,
                        )?,
                        sample_count: category_totals.sample_count,
                    })
                })
                .collect();
            top_categories
                .sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.category.cmp(&b.category)));
            top_categories.truncate(top_categories_per_store);

            Some(RankedEntry {
                store: totals.store.clone(),
                index,
                sample_count: totals.sample_count,
                top_categories,
            })
        })
        .collect();

    entries.sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.store.cmp(&b.store)));
    entries
}

/// Ranks stores inside every category by their point estimate, then counts
/// podium finishes across categories.
pub fn rank_top_n_frequency(
    stores: &BTreeMap<StoreId, StoreAccumulation>,
    estimator: Estimator,
    top_stores_per_category: usize,
) -> FrequencyReport {
    let mut per_category: BTreeMap<CategoryId, Vec<CategoryStanding>> = BTreeMap::new();
    for totals in stores.values() {
        for (category, category_totals) in &totals.per_category {
            let Some(estimate) = estimator.estimate(&category_totals.samples) else {
                continue;
            };
            per_category.entry(category.clone()).or_default().push(CategoryStanding {
                store: totals.store.clone(),
                estimate,
                sample_count: category_totals.sample_count,
            });
        }
    }

    let mut tallies: BTreeMap<StoreId, Vec<u32>> = BTreeMap::new();
    for standings in per_category.values_mut() {
        standings.sort_by(|a, b| a.estimate.cmp(&b.estimate).then_with(|| a.store.cmp(&b.store)));
        standings.truncate(top_stores_per_category);

        for (position, standing) in standings.iter().enumerate() {
            tallies
                .entry(standing.store.clone())
                .or_insert_with(|| vec![0; top_stores_per_category])[position] += 1;
        }
    }

    let mut overall_ranking: Vec<TallyEntry> = tallies
        .into_iter()
        .map(|(store, positions)| TallyEntry {
            store,
            tally_total: positions.iter().sum(),
            positions,
        })
        .collect();
    overall_ranking
        .sort_by(|a, b| b.tally_total.cmp(&a.tally_total).then_with(|| a.store.cmp(&b.store)));

    FrequencyReport { overall_ranking, per_category }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rust_decimal::Decimal;

    use super::{rank_top_n_frequency, rank_weighted_index, RankingMode};
    use crate::domain::offer::{CategoryId, OfferRecord, ProductId, ProductRecord, StoreId};
    use crate::ranking::accumulate::{accumulate, StoreAccumulation};
    use crate::ranking::estimator::Estimator;

    fn product(id: &str, category: &str, offers: &[(&str, i64)]) -> ProductRecord {
        ProductRecord {
            product_id: ProductId::new(id),
            category: CategoryId::new(category),
            offers: offers
                .iter()
                .map(|(store, price)| OfferRecord::new(*store, Decimal::from(*price)))
                .collect(),
        }
    }

    #[test]
    fn equal_sums_give_index_of_exactly_one() {
        let products = vec![
            product("p1", "Lacteos", &[("X", 100), ("Y", 100)]),
            product("p2", "Lacteos", &[("X", 40), ("Y", 40)]),
        ];
        let stores = accumulate(&products, &BTreeSet::new()).stores;
        let ranking = rank_weighted_index(&stores, 5);

        assert_eq!(ranking.len(), 2);
        assert!(ranking.iter().all(|entry| entry.index == Decimal::ONE));
        assert_eq!(ranking[0].store, StoreId::new("X"), "ties fall back to store id");
    }

    #[test]
    fn weighted_index_is_ratio_of_sums() {
        let products = vec![
            product("p1", "Lacteos", &[("X", 100), ("Y", 200)]),
            product("p2", "Limpieza", &[("X", 300), ("Y", 100)]),
        ];
        let stores = accumulate(&products, &BTreeSet::new()).stores;
        let ranking = rank_weighted_index(&stores, 5);

        assert_eq!(ranking[0].store, StoreId::new("Y"));
        assert_eq!(ranking[0].index.round_dp(4), Decimal::new(8571, 4));
        assert_eq!(ranking[1].store, StoreId::new("X"));
        assert_eq!(ranking[1].index.round_dp(4), Decimal::new(11429, 4));
    }

    #[test]
    fn top_categories_are_sorted_and_truncated() {
        let products = vec![
            product("p1", "A", &[("X", 90), ("Y", 110)]),
            product("p2", "B", &[("X", 50), ("Y", 150)]),
            product("p3", "C", &[("X", 120), ("Y", 80)]),
        ];
        let stores = accumulate(&products, &BTreeSet::new()).stores;
        let ranking = rank_weighted_index(&stores, 2);

        let x = ranking.iter().find(|entry| entry.store.as_str() == "X").expect("X ranked");
        let categories: Vec<&str> =
            x.top_categories.iter().map(|entry| entry.category.as_str()).collect();
        assert_eq!(categories, vec!["B", "A"]);
        assert_eq!(x.top_categories[0].index, Decimal::new(5, 1));
    }

    #[test]
    fn frequency_mode_tallies_podium_places() {
        let products = vec![
            product("a1", "A", &[("X", 10), ("Y", 20), ("Z", 30), ("W", 40)]),
            product("b1", "B", &[("X", 15), ("Y", 10), ("Z", 30), ("W", 5)]),
            product("c1", "C", &[("X", 10), ("Y", 11), ("Z", 12)]),
        ];
        let stores = accumulate(&products, &BTreeSet::new()).stores;
        let report = rank_top_n_frequency(&stores, Estimator::Mean, 3);

        let b: Vec<&str> =
            report.per_category[&CategoryId::new("B")].iter().map(|s| s.store.as_str()).collect();
        assert_eq!(b, vec!["W", "Y", "X"]);

        let overall: Vec<(&str, u32)> = report
            .overall_ranking
            .iter()
            .map(|entry| (entry.store.as_str(), entry.tally_total))
            .collect();
        assert_eq!(overall, vec![("X", 3), ("Y", 3), ("Z", 2), ("W", 1)]);

        let x = &report.overall_ranking[0];
        assert_eq!(x.positions, vec![2, 0, 1]);
    }

    #[test]
    fn frequency_mode_uses_selected_estimator() {
        let products = vec![
            product("a1", "A", &[("X", 10), ("Y", 12)]),
            product("a2", "A", &[("X", 11), ("Y", 12)]),
            product("a3", "A", &[("X", 100), ("Y", 12)]),
        ];
        let stores = accumulate(&products, &BTreeSet::new()).stores;

        let by_mean = rank_top_n_frequency(&stores, Estimator::Mean, 1);
        let by_median = rank_top_n_frequency(&stores, Estimator::Median, 1);

        assert_eq!(by_mean.overall_ranking[0].store, StoreId::new("Y"));
        assert_eq!(by_median.overall_ranking[0].store, StoreId::new("X"));
        assert_eq!(by_median.per_category[&CategoryId::new("A")][0].estimate, Decimal::from(11));
    }

    #[test]
    fn empty_input_gives_empty_rankings() {
        let stores = accumulate(&Vec::<ProductRecord>::new(), &BTreeSet::new()).stores;
        assert!(rank_weighted_index(&stores, 5).is_empty());
        assert!(rank_top_n_frequency(&stores, Estimator::Median, 3).overall_ranking.is_empty());
    }

    #[test]
    fn ranking_mode_accepts_both_spellings() {
        assert_eq!("weighted-index".parse::<RankingMode>(), Ok(RankingMode::WeightedIndex));
        assert_eq!("top_n_frequency".parse::<RankingMode>(), Ok(RankingMode::TopNFrequency));
        assert!("cheapest".parse::<RankingMode>().is_err());
    }

    #[test]
    fn store_without_reference_total_is_left_out_of_index_ranking() {
        let products = vec![product("p1", "Lacteos", &[("X", 100), ("Y", 200)])];
        let mut stores = accumulate(&products, &BTreeSet::new()).stores;
        let mut broken = StoreAccumulation::new(StoreId::new("Z"));
        broken.sum_store_price = Decimal::from(5);
        broken.sample_count = 1;
        stores.insert(broken.store.clone(), broken);

        let ranking = rank_weighted_index(&stores, 5);

        let order: Vec<&str> = ranking.iter().map(|entry| entry.store.as_str()).collect();
        assert_eq!(order, vec!["X", "Y"]);
    }
}
