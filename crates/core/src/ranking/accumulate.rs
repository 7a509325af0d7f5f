//! Running per-store totals folded from normalized products.
//!
//! The fold is plain addition, so partial accumulations built over disjoint
//! slices of the product map can be merged field by field and yield the
//! same totals as a single sequential pass.

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;
use std::thread;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::normalize::{normalize, EligibleOfferSet, Normalized};
use crate::domain::offer::{CategoryId, ProductRecord, StoreId};
use crate::errors::DataQualityIssue;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryAccumulation {
    pub sum_store_price: Decimal,
    pub sum_market_reference: Decimal,
    pub sample_count: u32,
    /// Raw eligible prices for this (store, category), ascending.
    pub samples: Vec<Decimal>,
}

impl CategoryAccumulation {
    fn add(&mut self, price: Decimal, market_reference: Decimal) {
        self.sum_store_price += price;
        self.sum_market_reference += market_reference;
        self.sample_count += 1;
        let position = self.samples.partition_point(|sample| *sample <= price);
        self.samples.insert(position, price);
    }

    fn merge(&mut self, other: CategoryAccumulation) {
        self.sum_store_price += other.sum_store_price;
        self.sum_market_reference += other.sum_market_reference;
        self.sample_count += other.sample_count;
        for price in other.samples {
            let position = self.samples.partition_point(|sample| *sample <= price);
            self.samples.insert(position, price);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreAccumulation {
    pub store: StoreId,
    pub sum_store_price: Decimal,
    pub sum_market_reference: Decimal,
    pub sample_count: u32,
    pub per_category: BTreeMap<CategoryId, CategoryAccumulation>,
}

impl StoreAccumulation {
    pub fn new(store: StoreId) -> Self {
        Self {
            store,
            sum_store_price: Decimal::ZERO,
            sum_market_reference: Decimal::ZERO,
            sample_count: 0,
            per_category: BTreeMap::new(),
        }
    }

    fn add(&mut self, category: &CategoryId, price: Decimal, market_reference: Decimal) {
        self.sum_store_price += price;
        self.sum_market_reference += market_reference;
        self.sample_count += 1;
        self.per_category.entry(category.clone()).or_default().add(price, market_reference);
    }

    fn merge(&mut self, other: StoreAccumulation) {
        self.sum_store_price += other.sum_store_price;
        self.sum_market_reference += other.sum_market_reference;
        self.sample_count += other.sample_count;
        for (category, totals) in other.per_category {
            self.per_category.entry(category).or_default().merge(totals);
        }
    }
}

/// Counters describing what one fold saw, kept next to the totals so they
/// merge the same way.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldDiagnostics {
    pub products_seen: u32,
    pub products_ineligible: u32,
    pub offers_dropped: u32,
}

impl FoldDiagnostics {
    fn merge(&mut self, other: FoldDiagnostics) {
        self.products_seen += other.products_seen;
        self.products_ineligible += other.products_ineligible;
        self.offers_dropped += other.offers_dropped;
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Accumulation {
    pub stores: BTreeMap<StoreId, StoreAccumulation>,
    pub diagnostics: FoldDiagnostics,
    pub issues: Vec<DataQualityIssue>,
}

impl Accumulation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds every eligible offer of one product to its store and category totals.
    pub fn fold(&mut self, eligible: &EligibleOfferSet, category: &CategoryId) {
        for offer in &eligible.offers {
            self.stores
                .entry(offer.store.clone())
                .or_insert_with(|| StoreAccumulation::new(offer.store.clone()))
                .add(category, offer.price, eligible.market_reference);
        }
    }

    /// Normalizes one product and folds it when it is comparable.
    pub fn fold_product(&mut self, product: &ProductRecord, excluded_stores: &BTreeSet<StoreId>) {
        let normalization = normalize(product, excluded_stores);
        self.diagnostics.products_seen += 1;
        self.diagnostics.offers_dropped += normalization.issues.len() as u32;
        self.issues.extend(normalization.issues);

        match normalization.result {
            Normalized::Eligible(eligible) => self.fold(&eligible, &product.category),
            Normalized::Ineligible(_) => self.diagnostics.products_ineligible += 1,
        }
    }

    pub fn merge(mut self, other: Accumulation) -> Accumulation {
        for (store, totals) in other.stores {
            match self.stores.get_mut(&store) {
                Some(existing) => existing.merge(totals),
                None => {
                    self.stores.insert(store, totals);
                }
            }
        }
        self.diagnostics.merge(other.diagnostics);
        self.issues.extend(other.issues);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

pub fn accumulate<'a, I>(products: I, excluded_stores: &BTreeSet<StoreId>) -> Accumulation
where
    I: IntoIterator<Item = &'a ProductRecord>,
{
    let mut accumulation = Accumulation::new();
    for product in products {
        accumulation.fold_product(product, excluded_stores);
    }
    accumulation
}

/// Folds disjoint chunks on scoped worker threads and reduces the partial
/// results with [`Accumulation::merge`]. Each worker owns its partial
/// accumulation outright; the reduce is the only point where they meet.
pub fn accumulate_sharded(
    products: &[&ProductRecord],
    excluded_stores: &BTreeSet<StoreId>,
    shards: NonZeroUsize,
) -> Accumulation {
    let shards = shards.get().min(products.len().max(1));
    if shards == 1 {
        return accumulate(products.iter().copied(), excluded_stores);
    }

    let chunk_size = products.len().div_ceil(shards);
    thread::scope(|scope| {
        let workers: Vec<_> = products
            .chunks(chunk_size)
            .map(|chunk| {
                scope.spawn(move || accumulate(chunk.iter().copied(), excluded_stores))
            })
            .collect();

        workers.into_iter().fold(Accumulation::new(), |merged, worker| match worker.join() {
            Ok(partial) => merged.merge(partial),
            Err(panic) => std::panic::resume_unwind(panic),
        })
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::num::NonZeroUsize;

    use rust_decimal::Decimal;

    use super::{accumulate, accumulate_sharded, Accumulation};
    use crate::domain::offer::{CategoryId, OfferRecord, ProductId, ProductRecord, StoreId};

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

    fn catalog() -> Vec<ProductRecord> {
        vec![
            product("p1", "Lacteos", &[("X", 100), ("Y", 200)]),
            product("p2", "Lacteos", &[("X", 300), ("Y", 100), ("Z", 110)]),
            product("p3", "Limpieza", &[("Y", 40), ("Z", 45)]),
            product("p4", "Limpieza", &[("X", 10)]),
            product("p5", "Charcuteria", &[("X", 7), ("Y", 11), ("Z", 13)]),
            product("p6", "Charcuteria", &[("Z", 0), ("Y", 8), ("X", 9)]),
        ]
    }

    #[test]
    fn fold_updates_store_and_category_totals() {
        let products = vec![product("p1", "Lacteos", &[("X", 100), ("Y", 200)])];
        let accumulation = accumulate(&products, &BTreeSet::new());

        let x = &accumulation.stores[&StoreId::new("X")];
        assert_eq!(x.sum_store_price, Decimal::from(100));
        assert_eq!(x.sum_market_reference, Decimal::from(150));
        assert_eq!(x.sample_count, 1);

        let lacteos = &x.per_category[&CategoryId::new("Lacteos")];
        assert_eq!(lacteos.sum_store_price, Decimal::from(100));
        assert_eq!(lacteos.sum_market_reference, Decimal::from(150));
        assert_eq!(lacteos.sample_count, 1);
        assert_eq!(lacteos.samples, vec![Decimal::from(100)]);
    }

    #[test]
    fn single_offer_product_contributes_nothing() {
        let products = vec![product("p4", "Limpieza", &[("X", 10)])];
        let accumulation = accumulate(&products, &BTreeSet::new());

        assert!(accumulation.is_empty());
        assert_eq!(accumulation.diagnostics.products_seen, 1);
        assert_eq!(accumulation.diagnostics.products_ineligible, 1);
    }

    #[test]
    fn dropped_offers_are_counted_and_kept_as_issues() {
        let products = vec![product("p6", "Charcuteria", &[("Z", 0), ("Y", 8), ("X", 9)])];
        let accumulation = accumulate(&products, &BTreeSet::new());

        assert_eq!(accumulation.diagnostics.offers_dropped, 1);
        assert_eq!(accumulation.issues.len(), 1);
        assert!(!accumulation.stores.contains_key(&StoreId::new("Z")));
    }

    #[test]
    fn fold_order_does_not_change_totals() {
        let products = catalog();
        let forward = accumulate(&products, &BTreeSet::new());
        let backward = accumulate(products.iter().rev(), &BTreeSet::new());

        assert_eq!(forward.stores, backward.stores);
    }

    #[test]
    fn merging_partials_matches_sequential_fold() {
        let products = catalog();
        let excluded = BTreeSet::new();
        let sequential = accumulate(&products, &excluded);

        let (left, right) = products.split_at(2);
        let merged = accumulate(left, &excluded).merge(accumulate(right, &excluded));

        assert_eq!(merged.stores, sequential.stores);
        assert_eq!(merged.diagnostics, sequential.diagnostics);
    }

    #[test]
    fn merge_with_empty_is_identity() {
        let products = catalog();
        let accumulation = accumulate(&products, &BTreeSet::new());
        let merged = accumulation.clone().merge(Accumulation::new());

        assert_eq!(merged, accumulation);
    }

    #[test]
    fn sharded_fold_matches_sequential_fold() {
        let products = catalog();
        let refs: Vec<&ProductRecord> = products.iter().collect();
        let excluded: BTreeSet<StoreId> = [StoreId::new("Z")].into_iter().collect();
        let sequential = accumulate(&products, &excluded);

        for shards in [1, 2, 3, 4, 16] {
            let sharded = accumulate_sharded(
                &refs,
                &excluded,
                NonZeroUsize::new(shards).expect("non-zero shard count"),
            );
            assert_eq!(sharded.stores, sequential.stores, "shards = {shards}");
            assert_eq!(sharded.diagnostics, sequential.diagnostics, "shards = {shards}");
        }
    }

    #[test]
    fn sharded_fold_over_empty_input_is_empty() {
        let sharded = accumulate_sharded(
            &[],
            &BTreeSet::new(),
            NonZeroUsize::new(4).expect("non-zero shard count"),
        );
        assert!(sharded.is_empty());
    }
}
