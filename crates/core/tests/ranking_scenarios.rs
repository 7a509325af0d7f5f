use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde_json::json;
use storerank_core::{
    assemble, CatalogIngestor, CategoryId, DeterministicRankingEngine, ProductMap, RankingConfig,
    RankingEngine, RankingInput, RankingMode, RankingOutcome, ReportProvenance, StoreId,
};

fn ingest(pages: &[(&str, serde_json::Value)]) -> ProductMap {
    let mut ingestor = CatalogIngestor::new(BTreeSet::new());
    for (category, hits) in pages {
        let hits = hits.as_array().cloned().unwrap_or_default();
        ingestor.ingest_page(category, &hits);
    }
    ingestor.finish().products
}

fn engine(config: RankingConfig) -> DeterministicRankingEngine {
    DeterministicRankingEngine::new(config).expect("config should be valid")
}

fn permissive() -> RankingConfig {
    RankingConfig { min_store_samples: 1, min_category_samples: 1, ..RankingConfig::default() }
}

#[test]
fn cheaper_store_ranks_first() {
    let products = ingest(&[(
        "Lacteos",
        json!([
            { "productID": "p1", "tiendas": [{ "tienda": "X", "precio": 100 }, { "tienda": "Y", "precio": 200 }] },
            { "productID": "p2", "tiendas": [{ "tienda": "X", "precio": 300 }, { "tienda": "Y", "precio": 100 }] }
        ]),
    )]);

    let run = engine(permissive())
        .rank(RankingInput { products: &products, excluded_stores: &BTreeSet::new() });
    let RankingOutcome::WeightedIndex(entries) = run.outcome else {
        panic!("expected weighted-index outcome");
    };

    let order: Vec<&str> = entries.iter().map(|entry| entry.store.as_str()).collect();
    assert_eq!(order, vec!["Y", "X"]);
    assert_eq!(entries[0].index.round_dp(4), Decimal::new(8571, 4));
    assert_eq!(entries[1].index.round_dp(4), Decimal::new(11429, 4));
    assert_eq!(entries[0].top_categories[0].category, CategoryId::new("Lacteos"));
}

#[test]
fn exclusion_leaves_single_store_product_out() {
    let products = ingest(&[(
        "Limpieza",
        json!([
            { "productID": "p1", "tiendas": [{ "tienda": "X", "precio": 5 }, { "tienda": "Banned", "precio": 4 }] },
            { "productID": "p2", "tiendas": [{ "tienda": "X", "precio": 10 }, { "tienda": "Y", "precio": 12 }] }
        ]),
    )]);
    let excluded: BTreeSet<StoreId> = [StoreId::new("Banned")].into_iter().collect();

    let run = engine(permissive()).rank(RankingInput { products: &products, excluded_stores: &excluded });
    let RankingOutcome::WeightedIndex(entries) = run.outcome else {
        panic!("expected weighted-index outcome");
    };

    assert_eq!(run.diagnostics.products_ineligible, 1);
    let x = entries.iter().find(|entry| entry.store.as_str() == "X").expect("X should rank");
    assert_eq!(x.sample_count, 1, "only the two-store product counts");
    assert!(entries.iter().all(|entry| entry.store.as_str() != "Banned"));
}

#[test]
fn insufficient_data_is_an_empty_report() {
    let products = ingest(&[(
        "Licores",
        json!([
            { "productID": "p1", "tiendas": [{ "tienda": "X", "precio": 5 }] },
            { "productID": "p2", "tiendas": [{ "tienda": "X", "precio": 10 }, { "tienda": "Y", "precio": 12 }] }
        ]),
    )]);

    for mode in [RankingMode::WeightedIndex, RankingMode::TopNFrequency] {
        let config = RankingConfig { mode, ..RankingConfig::default() };
        let run = engine(config)
            .rank(RankingInput { products: &products, excluded_stores: &BTreeSet::new() });
        let report = assemble(run, config, ReportProvenance::now(BTreeSet::new(), BTreeSet::new()));

        assert!(report.is_empty(), "mode {mode:?} should produce an empty report");
        assert_eq!(report.diagnostics.stores_below_threshold.len(), 2);
    }
}

#[test]
fn product_seen_in_two_categories_counts_once_under_the_first() {
    let hit = json!({
        "productID": "p1",
        "tiendas": [{ "tienda": "X", "precio": 90 }, { "tienda": "Y", "precio": 110 }]
    });
    let products = ingest(&[("Desayuno", json!([hit.clone()])), ("Lacteos", json!([hit]))]);

    let run = engine(permissive())
        .rank(RankingInput { products: &products, excluded_stores: &BTreeSet::new() });
    let RankingOutcome::WeightedIndex(entries) = run.outcome else {
        panic!("expected weighted-index outcome");
    };

    assert_eq!(entries[0].store, StoreId::new("X"));
    assert_eq!(entries[0].sample_count, 1);
    let categories: Vec<&str> =
        entries[0].top_categories.iter().map(|entry| entry.category.as_str()).collect();
    assert_eq!(categories, vec!["Desayuno"]);
}

#[test]
fn frequency_mode_report_is_serializable_as_is() {
    let products = ingest(&[
        (
            "A",
            json!([{ "productID": "a1", "tiendas": [{ "tienda": "X", "precio": "1.10" }, { "tienda": "Y", "precio": "1.20" }] }]),
        ),
        (
            "B",
            json!([{ "productID": "b1", "tiendas": [{ "tienda": "X", "precio": 3 }, { "tienda": "Y", "precio": 2 }] }]),
        ),
    ]);
    let config = RankingConfig { mode: RankingMode::TopNFrequency, ..permissive() };

    let run = engine(config).rank(RankingInput { products: &products, excluded_stores: &BTreeSet::new() });
    let report = assemble(run, config, ReportProvenance::now(BTreeSet::new(), BTreeSet::new()));
    let json = serde_json::to_value(&report).expect("report should serialize");

    assert_eq!(json["result"]["mode"], "top_n_frequency");
    assert_eq!(json["result"]["ranking"]["overall_ranking"][0]["store"], "X");
    assert_eq!(json["result"]["ranking"]["overall_ranking"][0]["tally_total"], 2);
    let estimate = json["result"]["ranking"]["per_category"]["A"][0]["estimate"]
        .as_str()
        .and_then(|raw| raw.parse::<Decimal>().ok());
    assert_eq!(estimate, Some(Decimal::new(11, 1)));
}
