pub mod config;
pub mod domain;
pub mod errors;
pub mod ingest;
pub mod ranking;

pub use domain::offer::{CategoryId, OfferRecord, ProductId, ProductMap, ProductRecord, StoreId};
pub use errors::{DataQualityIssue, EngineError};
pub use ingest::{CatalogIngestor, CatalogPage, Facets, IngestOutcome};
pub use ranking::{
    estimator::Estimator,
    rank::{FrequencyReport, RankedEntry, RankingMode, RankingOutcome, TallyEntry},
    report::{assemble, RankedReport, ReportProvenance},
    DeterministicRankingEngine, RankingConfig, RankingEngine, RankingInput, RankingRun,
    RunDiagnostics,
};
