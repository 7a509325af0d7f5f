use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::rank::RankingOutcome;
use super::{RankingConfig, RankingRun, RunDiagnostics};
use crate::domain::offer::{CategoryId, StoreId};

/// Caller-supplied context recorded alongside a generated ranking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportProvenance {
    pub generated_at: DateTime<Utc>,
    pub excluded_stores: BTreeSet<StoreId>,
    pub excluded_categories: BTreeSet<CategoryId>,
}

impl ReportProvenance {
    pub fn now(
        excluded_stores: BTreeSet<StoreId>,
        excluded_categories: BTreeSet<CategoryId>,
    ) -> Self {
        Self { generated_at: Utc::now(), excluded_stores, excluded_categories }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedReport {
    pub report_id: Uuid,
    pub provenance: ReportProvenance,
    pub config: RankingConfig,
    pub diagnostics: RunDiagnostics,
    pub result: RankingOutcome,
}

impl RankedReport {
    /// True when no store qualified; consumers render a "no data" state.
    pub fn is_empty(&self) -> bool {
        self.result.is_empty()
    }
}

pub fn assemble(run: RankingRun, config: RankingConfig, provenance: ReportProvenance) -> RankedReport {
    RankedReport {
        report_id: Uuid::new_v4(),
        provenance,
        config,
        diagnostics: run.diagnostics,
        result: run.outcome,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{assemble, RankedReport, ReportProvenance};
    use crate::domain::offer::{CategoryId, StoreId};
    use crate::ranking::rank::{RankedEntry, RankingOutcome};
    use crate::ranking::{RankingConfig, RankingRun, RunDiagnostics};

    fn provenance() -> ReportProvenance {
        ReportProvenance {
            generated_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("valid time"),
            excluded_stores: [StoreId::new("Kalea")].into_iter().collect(),
            excluded_categories: [CategoryId::new("Licores")].into_iter().collect(),
        }
    }

    fn run(outcome: RankingOutcome) -> RankingRun {
        RankingRun { outcome, diagnostics: RunDiagnostics::default() }
    }

    #[test]
    fn assemble_keeps_ranking_and_provenance_unchanged() {
        let entries = vec![RankedEntry {
            store: StoreId::new("Y"),
            index: Decimal::new(8571, 4),
            sample_count: 7,
            top_categories: Vec::new(),
        }];
        let report = assemble(
            run(RankingOutcome::WeightedIndex(entries.clone())),
            RankingConfig::default(),
            provenance(),
        );

        assert_eq!(report.result, RankingOutcome::WeightedIndex(entries));
        assert_eq!(report.provenance, provenance());
        assert!(!report.is_empty());
    }

    #[test]
    fn empty_outcome_marks_report_as_no_data() {
        let report = assemble(
            run(RankingOutcome::WeightedIndex(Vec::new())),
            RankingConfig::default(),
            ReportProvenance::now(BTreeSet::new(), BTreeSet::new()),
        );
        assert!(report.is_empty());
    }

    #[test]
    fn report_serializes_and_reads_back() {
        let report = assemble(
            run(RankingOutcome::WeightedIndex(Vec::new())),
            RankingConfig::default(),
            provenance(),
        );
        let json = serde_json::to_value(&report).expect("report should serialize");

        assert_eq!(json["result"]["mode"], "weighted_index");
        assert_eq!(json["config"]["mode"], "weighted_index");
        assert_eq!(json["provenance"]["excluded_stores"][0], "Kalea");

        let decoded: RankedReport = serde_json::from_value(json).expect("report should decode");
        assert_eq!(decoded, report);
    }
}
