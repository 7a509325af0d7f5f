//! Point estimators over a store's raw price sample.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Estimator {
    #[default]
    Mean,
    Median,
}

impl Estimator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Median => "median",
        }
    }

    /// Returns `None` for an empty sample.
    pub fn estimate(&self, prices: &[Decimal]) -> Option<Decimal> {
        match self {
            Self::Mean => mean(prices),
            Self::Median => median(prices),
        }
    }
}

impl std::str::FromStr for Estimator {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "median" => Ok(Self::Median),
            other => Err(EngineError::Configuration(format!(
                "unsupported estimator `{other}` (expected mean|median)"
            ))),
        }
    }
}

pub fn mean(prices: &[Decimal]) -> Option<Decimal> {
    if prices.is_empty() {
        return None;
    }
    let total: Decimal = prices.iter().sum();
    Some(total / Decimal::from(prices.len()))
}

/// Middle element for odd lengths, mean of the two middle elements for even.
pub fn median(prices: &[Decimal]) -> Option<Decimal> {
    if prices.is_empty() {
        return None;
    }
    let mut sorted = prices.to_vec();
    sorted.sort();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / Decimal::TWO)
    } else {
        Some(sorted[mid])
    }
}
