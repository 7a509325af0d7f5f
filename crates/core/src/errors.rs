use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::offer::{ProductId, StoreId};

/// Per-record problem found while coercing or normalizing offers.
///
/// Never fatal: the offending hit or offer is dropped and processing
/// continues with the rest of the product.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataQualityIssue {
    #[error("catalog hit without a product id")]
    MissingProductId,
    #[error("offer for product `{product_id}` has no store")]
    MissingStore { product_id: ProductId },
    #[error("offer for product `{product_id}` at `{store}` has no price")]
    MissingPrice { product_id: ProductId, store: StoreId },
    #[error("offer for product `{product_id}` at `{store}` has unparseable price `{raw}`")]
    UnparseablePrice { product_id: ProductId, store: StoreId, raw: String },
    #[error("offer for product `{product_id}` at `{store}` has non-positive price {price}")]
    NonPositivePrice { product_id: ProductId, store: StoreId, price: Decimal },
    #[error("offer for product `{product_id}` at `{store}` has out-of-range price {price}")]
    PriceOutOfRange { product_id: ProductId, store: StoreId, price: Decimal },
    #[error("product `{product_id}` lists `{store}` more than once")]
    DuplicateStoreOffer { product_id: ProductId, store: StoreId },
}

impl DataQualityIssue {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingProductId => "missing_product_id",
            Self::MissingStore { .. } => "missing_store",
            Self::MissingPrice { .. } => "missing_price",
            Self::UnparseablePrice { .. } => "unparseable_price",
            Self::NonPositivePrice { .. } => "non_positive_price",
            Self::PriceOutOfRange { .. } => "price_out_of_range",
            Self::DuplicateStoreOffer { .. } => "duplicate_store_offer",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// Caller bug: rejected before any accumulation starts.
    #[error("invalid ranking configuration: {0}")]
    Configuration(String),
}
