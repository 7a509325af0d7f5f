use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::offer::{OfferRecord, ProductRecord, StoreId};
use crate::errors::DataQualityIssue;

/// Decimal places kept on a market reference. Sums of references at this
/// scale stay exact, so folding order never changes the totals.
pub const REFERENCE_SCALE: u32 = 10;

/// Minimum number of eligible offers for a product to be comparable.
pub const MIN_ELIGIBLE_OFFERS: usize = 2;

/// Smallest accepted price; anything finer would round the market reference
/// to zero at [`REFERENCE_SCALE`].
pub const MIN_PRICE: Decimal = Decimal::from_parts(1, 0, 0, false, REFERENCE_SCALE);

/// Largest accepted price (10^15). Running sums of `u32::MAX` such prices
/// stay well inside `Decimal` range, so accumulation never overflows.
pub const MAX_PRICE: Decimal = Decimal::from_parts(2_764_472_320, 232_830, 0, false, 0);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum IneligibleReason {
    TooFewOffers { eligible: usize },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EligibleOfferSet {
    pub offers: Vec<OfferRecord>,
    pub market_reference: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Normalized {
    Eligible(EligibleOfferSet),
    Ineligible(IneligibleReason),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Normalization {
    pub result: Normalized,
    pub issues: Vec<DataQualityIssue>,
}

/// Filters a product down to its comparable offers and derives the market
/// reference from those offers only.
pub fn normalize(product: &ProductRecord, excluded_stores: &BTreeSet<StoreId>) -> Normalization {
    let mut issues = Vec::new();
    let mut seen = BTreeSet::new();
    let mut offers = Vec::with_capacity(product.offers.len());

    for offer in &product.offers {
        if excluded_stores.contains(&offer.store) {
            continue;
        }
        if offer.price <= Decimal::ZERO {
            issues.push(DataQualityIssue::NonPositivePrice {
                product_id: product.product_id.clone(),
                store: offer.store.clone(),
                price: offer.price,
            });
            continue;
        }
        if offer.price < MIN_PRICE || offer.price > MAX_PRICE {
            issues.push(DataQualityIssue::PriceOutOfRange {
                product_id: product.product_id.clone(),
                store: offer.store.clone(),
                price: offer.price,
            });
            continue;
        }
        if !seen.insert(offer.store.clone()) {
            issues.push(DataQualityIssue::DuplicateStoreOffer {
                product_id: product.product_id.clone(),
                store: offer.store.clone(),
            });
            continue;
        }
        offers.push(offer.clone());
    }

    for issue in &issues {
        tracing::warn!(
            event_name = "ranking.offer.dropped",
            product_id = %product.product_id,
            kind = issue.kind(),
            "{issue}"
        );
    }

    if offers.len() < MIN_ELIGIBLE_OFFERS {
        tracing::debug!(
            event_name = "ranking.product.ineligible",
            product_id = %product.product_id,
            eligible = offers.len(),
            "product has too few eligible offers to compare"
        );
        return Normalization {
            result: Normalized::Ineligible(IneligibleReason::TooFewOffers {
                eligible: offers.len(),
            }),
            issues,
        };
    }

    let total: Decimal = offers.iter().map(|offer| offer.price).sum();
    let market_reference = (total / Decimal::from(offers.len())).round_dp(REFERENCE_SCALE);

    Normalization {
        result: Normalized::Eligible(EligibleOfferSet { offers, market_reference }),
        issues,
    }
}
