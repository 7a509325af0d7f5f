//! Ingestion boundary between loosely-typed catalog hits and the strict
//! offer model.
//!
//! Catalog pages arrive one category at a time in the upstream shape:
//!
//! ```json
//! { "productID": "7591", "tiendas": [ { "tienda": "Plaza's", "precio": 2.35 } ] }
//! ```
//!
//! Field values may be strings, numbers or null. Everything that cannot be
//! coerced is dropped here and reported as a [`DataQualityIssue`]; the
//! ranking engine only ever sees [`ProductRecord`]s.

use std::collections::btree_map::Entry;
use std::collections::BTreeSet;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::offer::{CategoryId, OfferRecord, ProductId, ProductMap, ProductRecord, StoreId};
use crate::errors::DataQualityIssue;

pub const FALLBACK_CATEGORY: &str = "Otros";

const PRODUCT_ID_FIELD: &str = "productID";
const OFFERS_FIELD: &str = "tiendas";
const STORE_FIELD: &str = "tienda";
const PRICE_FIELD: &str = "precio";

/// One page of catalog hits for a queried category.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogPage {
    pub category: String,
    #[serde(default)]
    pub hits: Vec<Value>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSummary {
    pub accepted: u32,
    /// Products already filed under an earlier category.
    pub duplicates: u32,
    pub rejected: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    pub products: ProductMap,
    pub issues: Vec<DataQualityIssue>,
    pub pages_skipped: u32,
}

/// Builds a deduplicated product map; the first category a product is seen
/// under is the one it keeps.
#[derive(Debug, Default)]
pub struct CatalogIngestor {
    excluded_categories: BTreeSet<CategoryId>,
    products: ProductMap,
    issues: Vec<DataQualityIssue>,
    pages_skipped: u32,
}

impl CatalogIngestor {
    pub fn new(excluded_categories: BTreeSet<CategoryId>) -> Self {
        Self { excluded_categories, ..Self::default() }
    }

    pub fn is_excluded(&self, category: &CategoryId) -> bool {
        self.excluded_categories.contains(category)
    }

    pub fn ingest_page(&mut self, category: &str, hits: &[Value]) -> PageSummary {
        let category = normalize_category(category);
        let mut summary = PageSummary::default();

        if self.is_excluded(&category) {
            self.pages_skipped += 1;
            tracing::debug!(
                event_name = "ingest.page.skipped",
                category = %category,
                "category is excluded"
            );
            return summary;
        }

        for hit in hits {
            let Some(product) = self.coerce_hit(&category, hit) else {
                summary.rejected += 1;
                continue;
            };
            match self.products.entry(product.product_id.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(product);
                    summary.accepted += 1;
                }
                Entry::Occupied(existing) => {
                    tracing::trace!(
                        event_name = "ingest.product.duplicate",
                        product_id = %existing.key(),
                        kept_category = %existing.get().category,
                        ignored_category = %category,
                        "product already filed under an earlier category"
                    );
                    summary.duplicates += 1;
                }
            }
        }

        tracing::debug!(
            event_name = "ingest.page.processed",
            category = %category,
            accepted = summary.accepted,
            duplicates = summary.duplicates,
            rejected = summary.rejected,
            "catalog page ingested"
        );
        summary
    }

    pub fn ingest_pages<'a, I>(&mut self, pages: I) -> PageSummary
    where
        I: IntoIterator<Item = &'a CatalogPage>,
    {
        pages.into_iter().fold(PageSummary::default(), |mut total, page| {
            let summary = self.ingest_page(&page.category, &page.hits);
            total.accepted += summary.accepted;
            total.duplicates += summary.duplicates;
            total.rejected += summary.rejected;
            total
        })
    }

    pub fn finish(self) -> IngestOutcome {
        IngestOutcome {
            products: self.products,
            issues: self.issues,
            pages_skipped: self.pages_skipped,
        }
    }

    fn coerce_hit(&mut self, category: &CategoryId, hit: &Value) -> Option<ProductRecord> {
        let Some(product_id) = hit.get(PRODUCT_ID_FIELD).and_then(coerce_text) else {
            self.record(DataQualityIssue::MissingProductId);
            return None;
        };
        let product_id = ProductId::new(product_id);

        let raw_offers = hit.get(OFFERS_FIELD).and_then(Value::as_array);
        let mut offers = Vec::new();
        for raw in raw_offers.into_iter().flatten() {
            match coerce_offer(&product_id, raw) {
                Ok(offer) => offers.push(offer),
                Err(issue) => self.record(issue),
            }
        }

        Some(ProductRecord { product_id, category: category.clone(), offers })
    }

    fn record(&mut self, issue: DataQualityIssue) {
        tracing::warn!(event_name = "ingest.offer.dropped", kind = issue.kind(), "{issue}");
        self.issues.push(issue);
    }
}

fn normalize_category(category: &str) -> CategoryId {
    let trimmed = category.trim();
    if trimmed.is_empty() {
        CategoryId::new(FALLBACK_CATEGORY)
    } else {
        CategoryId::new(trimmed)
    }
}

fn coerce_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn coerce_offer(product_id: &ProductId, raw: &Value) -> Result<OfferRecord, DataQualityIssue> {
    let store = raw
        .get(STORE_FIELD)
        .and_then(coerce_text)
        .map(StoreId::new)
        .ok_or_else(|| DataQualityIssue::MissingStore { product_id: product_id.clone() })?;

    let price = match raw.get(PRICE_FIELD) {
        None | Some(Value::Null) => {
            return Err(DataQualityIssue::MissingPrice { product_id: product_id.clone(), store });
        }
        Some(value) => parse_price(value).ok_or_else(|| DataQualityIssue::UnparseablePrice {
            product_id: product_id.clone(),
            store: store.clone(),
            raw: value.to_string(),
        })?,
    };

    Ok(OfferRecord { store, price })
}

/// Accepts JSON numbers and numeric strings, including exponent notation.
pub fn parse_price(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text).or_else(|_| Decimal::from_scientific(&text)).ok()
}

/// The category and store universe used to build inclusion checklists.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facets {
    pub categories: Vec<CategoryId>,
    pub stores: Vec<StoreId>,
}

impl Facets {
    /// Every category and store named in the pages, sorted, no exclusions applied.
    pub fn from_pages(pages: &[CatalogPage]) -> Self {
        let mut categories = BTreeSet::new();
        let mut stores = BTreeSet::new();
        for page in pages {
            categories.insert(normalize_category(&page.category));
            for hit in &page.hits {
                let offers = hit.get(OFFERS_FIELD).and_then(Value::as_array);
                for offer in offers.into_iter().flatten() {
                    if let Some(store) = offer.get(STORE_FIELD).and_then(coerce_text) {
                        stores.insert(StoreId::new(store));
                    }
                }
            }
        }
        Self { categories: categories.into_iter().collect(), stores: stores.into_iter().collect() }
    }
}
