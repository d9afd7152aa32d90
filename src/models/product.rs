use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;

use crate::models::StockStatus;
use crate::utils::price::format_price;

pub const UNKNOWN_COLLECTION: &str = "unknown";

/// Column order shared by every tabular export.
pub const COLUMNS: [&str; 7] = [
    "id",
    "name",
    "url",
    "price",
    "collection",
    "status",
    "timestamp",
];

/// One product as extracted from a listing page.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRecord {
    pub id: String,
    pub name: String,
    pub url: String,
    pub price: Decimal,
    pub collection: String,
    pub status: StockStatus,
    pub fetched_at: DateTime<Utc>,
}

impl ProductRecord {
    pub fn new(
        id: String,
        name: String,
        url: String,
        price: Decimal,
        collection: &str,
        status: StockStatus,
    ) -> Self {
        let collection = if collection.trim().is_empty() {
            UNKNOWN_COLLECTION.to_string()
        } else {
            collection.to_string()
        };

        Self {
            id,
            name,
            url,
            price,
            collection,
            status,
            fetched_at: Utc::now(),
        }
    }

    pub fn timestamp(&self) -> String {
        self.fetched_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// Cell values in [`COLUMNS`] order.
    pub fn to_row(&self) -> [String; 7] {
        [
            self.id.clone(),
            self.name.clone(),
            self.url.clone(),
            format_price(self.price),
            self.collection.clone(),
            self.status.to_string(),
            self.timestamp(),
        ]
    }
}
