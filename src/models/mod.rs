use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod product;

pub use product::*;

/// Availability of a product as shown on the storefront.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    SoldOut,
    NewItem,
    Preorder,
}

impl StockStatus {
    pub const ALL: [StockStatus; 4] = [
        StockStatus::InStock,
        StockStatus::SoldOut,
        StockStatus::NewItem,
        StockStatus::Preorder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::InStock => "in_stock",
            StockStatus::SoldOut => "sold_out",
            StockStatus::NewItem => "new_item",
            StockStatus::Preorder => "preorder",
        }
    }
}

impl fmt::Display for StockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StockStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in_stock" | "instock" => Ok(StockStatus::InStock),
            "sold_out" | "soldout" => Ok(StockStatus::SoldOut),
            "new_item" | "new_items" | "newitems" => Ok(StockStatus::NewItem),
            "preorder" | "pre_order" => Ok(StockStatus::Preorder),
            other => Err(format!(
                "unknown stock status '{other}' (expected in_stock, sold_out, new_items, preorder or all)"
            )),
        }
    }
}
