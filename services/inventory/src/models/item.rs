//! Catalog items

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Largest stock a restock or return may leave behind
pub const MAX_STOCK: i32 = i32::MAX;

/// An item in the store; `stock` never drops below zero
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: f64,
    pub stock: i32,
    pub rentable: bool,
    pub image_filename: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Item {
    pub fn is_low_stock(&self, threshold: i32) -> bool {
        self.stock <= threshold
    }
}

/// Payload for adding an item to the catalog
#[derive(Debug, Clone, Deserialize)]
pub struct NewItem {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub rentable: bool,
    pub image_filename: Option<String>,
}

/// Catalog listing filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemQuery {
    pub category: Option<String>,
    pub rentable: Option<bool>,
    /// Case-insensitive match on the name
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ItemQuery {
    /// Whether `item` passes the category, rentable and search filters
    pub fn matches(&self, item: &Item) -> bool {
        let category = self
            .category
            .as_deref()
            .is_none_or(|category| item.category.as_deref() == Some(category));
        let rentable = self.rentable.is_none_or(|rentable| item.rentable == rentable);
        let search = self.search.as_deref().is_none_or(|needle| {
            item.name
                .to_lowercase()
                .contains(&needle.to_lowercase())
        });
        category && rentable && search
    }
}
