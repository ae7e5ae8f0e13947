//! Catalog entities held in the Data zone.
//!
//! These mirror the rows the search agent pulls out of the catalog. The engine
//! never interprets them beyond `id`; the remaining fields travel opaquely so
//! the template collaborator can render them.

use serde::{Deserialize, Serialize};

use super::types::{EntityRef, EntityType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    #[serde(default)]
    pub tenant_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Minor currency units.
    #[serde(default)]
    pub price: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub currency: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub stock_quantity: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub brand: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub category: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    #[serde(default)]
    pub tenant_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub price: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub currency: String,
    /// Human readable, e.g. "30 min".
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub duration: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(default)]
    pub rating: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub category: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provider: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub availability: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl Product {
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(EntityType::Product, self.id.clone())
    }
}

impl Service {
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(EntityType::Service, self.id.clone())
    }
}

/// Borrowed view of whichever entity a reference resolved to.
#[derive(Debug, Clone, Copy)]
pub enum EntityView<'a> {
    Product(&'a Product),
    Service(&'a Service),
}

impl EntityView<'_> {
    pub fn entity_ref(&self) -> EntityRef {
        match self {
            EntityView::Product(p) => p.entity_ref(),
            EntityView::Service(s) => s.entity_ref(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            EntityView::Product(p) => &p.name,
            EntityView::Service(s) => &s.name,
        }
    }
}
