//! Inputs and outputs of the category service

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::entity::category;
use crate::store::{SortField, SortOrder};
use crate::tree::CategoryTree;

/// Distinguishes an absent field from an explicit `null`
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Listing parameters
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub search: Option<String>,
    pub active: Option<bool>,
    pub parent_id: Option<i64>,
    pub sort_by: Option<SortField>,
    pub sort_order: Option<SortOrder>,
    #[serde(default)]
    pub hierarchical: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
    pub total_pages: u64,
}

impl Pagination {
    pub fn new(page: u64, page_size: u64, total: u64) -> Self {
        Self {
            page,
            page_size,
            total,
            total_pages: total.div_ceil(page_size.max(1)),
        }
    }
}

/// Flat listing row
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRow {
    #[serde(flatten)]
    pub category: category::Model,
    pub child_count: u64,
    pub product_count: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ListItems {
    Flat(Vec<CategoryRow>),
    Tree(Vec<CategoryTree>),
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryList {
    pub items: ListItems,
    pub pagination: Pagination,
}

/// A category with its direct children attached
#[derive(Debug, Clone, Serialize)]
pub struct CategoryDetail {
    #[serde(flatten)]
    pub category: category::Model,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<category::Model>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCategory {
    pub name: String,
    pub description: Option<String>,
    pub code: Option<String>,
    pub parent_id: Option<i64>,
    pub active: Option<bool>,
}

/// Partial update. For nullable columns an explicit `null` clears the value
/// (for `parentId`, promotes the node to a root) while an absent field
/// leaves it unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCategory {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub code: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub parent_id: Option<Option<i64>>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub message: String,
    pub reparented_children: u64,
    pub detached_products: u64,
}

/// Dropdown option labelled by materialized path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub value: i64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStats {
    pub total: u64,
    pub active: u64,
    pub inactive: u64,
    pub roots: u64,
    pub with_products: u64,
    pub by_level: BTreeMap<i32, u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkOperation {
    Activate,
    Deactivate,
    Delete,
    Move,
}

impl BulkOperation {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "activate" => Some(Self::Activate),
            "deactivate" => Some(Self::Deactivate),
            "delete" => Some(Self::Delete),
            "move" => Some(Self::Move),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkData {
    #[serde(default, deserialize_with = "double_option")]
    pub new_parent_id: Option<Option<i64>>,
    pub force: Option<bool>,
}

/// The operation stays a plain string so an unknown name is reported as an
/// invalid operation rather than a decoding failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkRequest {
    pub operation: String,
    pub ids: Vec<i64>,
    #[serde(default)]
    pub data: Option<BulkData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkOutcome {
    pub operation: BulkOperation,
    pub affected: u64,
}
