//! Persistence port for the category tree
//!
//! The service never talks to a database handle directly. It opens a unit
//! of work with [`CategoryStore::begin`], performs every read and write of
//! one call on the returned [`CategoryTx`], and commits at the end. Dropping
//! a transaction without committing discards all of its writes.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

use crate::entity::category;
use crate::error::AppResult;

pub mod db;
pub mod memory;

pub use db::DbStore;
pub use memory::MemoryStore;

/// Columns a listing may be sorted by
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    Name,
    Code,
    Level,
    Path,
    CreatedAt,
    UpdatedAt,
    Id,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Resolved filter for one page of a flat listing
#[derive(Debug, Clone, Default)]
pub struct PageFilter {
    /// Case-insensitive substring over name, description and code
    pub search: Option<String>,
    pub active: Option<bool>,
    pub parent_id: Option<i64>,
    pub sort_by: SortField,
    pub order: SortOrder,
    pub offset: u64,
    pub limit: u64,
}

/// Row to insert; `level` and `path` are already computed
#[derive(Debug, Clone)]
pub struct NewCategory {
    pub name: String,
    pub description: Option<String>,
    pub code: Option<String>,
    pub parent_id: Option<i64>,
    pub level: i32,
    pub path: String,
    pub active: bool,
}

/// Category table access inside one transaction
#[async_trait]
pub trait CategoryRepository: Send {
    async fn find(&mut self, id: i64) -> AppResult<Option<category::Model>>;

    /// Like `find`, but holds a write lock on the row until the transaction
    /// ends
    async fn find_for_update(&mut self, id: i64) -> AppResult<Option<category::Model>>;

    /// Sibling with `name` under `parent_id`, optionally ignoring one id
    async fn find_sibling(
        &mut self,
        parent_id: Option<i64>,
        name: &str,
        exclude_id: Option<i64>,
    ) -> AppResult<Option<category::Model>>;

    /// Direct children ordered by name, then id
    async fn children(&mut self, parent_id: i64) -> AppResult<Vec<category::Model>>;

    /// Every row ordered by id
    async fn all(&mut self) -> AppResult<Vec<category::Model>>;

    /// One filtered page plus the total row count of the filter
    async fn page(&mut self, filter: &PageFilter) -> AppResult<(Vec<category::Model>, u64)>;

    /// Direct child counts for the given ids; ids without children are absent
    async fn child_counts(&mut self, ids: &[i64]) -> AppResult<HashMap<i64, u64>>;

    async fn insert(&mut self, new: NewCategory) -> AppResult<category::Model>;

    /// Persist every mutable column of `model` and bump `updated_at`
    async fn save(&mut self, model: category::Model) -> AppResult<category::Model>;

    async fn set_hierarchy(&mut self, id: i64, level: i32, path: &str) -> AppResult<()>;

    /// Returns the number of rows changed
    async fn set_active(&mut self, ids: &[i64], active: bool) -> AppResult<u64>;

    async fn delete(&mut self, id: i64) -> AppResult<()>;
}

/// The product catalog, seen only through its category reference
#[async_trait]
pub trait ProductCatalog: Send {
    async fn count_products(&mut self, category_id: i64) -> AppResult<u64>;

    /// Product counts for the given categories; empty categories are absent
    async fn product_counts(&mut self, category_ids: &[i64]) -> AppResult<HashMap<i64, u64>>;

    /// Number of distinct categories referenced by at least one product
    async fn categories_with_products(&mut self) -> AppResult<u64>;

    /// Returns the number of products detached
    async fn clear_category(&mut self, category_id: i64) -> AppResult<u64>;
}

/// A unit of work. Dropping it without `commit` rolls back.
#[async_trait]
pub trait CategoryTx: CategoryRepository + ProductCatalog {
    async fn commit(self: Box<Self>) -> AppResult<()>;
}

#[async_trait]
pub trait CategoryStore: Send + Sync {
    async fn begin(&self) -> AppResult<Box<dyn CategoryTx>>;

    /// Unit of work for read-only calls. It must not block, or be blocked
    /// by, concurrent writers; it is dropped instead of committed.
    async fn begin_read(&self) -> AppResult<Box<dyn CategoryTx>>;
}
