//! In-process store
//!
//! Write transactions are serialized by a writer lock held for their whole
//! lifetime. They work on a private copy of the state, which replaces the
//! published state on commit. A read transaction copies the published state
//! under a short read lock, so it never waits for an open writer.
//! Sibling-name uniqueness is checked when the transaction commits, matching
//! the deferred `(parent_id, name)` constraint of the database.

use async_trait::async_trait;
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::{
    CategoryRepository, CategoryStore, CategoryTx, NewCategory, PageFilter, ProductCatalog,
    SortField, SortOrder,
};
use crate::entity::category;
use crate::tree;
use crate::error::{AppError, AppResult, Conflict};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    categories: BTreeMap<i64, category::Model>,
    /// product id -> category id
    products: BTreeMap<i64, Option<i64>>,
    next_category_id: i64,
    next_product_id: i64,
}

impl MemoryState {
    fn check_unique(&self) -> AppResult<()> {
        let mut seen = HashSet::new();
        for c in self.categories.values() {
            if !seen.insert((c.parent_id, c.name.as_str())) {
                return Err(Conflict::UniqueViolation(format!(
                    "cad_category (parent_id, name) = ({:?}, {})",
                    c.parent_id, c.name
                ))
                .into());
            }
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    /// Published state; only ever locked briefly
    state: Arc<RwLock<MemoryState>>,
    /// Held by a write transaction from `begin` until commit or drop
    writer: Arc<Mutex<()>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a product in the catalog, returning its id
    pub async fn add_product(&self, category_id: Option<i64>) -> i64 {
        let _writer = self.writer.lock().await;
        let mut state = self.state.write().await;
        state.next_product_id += 1;
        let id = state.next_product_id;
        state.products.insert(id, category_id);
        id
    }

    /// Category a product points at; `None` if the product is unknown
    pub async fn product_category(&self, product_id: i64) -> Option<Option<i64>> {
        self.state.read().await.products.get(&product_id).copied()
    }
}

#[async_trait]
impl CategoryStore for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn CategoryTx>> {
        let writer = self.writer.clone().lock_owned().await;
        let work = self.state.read().await.clone();
        Ok(Box::new(MemoryTx {
            writer: Some(writer),
            state: self.state.clone(),
            work,
        }))
    }

    async fn begin_read(&self) -> AppResult<Box<dyn CategoryTx>> {
        let work = self.state.read().await.clone();
        Ok(Box::new(MemoryTx {
            writer: None,
            state: self.state.clone(),
            work,
        }))
    }
}

struct MemoryTx {
    /// `None` for read-only snapshots
    writer: Option<OwnedMutexGuard<()>>,
    state: Arc<RwLock<MemoryState>>,
    work: MemoryState,
}

fn matches_search(model: &category::Model, needle: &str) -> bool {
    let hit = |value: &str| value.to_lowercase().contains(needle);
    hit(&model.name)
        || model.description.as_deref().is_some_and(hit)
        || model.code.as_deref().is_some_and(hit)
}

fn compare_by(field: SortField, a: &category::Model, b: &category::Model) -> Ordering {
    match field {
        SortField::Name => a.name.cmp(&b.name),
        SortField::Code => a.code.cmp(&b.code),
        SortField::Level => a.level.cmp(&b.level),
        SortField::Path => a.path.cmp(&b.path),
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        SortField::Id => a.id.cmp(&b.id),
    }
}

fn count_by<I>(keys: I, wanted: &[i64]) -> HashMap<i64, u64>
where
    I: Iterator<Item = Option<i64>>,
{
    let wanted: HashSet<i64> = wanted.iter().copied().collect();
    let mut counts = HashMap::new();
    for key in keys.flatten().filter(|k| wanted.contains(k)) {
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

#[async_trait]
impl CategoryRepository for MemoryTx {
    async fn find(&mut self, id: i64) -> AppResult<Option<category::Model>> {
        Ok(self.work.categories.get(&id).cloned())
    }

    // Write transactions already hold the whole store.
    async fn find_for_update(&mut self, id: i64) -> AppResult<Option<category::Model>> {
        self.find(id).await
    }

    async fn find_sibling(
        &mut self,
        parent_id: Option<i64>,
        name: &str,
        exclude_id: Option<i64>,
    ) -> AppResult<Option<category::Model>> {
        Ok(self
            .work
            .categories
            .values()
            .find(|c| c.parent_id == parent_id && c.name == name && Some(c.id) != exclude_id)
            .cloned())
    }

    async fn children(&mut self, parent_id: i64) -> AppResult<Vec<category::Model>> {
        let mut children: Vec<_> = self
            .work
            .categories
            .values()
            .filter(|c| c.parent_id == Some(parent_id))
            .cloned()
            .collect();
        children.sort_by(tree::by_name);
        Ok(children)
    }

    async fn all(&mut self) -> AppResult<Vec<category::Model>> {
        Ok(self.work.categories.values().cloned().collect())
    }

    async fn page(&mut self, filter: &PageFilter) -> AppResult<(Vec<category::Model>, u64)> {
        let needle = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut rows: Vec<_> = self
            .work
            .categories
            .values()
            .filter(|c| needle.as_deref().map_or(true, |n| matches_search(c, n)))
            .filter(|c| filter.active.map_or(true, |a| c.active == a))
            .filter(|c| filter.parent_id.map_or(true, |p| c.parent_id == Some(p)))
            .cloned()
            .collect();

        rows.sort_by(|a, b| {
            let primary = compare_by(filter.sort_by, a, b);
            let primary = match filter.order {
                SortOrder::Asc => primary,
                SortOrder::Desc => primary.reverse(),
            };
            primary.then(a.id.cmp(&b.id))
        });

        let total = rows.len() as u64;
        let items = rows
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .collect();
        Ok((items, total))
    }

    async fn child_counts(&mut self, ids: &[i64]) -> AppResult<HashMap<i64, u64>> {
        Ok(count_by(self.work.categories.values().map(|c| c.parent_id), ids))
    }

    async fn insert(&mut self, new: NewCategory) -> AppResult<category::Model> {
        self.work.next_category_id += 1;
        let now = Utc::now();
        let model = category::Model {
            id: self.work.next_category_id,
            name: new.name,
            description: new.description,
            code: new.code,
            parent_id: new.parent_id,
            level: new.level,
            path: new.path,
            active: new.active,
            created_at: now,
            updated_at: now,
        };
        self.work.categories.insert(model.id, model.clone());
        Ok(model)
    }

    async fn save(&mut self, mut model: category::Model) -> AppResult<category::Model> {
        let created_at = match self.work.categories.get(&model.id) {
            Some(existing) => existing.created_at,
            None => return Err(sea_orm::DbErr::RecordNotUpdated.into()),
        };
        model.created_at = created_at;
        model.updated_at = Utc::now();
        self.work.categories.insert(model.id, model.clone());
        Ok(model)
    }

    async fn set_hierarchy(&mut self, id: i64, level: i32, path: &str) -> AppResult<()> {
        if let Some(model) = self.work.categories.get_mut(&id) {
            model.level = level;
            model.path = path.to_string();
            model.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_active(&mut self, ids: &[i64], active: bool) -> AppResult<u64> {
        let now = Utc::now();
        let mut changed = 0;
        for id in ids {
            if let Some(model) = self.work.categories.get_mut(id) {
                model.active = active;
                model.updated_at = now;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn delete(&mut self, id: i64) -> AppResult<()> {
        self.work.categories.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl ProductCatalog for MemoryTx {
    async fn count_products(&mut self, category_id: i64) -> AppResult<u64> {
        Ok(self
            .work
            .products
            .values()
            .filter(|c| **c == Some(category_id))
            .count() as u64)
    }

    async fn product_counts(&mut self, category_ids: &[i64]) -> AppResult<HashMap<i64, u64>> {
        Ok(count_by(self.work.products.values().copied(), category_ids))
    }

    async fn categories_with_products(&mut self) -> AppResult<u64> {
        let distinct: HashSet<i64> = self.work.products.values().flatten().copied().collect();
        Ok(distinct.len() as u64)
    }

    async fn clear_category(&mut self, category_id: i64) -> AppResult<u64> {
        let mut cleared = 0;
        for slot in self.work.products.values_mut() {
            if *slot == Some(category_id) {
                *slot = None;
                cleared += 1;
            }
        }
        Ok(cleared)
    }
}

#[async_trait]
impl CategoryTx for MemoryTx {
    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryTx { writer, state, work } = *self;
        let Some(_writer) = writer else {
            return Err(AppError::Internal(
                "read-only transaction cannot commit".to_string(),
            ));
        };
        work.check_unique()?;
        *state.write().await = work;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn new_root(name: &str) -> NewCategory {
        NewCategory {
            name: name.to_string(),
            description: None,
            code: None,
            parent_id: None,
            level: 1,
            path: name.to_string(),
            active: true,
        }
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_discarded() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert(new_root("Eletrônicos")).await.unwrap();
        }
        let mut tx = store.begin().await.unwrap();
        assert!(tx.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let created = tx.insert(new_root("Eletrônicos")).await.unwrap();
        assert_ok!(tx.commit().await);

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.find(created.id).await.unwrap().unwrap().name, "Eletrônicos");
    }

    #[tokio::test]
    async fn test_sibling_uniqueness_checked_on_commit() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert(new_root("Bebidas")).await.unwrap();
        tx.insert(new_root("Bebidas")).await.unwrap();
        let err = assert_err!(tx.commit().await);
        assert!(matches!(
            err,
            AppError::Conflict(Conflict::UniqueViolation(_))
        ));

        let mut tx = store.begin().await.unwrap();
        assert!(tx.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_page_search_and_tiebreak() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let a = tx.insert(new_root("Limpeza")).await.unwrap();
        let mut b = new_root("Alimentos");
        b.code = Some("LIMP-02".into());
        let b = tx.insert(b).await.unwrap();
        tx.insert(new_root("Papelaria")).await.unwrap();

        let filter = PageFilter {
            search: Some("  limp ".into()),
            sort_by: SortField::Level,
            limit: 10,
            ..Default::default()
        };
        let (items, total) = tx.page(&filter).await.unwrap();
        assert_eq!(total, 2);
        let ids: Vec<i64> = items.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn test_page_search_is_literal() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let underscored = tx.insert(new_root("Linha_A")).await.unwrap();
        tx.insert(new_root("LinhaXA")).await.unwrap();
        let percent = tx.insert(new_root("Desconto 10%")).await.unwrap();
        tx.insert(new_root("Desconto 100")).await.unwrap();

        let search = |text: &str| PageFilter {
            search: Some(text.to_string()),
            limit: 10,
            ..Default::default()
        };
        let (items, total) = tx.page(&search("_")).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].id, underscored.id);

        let (items, total) = tx.page(&search("0%")).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].id, percent.id);

        let (_, total) = tx.page(&search("%")).await.unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn test_reads_do_not_wait_for_writers() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert(new_root("Bebidas")).await.unwrap();
        tx.commit().await.unwrap();

        let mut writer = store.begin().await.unwrap();
        writer.insert(new_root("Limpeza")).await.unwrap();

        let read = tokio::time::timeout(std::time::Duration::from_secs(1), store.begin_read()).await;
        let mut reader = assert_ok!(read).unwrap();
        assert_eq!(reader.all().await.unwrap().len(), 1);

        writer.commit().await.unwrap();
        assert_eq!(reader.all().await.unwrap().len(), 1);
        let mut fresh = store.begin_read().await.unwrap();
        assert_eq!(fresh.all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_read_snapshot_cannot_commit() {
        let store = MemoryStore::new();
        let mut reader = store.begin_read().await.unwrap();
        reader.insert(new_root("Bebidas")).await.unwrap();
        let err = assert_err!(reader.commit().await);
        assert!(matches!(err, AppError::Internal(_)));

        let mut tx = store.begin().await.unwrap();
        assert!(tx.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_product_links() {
        let store = MemoryStore::new();
        let p1 = store.add_product(Some(5)).await;
        store.add_product(Some(5)).await;
        store.add_product(Some(6)).await;
        store.add_product(None).await;

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.count_products(5).await.unwrap(), 2);
        assert_eq!(tx.categories_with_products().await.unwrap(), 2);
        assert_eq!(tx.clear_category(5).await.unwrap(), 2);
        tx.commit().await.unwrap();

        assert_eq!(store.product_category(p1).await, Some(None));
    }
}
