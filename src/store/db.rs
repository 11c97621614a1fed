//! PostgreSQL store backed by SeaORM
//!
//! Each [`CategoryTx`] wraps one `DatabaseTransaction`; SeaORM rolls the
//! transaction back when it is dropped uncommitted.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::{Expr, Func, LikeExpr, SimpleExpr},
    ActiveModelTrait, ActiveValue::Unchanged, ColumnTrait, Condition, DatabaseConnection,
    DatabaseTransaction, EntityTrait, Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    Set, TransactionTrait,
};
use std::collections::HashMap;

use super::{
    CategoryRepository, CategoryStore, CategoryTx, NewCategory, PageFilter, ProductCatalog,
    SortField, SortOrder,
};
use crate::entity::{category, product};
use crate::error::AppResult;

#[derive(Clone)]
pub struct DbStore {
    db: DatabaseConnection,
}

impl DbStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CategoryStore for DbStore {
    async fn begin(&self) -> AppResult<Box<dyn CategoryTx>> {
        let txn = self.db.begin().await?;
        Ok(Box::new(DbTx { txn }))
    }

    /// Plain reads take no row locks in PostgreSQL
    async fn begin_read(&self) -> AppResult<Box<dyn CategoryTx>> {
        self.begin().await
    }
}

struct DbTx {
    txn: DatabaseTransaction,
}

fn parent_condition(parent_id: Option<i64>) -> SimpleExpr {
    match parent_id {
        Some(id) => category::Column::ParentId.eq(id),
        None => category::Column::ParentId.is_null(),
    }
}

/// Escape LIKE metacharacters so `search` matches literally
fn escape_like(search: &str) -> String {
    let mut escaped = String::with_capacity(search.len());
    for c in search.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn contains_pattern(search: &str) -> String {
    format!("%{}%", escape_like(&search.to_lowercase()))
}

fn lower_like(column: category::Column, pattern: &str) -> SimpleExpr {
    Expr::expr(Func::lower(Expr::col(column))).like(LikeExpr::new(pattern).escape('\\'))
}

fn sort_column(field: SortField) -> category::Column {
    match field {
        SortField::Name => category::Column::Name,
        SortField::Code => category::Column::Code,
        SortField::Level => category::Column::Level,
        SortField::Path => category::Column::Path,
        SortField::CreatedAt => category::Column::CreatedAt,
        SortField::UpdatedAt => category::Column::UpdatedAt,
        SortField::Id => category::Column::Id,
    }
}

#[async_trait]
impl CategoryRepository for DbTx {
    async fn find(&mut self, id: i64) -> AppResult<Option<category::Model>> {
        Ok(category::Entity::find_by_id(id).one(&self.txn).await?)
    }

    async fn find_for_update(&mut self, id: i64) -> AppResult<Option<category::Model>> {
        Ok(category::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&self.txn)
            .await?)
    }

    async fn find_sibling(
        &mut self,
        parent_id: Option<i64>,
        name: &str,
        exclude_id: Option<i64>,
    ) -> AppResult<Option<category::Model>> {
        let mut query = category::Entity::find()
            .filter(parent_condition(parent_id))
            .filter(category::Column::Name.eq(name));
        if let Some(id) = exclude_id {
            query = query.filter(category::Column::Id.ne(id));
        }
        Ok(query.one(&self.txn).await?)
    }

    async fn children(&mut self, parent_id: i64) -> AppResult<Vec<category::Model>> {
        Ok(category::Entity::find()
            .filter(category::Column::ParentId.eq(parent_id))
            .order_by_asc(category::Column::Name)
            .order_by_asc(category::Column::Id)
            .all(&self.txn)
            .await?)
    }

    async fn all(&mut self) -> AppResult<Vec<category::Model>> {
        Ok(category::Entity::find()
            .order_by_asc(category::Column::Id)
            .all(&self.txn)
            .await?)
    }

    async fn page(&mut self, filter: &PageFilter) -> AppResult<(Vec<category::Model>, u64)> {
        let mut query = category::Entity::find();

        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = contains_pattern(search);
            query = query.filter(
                Condition::any()
                    .add(lower_like(category::Column::Name, &pattern))
                    .add(lower_like(category::Column::Description, &pattern))
                    .add(lower_like(category::Column::Code, &pattern)),
            );
        }
        if let Some(active) = filter.active {
            query = query.filter(category::Column::Active.eq(active));
        }
        if let Some(parent_id) = filter.parent_id {
            query = query.filter(category::Column::ParentId.eq(parent_id));
        }

        let total = query.clone().count(&self.txn).await?;

        let order = match filter.order {
            SortOrder::Asc => Order::Asc,
            SortOrder::Desc => Order::Desc,
        };
        let items = query
            .order_by(sort_column(filter.sort_by), order)
            .order_by_asc(category::Column::Id)
            .offset(filter.offset)
            .limit(filter.limit)
            .all(&self.txn)
            .await?;

        Ok((items, total))
    }

    async fn child_counts(&mut self, ids: &[i64]) -> AppResult<HashMap<i64, u64>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(Option<i64>, i64)> = category::Entity::find()
            .select_only()
            .column(category::Column::ParentId)
            .column_as(Expr::col(category::Column::Id).count(), "count")
            .filter(category::Column::ParentId.is_in(ids.iter().copied()))
            .group_by(category::Column::ParentId)
            .into_tuple()
            .all(&self.txn)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(parent_id, count)| parent_id.map(|id| (id, count as u64)))
            .collect())
    }

    async fn insert(&mut self, new: NewCategory) -> AppResult<category::Model> {
        let now = Utc::now();
        let model = category::ActiveModel {
            name: Set(new.name),
            description: Set(new.description),
            code: Set(new.code),
            parent_id: Set(new.parent_id),
            level: Set(new.level),
            path: Set(new.path),
            active: Set(new.active),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        Ok(model.insert(&self.txn).await?)
    }

    async fn save(&mut self, model: category::Model) -> AppResult<category::Model> {
        let active = category::ActiveModel {
            id: Unchanged(model.id),
            name: Set(model.name),
            description: Set(model.description),
            code: Set(model.code),
            parent_id: Set(model.parent_id),
            level: Set(model.level),
            path: Set(model.path),
            active: Set(model.active),
            created_at: Unchanged(model.created_at),
            updated_at: Set(Utc::now()),
        };
        Ok(active.update(&self.txn).await?)
    }

    async fn set_hierarchy(&mut self, id: i64, level: i32, path: &str) -> AppResult<()> {
        category::Entity::update_many()
            .col_expr(category::Column::Level, Expr::value(level))
            .col_expr(category::Column::Path, Expr::value(path))
            .col_expr(category::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(category::Column::Id.eq(id))
            .exec(&self.txn)
            .await?;
        Ok(())
    }

    async fn set_active(&mut self, ids: &[i64], active: bool) -> AppResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = category::Entity::update_many()
            .col_expr(category::Column::Active, Expr::value(active))
            .col_expr(category::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(category::Column::Id.is_in(ids.iter().copied()))
            .exec(&self.txn)
            .await?;
        Ok(result.rows_affected)
    }

    async fn delete(&mut self, id: i64) -> AppResult<()> {
        category::Entity::delete_by_id(id).exec(&self.txn).await?;
        Ok(())
    }
}

#[async_trait]
impl ProductCatalog for DbTx {
    async fn count_products(&mut self, category_id: i64) -> AppResult<u64> {
        Ok(product::Entity::find()
            .filter(product::Column::CategoryId.eq(category_id))
            .count(&self.txn)
            .await?)
    }

    async fn product_counts(&mut self, category_ids: &[i64]) -> AppResult<HashMap<i64, u64>> {
        if category_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(Option<i64>, i64)> = product::Entity::find()
            .select_only()
            .column(product::Column::CategoryId)
            .column_as(Expr::col(product::Column::Id).count(), "count")
            .filter(product::Column::CategoryId.is_in(category_ids.iter().copied()))
            .group_by(product::Column::CategoryId)
            .into_tuple()
            .all(&self.txn)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(category_id, count)| category_id.map(|id| (id, count as u64)))
            .collect())
    }

    async fn categories_with_products(&mut self) -> AppResult<u64> {
        let count: Option<i64> = product::Entity::find()
            .select_only()
            .column_as(Expr::cust("COUNT(DISTINCT category_id)"), "count")
            .into_tuple()
            .one(&self.txn)
            .await?;
        Ok(count.unwrap_or(0) as u64)
    }

    async fn clear_category(&mut self, category_id: i64) -> AppResult<u64> {
        let result = product::Entity::update_many()
            .col_expr(product::Column::CategoryId, Expr::value(Option::<i64>::None))
            .filter(product::Column::CategoryId.eq(category_id))
            .exec(&self.txn)
            .await?;
        Ok(result.rows_affected)
    }
}

#[async_trait]
impl CategoryTx for DbTx {
    async fn commit(self: Box<Self>) -> AppResult<()> {
        let DbTx { txn } = *self;
        txn.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DbBackend, QueryTrait};

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("notebooks"), "notebooks");
        assert_eq!(escape_like("a_b"), "a\\_b");
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("c:\\tmp"), "c:\\\\tmp");
        assert_eq!(contains_pattern("Linha_A"), "%linha\\_a%");
    }

    #[test]
    fn test_search_sql_escapes_wildcards() {
        let sql = category::Entity::find()
            .filter(lower_like(category::Column::Name, &contains_pattern("_")))
            .build(DbBackend::Postgres)
            .to_string();
        assert!(sql.contains("ESCAPE"), "{}", sql);
        assert!(sql.contains(r"\_"), "{}", sql);
    }
}
