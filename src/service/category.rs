//! Category tree service
//!
//! Every public call runs on one store transaction. Mutations commit once at
//! the end, so any error returned midway leaves the stored tree untouched.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use super::types::{
    BulkData, BulkOperation, BulkOutcome, BulkRequest, CategoryDetail, CategoryList, CategoryRow,
    CategoryStats, CreateCategory, DeleteOutcome, ListItems, ListQuery, Pagination, SelectOption,
    UpdateCategory,
};
use crate::config::PaginationConfig;
use crate::entity::category;
use crate::error::{AppError, AppResult, Conflict, InvalidOperation, OptionExt};
use crate::store::{CategoryStore, CategoryTx, NewCategory, PageFilter};
use crate::tree::{self, CategoryTree, ParentIndex};

const ENTITY: &str = "Category";

pub struct CategoryService {
    store: Arc<dyn CategoryStore>,
    pagination: PaginationConfig,
}

fn normalize_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("name", "name must not be empty"));
    }
    Ok(name.to_string())
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn circular(id: i64, parent_id: i64) -> AppError {
    InvalidOperation::CircularReference { id, parent_id }.into()
}

impl CategoryService {
    pub fn new(store: Arc<dyn CategoryStore>, pagination: PaginationConfig) -> Self {
        Self { store, pagination }
    }

    /// One page of categories, flat or reassembled into a tree
    pub async fn list(&self, query: ListQuery) -> AppResult<CategoryList> {
        let page = query.page.unwrap_or(1).max(1);
        let page_size = self.pagination.clamp(query.page_size);
        let filter = PageFilter {
            search: query.search,
            active: query.active,
            parent_id: query.parent_id,
            sort_by: query.sort_by.unwrap_or_default(),
            order: query.sort_order.unwrap_or_default(),
            // pages far past the end yield an empty page
            offset: (page - 1).saturating_mul(page_size).min(i64::MAX as u64),
            limit: page_size,
        };

        let mut tx = self.store.begin_read().await?;
        let (rows, total) = tx.page(&filter).await?;
        let pagination = Pagination::new(page, page_size, total);

        if query.hierarchical && query.parent_id.is_none() {
            return Ok(CategoryList {
                items: ListItems::Tree(tree::assemble(rows)),
                pagination,
            });
        }

        let ids: Vec<i64> = rows.iter().map(|c| c.id).collect();
        let child_counts = tx.child_counts(&ids).await?;
        let product_counts = tx.product_counts(&ids).await?;
        let items = rows
            .into_iter()
            .map(|c| CategoryRow {
                child_count: child_counts.get(&c.id).copied().unwrap_or(0),
                product_count: product_counts.get(&c.id).copied().unwrap_or(0),
                category: c,
            })
            .collect();

        Ok(CategoryList {
            items: ListItems::Flat(items),
            pagination,
        })
    }

    pub async fn get_by_id(&self, id: i64, include_children: bool) -> AppResult<CategoryDetail> {
        let mut tx = self.store.begin_read().await?;
        let category = tx.find(id).await?.ok_or_not_found(ENTITY, id)?;
        let children = if include_children {
            Some(tx.children(id).await?)
        } else {
            None
        };
        Ok(CategoryDetail { category, children })
    }

    pub async fn create(&self, data: CreateCategory) -> AppResult<category::Model> {
        let name = normalize_name(&data.name)?;

        let mut tx = self.store.begin().await?;
        let parent = match data.parent_id {
            Some(parent_id) => Some(tx.find(parent_id).await?.ok_or_not_found(ENTITY, parent_id)?),
            None => None,
        };
        ensure_unique_name(&mut *tx, data.parent_id, &name, None).await?;

        let (level, path) = tree::hierarchy_for(parent.as_ref(), &name);
        let created = tx
            .insert(NewCategory {
                name,
                description: normalize_optional(data.description),
                code: normalize_optional(data.code),
                parent_id: data.parent_id,
                level,
                path,
                active: data.active.unwrap_or(true),
            })
            .await?;
        tx.commit().await?;

        info!("Category created: id={} path='{}'", created.id, created.path);
        Ok(created)
    }

    pub async fn update(&self, id: i64, patch: UpdateCategory) -> AppResult<category::Model> {
        let mut tx = self.store.begin().await?;
        let updated = update_in(&mut *tx, id, patch).await?;
        tx.commit().await?;

        info!("Category updated: id={} path='{}'", updated.id, updated.path);
        Ok(updated)
    }

    /// Re-parent a node; `None` promotes it to a root
    pub async fn move_to(&self, id: i64, new_parent_id: Option<i64>) -> AppResult<category::Model> {
        let mut tx = self.store.begin().await?;
        let moved = move_in(&mut *tx, id, new_parent_id).await?;
        tx.commit().await?;

        info!("Category moved: id={} parent={:?} path='{}'", id, moved.parent_id, moved.path);
        Ok(moved)
    }

    pub async fn delete(&self, id: i64, force: bool) -> AppResult<DeleteOutcome> {
        let mut tx = self.store.begin().await?;
        let outcome = delete_in(&mut *tx, id, force).await?;
        tx.commit().await?;

        info!(
            "Category deleted: id={} force={} reparented={} detached_products={}",
            id, force, outcome.reparented_children, outcome.detached_products
        );
        Ok(outcome)
    }

    /// Every active node as a forest, siblings ordered by name
    pub async fn get_tree(&self, include_product_counts: bool) -> AppResult<Vec<CategoryTree>> {
        let mut tx = self.store.begin_read().await?;
        let mut nodes: Vec<_> = tx.all().await?.into_iter().filter(|c| c.active).collect();
        nodes.sort_by(tree::by_name);

        let counts = if include_product_counts {
            let ids: Vec<i64> = nodes.iter().map(|c| c.id).collect();
            Some(tx.product_counts(&ids).await?)
        } else {
            None
        };

        let mut forest = tree::assemble(nodes);
        if let Some(counts) = counts {
            tree::for_each_mut(&mut forest, &mut |node| {
                node.product_count = Some(counts.get(&node.category.id).copied().unwrap_or(0));
            });
        }
        Ok(forest)
    }

    /// Active nodes as dropdown options. With `exclude_id`, that node and all
    /// of its descendants are left out so it cannot be picked as its own
    /// ancestor.
    pub async fn get_for_select(
        &self,
        search: Option<&str>,
        exclude_id: Option<i64>,
    ) -> AppResult<Vec<SelectOption>> {
        let mut tx = self.store.begin_read().await?;
        let all = tx.all().await?;

        let excluded: HashSet<i64> = match exclude_id {
            Some(id) => {
                let mut set = ParentIndex::new(&all).descendants(id);
                set.insert(id);
                set
            }
            None => HashSet::new(),
        };
        let needle = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut options: Vec<SelectOption> = all
            .into_iter()
            .filter(|c| c.active && !excluded.contains(&c.id))
            .filter(|c| {
                needle.as_deref().map_or(true, |n| {
                    c.name.to_lowercase().contains(n) || c.path.to_lowercase().contains(n)
                })
            })
            .map(|c| SelectOption {
                value: c.id,
                label: c.path,
            })
            .collect();
        options.sort_by(|a, b| a.label.cmp(&b.label).then(a.value.cmp(&b.value)));
        Ok(options)
    }

    pub async fn stats(&self) -> AppResult<CategoryStats> {
        let mut tx = self.store.begin_read().await?;
        let all = tx.all().await?;
        let with_products = tx.categories_with_products().await?;

        let mut stats = CategoryStats {
            total: all.len() as u64,
            active: 0,
            inactive: 0,
            roots: 0,
            with_products,
            by_level: Default::default(),
        };
        for c in &all {
            if c.active {
                stats.active += 1;
            } else {
                stats.inactive += 1;
            }
            if c.is_root() {
                stats.roots += 1;
            }
            *stats.by_level.entry(c.level).or_insert(0) += 1;
        }
        Ok(stats)
    }

    pub async fn bulk(&self, request: BulkRequest) -> AppResult<BulkOutcome> {
        let operation = BulkOperation::parse(&request.operation).ok_or_else(|| {
            AppError::from(InvalidOperation::UnsupportedBulkOperation(request.operation.clone()))
        })?;

        let mut seen = HashSet::new();
        let ids: Vec<i64> = request.ids.into_iter().filter(|id| seen.insert(*id)).collect();
        if ids.is_empty() {
            return Err(AppError::validation("ids", "at least one id is required"));
        }
        let data = request.data.unwrap_or_default();

        let mut tx = self.store.begin().await?;
        let affected = match operation {
            BulkOperation::Activate => tx.set_active(&ids, true).await?,
            BulkOperation::Deactivate => tx.set_active(&ids, false).await?,
            BulkOperation::Delete => bulk_delete(&mut *tx, &ids, &data).await?,
            BulkOperation::Move => bulk_move(&mut *tx, &ids, &data).await?,
        };
        tx.commit().await?;

        info!("Bulk {:?} applied to {} categories", operation, affected);
        Ok(BulkOutcome {
            operation,
            affected,
        })
    }
}

async fn ensure_unique_name(
    tx: &mut dyn CategoryTx,
    parent_id: Option<i64>,
    name: &str,
    exclude_id: Option<i64>,
) -> AppResult<()> {
    if tx.find_sibling(parent_id, name, exclude_id).await?.is_some() {
        warn!("Duplicate category name '{}' under {:?}", name, parent_id);
        return Err(Conflict::DuplicateName {
            parent_id,
            name: name.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Transitive children of `id`, excluding `id`
async fn descendant_ids(tx: &mut dyn CategoryTx, id: i64) -> AppResult<HashSet<i64>> {
    let mut seen = HashSet::new();
    let mut stack = vec![id];
    while let Some(current) = stack.pop() {
        for child in tx.children(current).await? {
            if child.id != id && seen.insert(child.id) {
                stack.push(child.id);
            }
        }
    }
    Ok(seen)
}

/// Reject `parent_id` as the new parent of `id` if it is `id` itself or one
/// of its descendants. Returns the parent row.
async fn check_new_parent(
    tx: &mut dyn CategoryTx,
    id: i64,
    parent_id: i64,
) -> AppResult<category::Model> {
    if parent_id == id {
        warn!("Category {} cannot be its own parent", id);
        return Err(circular(id, parent_id));
    }
    let parent = tx.find(parent_id).await?.ok_or_not_found(ENTITY, parent_id)?;
    if descendant_ids(tx, id).await?.contains(&parent_id) {
        warn!("Category {} is a descendant of {}", parent_id, id);
        return Err(circular(id, parent_id));
    }
    Ok(parent)
}

/// Walk up from `parent` and fail if the chain reaches `id` or loops.
/// Runs right before the parent change is written. The moved row and every
/// row on the chain are locked, so a concurrent move over the same rows
/// waits for this transaction or fails.
async fn ensure_chain_acyclic(tx: &mut dyn CategoryTx, id: i64, parent_id: i64) -> AppResult<()> {
    tx.find_for_update(id).await?.ok_or_not_found(ENTITY, id)?;
    let mut seen = HashSet::new();
    let mut next = Some(parent_id);
    while let Some(ancestor_id) = next {
        if ancestor_id == id || !seen.insert(ancestor_id) {
            return Err(circular(id, parent_id));
        }
        next = match tx.find_for_update(ancestor_id).await? {
            Some(ancestor) => ancestor.parent_id,
            None => None,
        };
    }
    Ok(())
}

/// Recompute `level`/`path` for `root` from its current parent, then for
/// every descendant, parents before children. Returns the nodes written.
async fn recompute_hierarchy(tx: &mut dyn CategoryTx, root: i64) -> AppResult<u64> {
    let Some(node) = tx.find(root).await? else {
        return Ok(0);
    };
    let parent = match node.parent_id {
        Some(parent_id) => tx.find(parent_id).await?,
        None => None,
    };
    let (level, path) = tree::hierarchy_for(parent.as_ref(), &node.name);
    tx.set_hierarchy(root, level, &path).await?;

    let mut written = 1;
    let mut seen = HashSet::from([root]);
    let mut stack = vec![(root, level, path)];
    while let Some((id, level, path)) = stack.pop() {
        for child in tx.children(id).await? {
            if !seen.insert(child.id) {
                continue;
            }
            let (child_level, child_path) = tree::child_hierarchy(level, &path, &child.name);
            tx.set_hierarchy(child.id, child_level, &child_path).await?;
            written += 1;
            stack.push((child.id, child_level, child_path));
        }
    }
    Ok(written)
}

async fn update_in(
    tx: &mut dyn CategoryTx,
    id: i64,
    patch: UpdateCategory,
) -> AppResult<category::Model> {
    let current = tx.find(id).await?.ok_or_not_found(ENTITY, id)?;

    let name = match &patch.name {
        Some(name) => normalize_name(name)?,
        None => current.name.clone(),
    };
    let parent_id = patch.parent_id.unwrap_or(current.parent_id);
    let name_changed = name != current.name;
    let parent_changed = parent_id != current.parent_id;

    let new_parent = match patch.parent_id {
        Some(Some(candidate)) => Some(check_new_parent(tx, id, candidate).await?),
        _ => None,
    };
    if patch.name.is_some() || parent_changed {
        ensure_unique_name(tx, parent_id, &name, Some(id)).await?;
    }

    let mut model = current;
    model.name = name;
    model.parent_id = parent_id;
    if let Some(description) = patch.description {
        model.description = normalize_optional(description);
    }
    if let Some(code) = patch.code {
        model.code = normalize_optional(code);
    }
    if let Some(active) = patch.active {
        model.active = active;
    }

    if let Some(parent) = &new_parent {
        ensure_chain_acyclic(tx, id, parent.id).await?;
    }
    let saved = tx.save(model).await?;

    if !(name_changed || parent_changed) {
        return Ok(saved);
    }
    let written = recompute_hierarchy(tx, id).await?;
    tracing::debug!("Recomputed hierarchy of {} categories under {}", written, id);
    tx.find(id).await?.ok_or_not_found(ENTITY, id)
}

async fn move_in(
    tx: &mut dyn CategoryTx,
    id: i64,
    new_parent_id: Option<i64>,
) -> AppResult<category::Model> {
    update_in(
        tx,
        id,
        UpdateCategory {
            parent_id: Some(new_parent_id),
            ..Default::default()
        },
    )
    .await
}

/// Business-rule checks for deleting `node`; nothing is written
async fn check_deletable(
    tx: &mut dyn CategoryTx,
    node: &category::Model,
    force: bool,
) -> AppResult<Vec<category::Model>> {
    let children = tx.children(node.id).await?;
    if !force {
        if !children.is_empty() {
            warn!("Category {} has {} subcategories", node.id, children.len());
            return Err(Conflict::HasChildren {
                id: node.id,
                count: children.len() as u64,
            }
            .into());
        }
        let products = tx.count_products(node.id).await?;
        if products > 0 {
            warn!("Category {} has {} dependent products", node.id, products);
            return Err(Conflict::HasProducts {
                id: node.id,
                count: products,
            }
            .into());
        }
    }

    // Children move to the deleted node's parent; their names must stay
    // unique there. The deleted node itself does not count as a sibling.
    for child in &children {
        ensure_unique_name(tx, node.parent_id, &child.name, Some(node.id)).await?;
    }
    Ok(children)
}

async fn delete_in(tx: &mut dyn CategoryTx, id: i64, force: bool) -> AppResult<DeleteOutcome> {
    let node = tx.find(id).await?.ok_or_not_found(ENTITY, id)?;
    let children = check_deletable(tx, &node, force).await?;

    let mut reparented = 0;
    for mut child in children {
        child.parent_id = node.parent_id;
        let child = tx.save(child).await?;
        recompute_hierarchy(tx, child.id).await?;
        reparented += 1;
    }
    let detached_products = tx.clear_category(id).await?;
    tx.delete(id).await?;

    Ok(DeleteOutcome {
        message: format!("Category '{}' deleted", node.name),
        reparented_children: reparented,
        detached_products,
    })
}

/// Validate every target first, then delete them one by one
async fn bulk_delete(tx: &mut dyn CategoryTx, ids: &[i64], data: &BulkData) -> AppResult<u64> {
    let force = data.force.unwrap_or(false);
    for &id in ids {
        let node = tx.find(id).await?.ok_or_not_found(ENTITY, id)?;
        check_deletable(tx, &node, force).await?;
    }

    let mut affected = 0;
    for &id in ids {
        delete_in(tx, id, force).await?;
        affected += 1;
    }
    Ok(affected)
}

/// Moves run one at a time against the live state, so each cycle check
/// sees the effect of the moves before it.
async fn bulk_move(tx: &mut dyn CategoryTx, ids: &[i64], data: &BulkData) -> AppResult<u64> {
    let new_parent_id = data
        .new_parent_id
        .ok_or_else(|| AppError::validation("data.newParentId", "required for move"))?;

    let mut affected = 0;
    for &id in ids {
        move_in(tx, id, new_parent_id).await?;
        affected += 1;
    }
    Ok(affected)
}
