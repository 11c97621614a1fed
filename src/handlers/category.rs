//! Category handlers
//!
//! Thin adapters from HTTP to [`CategoryService`](crate::service::CategoryService).
//! Failures surface as [`AppError`](crate::error::AppError) responses.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;

use crate::entity::category;
use crate::error::AppResult;
use crate::routes::ApiResponse;
use crate::service::types::{
    BulkOutcome, BulkRequest, CategoryDetail, CategoryList, CategoryStats, CreateCategory,
    DeleteOutcome, ListQuery, SelectOption, UpdateCategory,
};
use crate::state::AppState;
use crate::tree::CategoryTree;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailQuery {
    #[serde(default)]
    pub include_children: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeQuery {
    #[serde(default)]
    pub include_product_counts: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectQuery {
    pub search: Option<String>,
    pub exclude_id: Option<i64>,
}

/// Move request; an absent or null `newParentId` promotes the node to a root
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    #[serde(default)]
    pub new_parent_id: Option<i64>,
}

/// GET /api/categories
pub async fn list_categories(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<ApiResponse<CategoryList>>> {
    let list = state.categories.list(query).await?;
    Ok(Json(ApiResponse::success(list)))
}

/// GET /api/categories/:id
pub async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<DetailQuery>,
) -> AppResult<Json<ApiResponse<CategoryDetail>>> {
    let detail = state.categories.get_by_id(id, query.include_children).await?;
    Ok(Json(ApiResponse::success(detail)))
}

/// POST /api/categories
pub async fn create_category(
    State(state): State<AppState>,
    Json(req): Json<CreateCategory>,
) -> AppResult<(StatusCode, Json<ApiResponse<category::Model>>)> {
    let created = state.categories.create(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message("Category created", created)),
    ))
}

/// PUT /api/categories/:id
pub async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateCategory>,
) -> AppResult<Json<ApiResponse<category::Model>>> {
    let updated = state.categories.update(id, req).await?;
    Ok(Json(ApiResponse::with_message("Category updated", updated)))
}

/// PATCH /api/categories/:id/move
pub async fn move_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<MoveRequest>,
) -> AppResult<Json<ApiResponse<category::Model>>> {
    let moved = state.categories.move_to(id, req.new_parent_id).await?;
    Ok(Json(ApiResponse::with_message("Category moved", moved)))
}

/// DELETE /api/categories/:id
pub async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<DeleteQuery>,
) -> AppResult<Json<ApiResponse<DeleteOutcome>>> {
    let outcome = state.categories.delete(id, query.force).await?;
    let message = outcome.message.clone();
    Ok(Json(ApiResponse::with_message(message, outcome)))
}

/// GET /api/categories/tree
pub async fn get_tree(
    State(state): State<AppState>,
    Query(query): Query<TreeQuery>,
) -> AppResult<Json<ApiResponse<Vec<CategoryTree>>>> {
    let forest = state.categories.get_tree(query.include_product_counts).await?;
    Ok(Json(ApiResponse::success(forest)))
}

/// GET /api/categories/select
pub async fn get_for_select(
    State(state): State<AppState>,
    Query(query): Query<SelectQuery>,
) -> AppResult<Json<ApiResponse<Vec<SelectOption>>>> {
    let options = state
        .categories
        .get_for_select(query.search.as_deref(), query.exclude_id)
        .await?;
    Ok(Json(ApiResponse::success(options)))
}

/// GET /api/categories/stats
pub async fn get_stats(State(state): State<AppState>) -> AppResult<Json<ApiResponse<CategoryStats>>> {
    let stats = state.categories.stats().await?;
    Ok(Json(ApiResponse::success(stats)))
}

/// POST /api/categories/bulk
pub async fn bulk_operation(
    State(state): State<AppState>,
    Json(req): Json<BulkRequest>,
) -> AppResult<Json<ApiResponse<BulkOutcome>>> {
    let outcome = state.categories.bulk(req).await?;
    let message = format!("{} categories affected", outcome.affected);
    Ok(Json(ApiResponse::with_message(message, outcome)))
}
