use std::sync::Arc;

use crate::config::PaginationConfig;
use crate::service::CategoryService;
use crate::store::CategoryStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Category operations, bound to the configured store
    pub categories: Arc<CategoryService>,
}

impl AppState {
    /// Create new application state
    pub fn new(store: Arc<dyn CategoryStore>, pagination: PaginationConfig) -> Self {
        Self {
            categories: Arc::new(CategoryService::new(store, pagination)),
        }
    }
}
