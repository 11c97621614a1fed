//! ERP product categories
//!
//! This crate provides the hierarchical category tree used by the product
//! catalog: materialized paths, cycle-safe moves, guarded deletes and bulk
//! operations, served over a JSON HTTP API.

pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod service;
pub mod state;
pub mod store;
pub mod tree;

// Re-export commonly used types
pub use config::Config;
pub use service::CategoryService;
pub use state::AppState;
