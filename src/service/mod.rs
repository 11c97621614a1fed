//! Category business rules on top of the store port

pub mod category;
pub mod types;

pub use category::CategoryService;
