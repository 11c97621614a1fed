//! Entity module - SeaORM entity definitions
//!
//! One model per table owned or read by the service

pub mod category;
pub mod product;
