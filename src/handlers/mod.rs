//! Request handlers module

pub mod category;
