//! Category entity - product category tree
//!
//! Table: cad_category
//!
//! `level` and `path` are materialized from the parent chain and are
//! rewritten by the service whenever the chain or a name on it changes.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Separator between ancestor names in the materialized path
pub const PATH_SEPARATOR: &str = " > ";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[sea_orm(table_name = "cad_category")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Display label, unique among siblings
    #[sea_orm(column_type = "String(Some(100))")]
    pub name: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    /// External code
    #[sea_orm(column_type = "String(Some(50))", nullable)]
    pub code: Option<String>,

    /// Parent category (NULL for roots)
    #[sea_orm(nullable, indexed)]
    pub parent_id: Option<i64>,

    /// Depth, 1 for roots
    pub level: i32,

    /// Ancestor names joined by " > "
    #[sea_orm(column_type = "Text")]
    pub path: String,

    pub active: bool,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::ParentId",
        to = "Column::Id",
        on_delete = "Restrict"
    )]
    Parent,
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}
