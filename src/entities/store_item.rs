//! Store item entity - Something a store sells at a fixed price.
//!
//! `quantity` is the remaining stock; `None` means unlimited.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Store item database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "store_items")]
pub struct Model {
    /// Unique identifier for the item
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Store this item belongs to
    pub store_id: i64,
    /// Item name
    pub name: String,
    /// Optional description
    pub description: Option<String>,
    /// Price per unit
    pub price: f64,
    /// Remaining stock, `None` for unlimited
    pub quantity: Option<i32>,
}

/// Defines relationships between `StoreItem` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each item belongs to one store
    #[sea_orm(
        belongs_to = "super::store::Entity",
        from = "Column::StoreId",
        to = "super::store::Column::Id"
    )]
    Store,
}

impl Related<super::store::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Store.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
