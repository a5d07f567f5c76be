//! Store entity - A staff-run store students can buy items from.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Store database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stores")]
pub struct Model {
    /// Unique identifier for the store
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Store name, also used as the recipient label of purchases
    pub name: String,
    /// Optional description shown to students
    pub description: Option<String>,
    /// Staff member who manages the store
    pub manager_id: i64,
    /// When the store was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Store and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One store has many items
    #[sea_orm(has_many = "super::store_item::Entity")]
    Items,
}

impl Related<super::store_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
