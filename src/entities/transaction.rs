//! Transaction entity - One immutable movement of Kitcoin.
//!
//! Each side of a transaction is either a user (`*_id`) or a free-text label
//! (`*_text`), e.g. "Store Purchase". Only user sides carry a balance effect.
//! The optional store columns record which store purchase produced the row.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Transaction database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    /// Unique identifier for the transaction
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Amount moved, always positive
    pub amount: f64,
    /// Optional free-text reason
    pub reason: Option<String>,
    /// Sending user, if the sender is a user
    pub from_id: Option<i64>,
    /// Sending label, if the sender is not a user
    pub from_text: Option<String>,
    /// Receiving user, if the recipient is a user
    pub to_id: Option<i64>,
    /// Receiving label, if the recipient is not a user
    pub to_text: Option<String>,
    /// Store the purchase was made in
    pub store_id: Option<i64>,
    /// Item that was purchased
    pub item_id: Option<i64>,
    /// Manager who approved the purchase
    pub manager_id: Option<i64>,
    /// When the transaction was created
    pub date: DateTimeUtc,
}

/// Sides are plain columns rather than foreign keys: a suspended user's
/// history keeps its numeric ids.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
