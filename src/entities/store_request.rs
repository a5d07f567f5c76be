//! Store request entity - A pending purchase awaiting the store manager.
//!
//! Status moves from `"pending"` to either `"approved"` (and `transaction_id`
//! is set) or `"denied"`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Request status before a manager acts on it
pub const STATUS_PENDING: &str = "pending";
/// Request status once the purchase went through
pub const STATUS_APPROVED: &str = "approved";
/// Request status once the manager refused it
pub const STATUS_DENIED: &str = "denied";

/// Store request database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "store_requests")]
pub struct Model {
    /// Unique identifier for the request
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Store the item is sold in
    pub store_id: i64,
    /// Requested item
    pub item_id: i64,
    /// Student asking to buy
    pub student_id: i64,
    /// Number of units requested
    pub quantity: i32,
    /// `"pending"`, `"approved"` or `"denied"`
    pub status: String,
    /// Transaction created on approval
    pub transaction_id: Option<i64>,
    /// When the request was made
    pub created_at: DateTimeUtc,
}

/// `StoreRequest` keeps plain id columns, see [`super::transaction::Relation`]
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
