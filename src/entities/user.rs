//! User entity - A member of the school community holding a Kitcoin balance.
//!
//! Roles are stored as a bitfield (see [`crate::access::roles::RoleSet`]).
//! OAuth tokens live here too but are never part of an API view.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// User database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Unique identifier for the user
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name
    pub name: String,
    /// Contact address, if the identity provider supplied one
    pub email: Option<String>,
    /// External directory id used to resolve signed-in identities
    #[sea_orm(unique)]
    pub google_id: Option<String>,
    /// Role bitfield
    pub roles: i32,
    /// Current balance, rounded to 2 places on every write
    pub balance: f64,
    /// End of the current weekly allowance window (staff only)
    pub balance_expires: Option<DateTimeUtc>,
    /// Scales the weekly allowance for this user
    pub weekly_multiplier: f64,
    /// OAuth access token
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    /// OAuth refresh token
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    /// When the user first signed in
    pub created_at: DateTimeUtc,
}

/// `User` has no foreign-key relationships
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
