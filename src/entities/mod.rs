//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod store;
pub mod store_item;
pub mod store_request;
pub mod transaction;
pub mod user;

// Re-export specific types to avoid conflicts
pub use store::{Column as StoreColumn, Entity as Store, Model as StoreModel};
pub use store_item::{Column as StoreItemColumn, Entity as StoreItem, Model as StoreItemModel};
pub use store_request::{
    Column as StoreRequestColumn, Entity as StoreRequest, Model as StoreRequestModel,
};
pub use transaction::{
    Column as TransactionColumn, Entity as Transaction, Model as TransactionModel,
};
pub use user::{Column as UserColumn, Entity as User, Model as UserModel};
