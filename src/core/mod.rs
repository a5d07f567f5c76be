/// Weekly staff allowance and currency rounding
pub mod allowance;
/// Balance-moving operations behind per-user locks
pub mod ledger;
/// Ordered per-user async locks
pub mod locks;
/// Stores, items and purchase requests
pub mod store;
/// Transaction inputs and history queries
pub mod transaction;
/// Sign-in and user administration
pub mod user;
/// Client-facing views
pub mod view;
