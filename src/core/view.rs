//! Client-facing shapes of users and transactions.
//!
//! Views never carry OAuth tokens, and roles are spelled out as names.

use crate::{
    access::roles::RoleSet,
    core::transaction::{Party, TransactionPage},
    entities::{transaction, user},
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A user as shown to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    /// User id
    pub id: i64,
    /// Display name
    pub name: String,
    /// Contact email, if known
    pub email: Option<String>,
    /// Role names
    pub roles: Vec<&'static str>,
    /// Stored balance, allowance included up to the last materialization
    pub balance: f64,
    /// Scale applied to the weekly allowance
    pub weekly_multiplier: f64,
}

impl From<&user::Model> for UserView {
    fn from(user: &user::Model) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            roles: RoleSet::from_bits(user.roles).names(),
            balance: user.balance,
            weekly_multiplier: user.weekly_multiplier,
        }
    }
}

/// One side of a transaction. `me` is true when the side is the viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartyView {
    /// The user, when the side is a user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// The label, when the side is not a user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Whether the side is the viewer
    pub me: bool,
}

impl PartyView {
    fn new(party: Party, viewer_id: Option<i64>) -> Self {
        let me = party.user_id().is_some() && party.user_id() == viewer_id;
        let (id, text) = party.into_columns();
        Self { id, text, me }
    }
}

/// Store purchase details of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreContextView {
    /// Store the item was bought from
    pub store_id: i64,
    /// Item bought
    pub item_id: i64,
    /// Manager who approved the purchase
    pub manager_id: i64,
}

/// A transaction as seen by a particular user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionView {
    /// Transaction id
    pub id: i64,
    /// Kitcoins moved, always positive
    pub amount: f64,
    /// Free-text reason
    pub reason: Option<String>,
    /// Paying side
    pub from: PartyView,
    /// Receiving side
    pub to: PartyView,
    /// Purchase details, for store charges
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreContextView>,
    /// When the transaction was created
    pub date: DateTime<Utc>,
}

impl TransactionView {
    /// Builds the view, flagging the sides that are `viewer_id`.
    #[must_use]
    pub fn for_viewer(transaction: &transaction::Model, viewer_id: Option<i64>) -> Self {
        let store = match (transaction.store_id, transaction.item_id, transaction.manager_id) {
            (Some(store_id), Some(item_id), Some(manager_id)) => Some(StoreContextView {
                store_id,
                item_id,
                manager_id,
            }),
            _ => None,
        };

        Self {
            id: transaction.id,
            amount: transaction.amount,
            reason: transaction.reason.clone(),
            from: PartyView::new(
                Party::from_columns(transaction.from_id, transaction.from_text.as_deref()),
                viewer_id,
            ),
            to: PartyView::new(
                Party::from_columns(transaction.to_id, transaction.to_text.as_deref()),
                viewer_id,
            ),
            store,
            date: transaction.date,
        }
    }
}

/// A page of history as seen by a particular user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPageView {
    /// Transactions on this page, newest first
    pub transactions: Vec<TransactionView>,
    /// Matching transactions across all pages
    pub doc_count: u64,
    /// Number of pages
    pub page_count: u64,
    /// This page, counting from 1
    pub page: u64,
}

impl TransactionPageView {
    /// Builds the view of every transaction on the page.
    #[must_use]
    pub fn for_viewer(page: &TransactionPage, viewer_id: Option<i64>) -> Self {
        Self {
            transactions: page
                .transactions
                .iter()
                .map(|t| TransactionView::for_viewer(t, viewer_id))
                .collect(),
            doc_count: page.doc_count,
            page_count: page.page_count,
            page: page.page,
        }
    }
}
