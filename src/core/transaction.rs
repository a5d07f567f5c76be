//! Transaction business logic - lookup and history queries.
//!
//! Balance-moving operations live on [`crate::core::ledger::Ledger`]; this module
//! holds the input types they take and the read side: fetching a single
//! transaction and the paginated, searchable history of a user.

use crate::{
    entities::{Transaction, transaction},
    errors::{Error, Result},
};
use sea_orm::{
    Condition, DatabaseConnection, QueryOrder, QuerySelect, TransactionTrait, prelude::*,
    sea_query::LikeExpr,
};

/// Default number of transactions per history page.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// One side of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Party {
    /// A user whose balance is affected
    User(i64),
    /// A display-only label such as "Store Purchase"
    Label(String),
}

impl Party {
    /// The user id, if this side is a user.
    #[must_use]
    pub const fn user_id(&self) -> Option<i64> {
        match self {
            Self::User(id) => Some(*id),
            Self::Label(_) => None,
        }
    }

    /// Splits into the `(*_id, *_text)` column pair.
    #[must_use]
    pub fn into_columns(self) -> (Option<i64>, Option<String>) {
        match self {
            Self::User(id) => (Some(id), None),
            Self::Label(text) => (None, Some(text)),
        }
    }

    /// Rebuilds a side from its column pair. A row with neither column set reads
    /// as an empty label.
    #[must_use]
    pub fn from_columns(id: Option<i64>, text: Option<&str>) -> Self {
        id.map_or_else(|| Self::Label(text.unwrap_or_default().to_string()), Self::User)
    }
}

/// Store purchase a transaction was created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreContext {
    /// Store the purchase was made in
    pub store_id: i64,
    /// Item bought
    pub item_id: i64,
    /// Manager who approved it
    pub manager_id: i64,
}

/// Input for [`crate::core::ledger::Ledger::create_transaction`].
///
/// One row is created per entry of `to`, each for `amount`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    /// Amount per recipient
    pub amount: f64,
    /// Optional reason shown in the history
    pub reason: Option<String>,
    /// Sender
    pub from: Party,
    /// Recipients
    pub to: Vec<Party>,
    /// Store context for purchases
    pub store: Option<StoreContext>,
}

/// History query options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindOptions {
    /// Page size
    pub count: u64,
    /// 1-based page number
    pub page: u64,
    /// Case-insensitive substring filter on the reason
    pub search: Option<String>,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            count: DEFAULT_PAGE_SIZE,
            page: 1,
            search: None,
        }
    }
}

/// One page of a user's history.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionPage {
    /// Transactions on this page, newest first
    pub transactions: Vec<transaction::Model>,
    /// Number of transactions matching the filter, across all pages
    pub doc_count: u64,
    /// `ceil(doc_count / count)`
    pub page_count: u64,
    /// Page number returned
    pub page: u64,
}

/// Retrieves a specific transaction by its unique ID.
///
/// Returns None if the transaction doesn't exist.
pub async fn get_transaction_by_id<C>(db: &C, transaction_id: i64) -> Result<Option<transaction::Model>>
where
    C: ConnectionTrait,
{
    Transaction::find_by_id(transaction_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// `LIKE` pattern matching `text` anywhere, with `%` and `_` taken literally.
pub(crate) fn contains_pattern(text: &str) -> LikeExpr {
    const ESCAPE: char = '!';

    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | ESCAPE) {
            pattern.push(ESCAPE);
        }
        pattern.push(c);
    }
    pattern.push('%');
    LikeExpr::new(pattern).escape(ESCAPE)
}

fn history_filter(user_id: i64, search: Option<&str>) -> Condition {
    let involved = Condition::any()
        .add(transaction::Column::FromId.eq(user_id))
        .add(transaction::Column::ToId.eq(user_id));

    let mut filter = Condition::all().add(involved);
    if let Some(search) = search.filter(|s| !s.is_empty()) {
        // LIKE is case-insensitive for ASCII in SQLite
        filter = filter.add(transaction::Column::Reason.like(contains_pattern(search)));
    }
    filter
}

/// Retrieves the transactions a user sent or received, newest first.
///
/// The page and the total count are read inside one database transaction and use
/// the same filter, so `doc_count` is never affected by the page window.
///
/// # Errors
/// Returns `Error::BadRequest` if `count` or `page` is zero.
pub async fn find_by_user(
    db: &DatabaseConnection,
    user_id: i64,
    options: &FindOptions,
) -> Result<TransactionPage> {
    if options.count == 0 {
        return Err(Error::bad_request("count must be at least 1"));
    }
    if options.page == 0 {
        return Err(Error::bad_request("page must be at least 1"));
    }

    let filter = history_filter(user_id, options.search.as_deref());
    let txn = db.begin().await?;

    let doc_count = Transaction::find().filter(filter.clone()).count(&txn).await?;

    let transactions = Transaction::find()
        .filter(filter)
        .order_by_desc(transaction::Column::Date)
        .order_by_desc(transaction::Column::Id)
        .offset((options.page - 1).saturating_mul(options.count))
        .limit(options.count)
        .all(&txn)
        .await?;

    txn.commit().await?;

    Ok(TransactionPage {
        transactions,
        doc_count,
        page_count: doc_count.div_ceil(options.count),
        page: options.page,
    })
}
