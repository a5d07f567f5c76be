//! Store business logic - stores, their items and purchase requests.
//!
//! Students request purchases; the store's manager (or an admin) approves or
//! denies them. Approval goes through the ledger like any other transfer, from
//! the student to a label carrying the store's name, with the store context set.

use crate::{
    access::roles::{Role, RoleSet},
    core::{
        allowance::round_currency,
        ledger::Ledger,
        transaction::{NewTransaction, Party, StoreContext},
    },
    entities::{
        Store, StoreItem, StoreRequest, store, store_item, store_request, transaction, user,
    },
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, Set, prelude::*, sea_query::Expr};

/// Input for [`add_item`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    /// Item name
    pub name: String,
    /// Optional description
    pub description: Option<String>,
    /// Price per unit
    pub price: f64,
    /// Initial stock, `None` for unlimited
    pub quantity: Option<i32>,
}

/// Creates a store managed by `manager_id`.
pub async fn create_store<C>(
    db: &C,
    name: &str,
    description: Option<String>,
    manager_id: i64,
    now: DateTime<Utc>,
) -> Result<store::Model>
where
    C: ConnectionTrait,
{
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::bad_request("store name must not be empty"));
    }

    let created = store::ActiveModel {
        name: Set(name.to_string()),
        description: Set(description),
        manager_id: Set(manager_id),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    tracing::info!(store_id = created.id, manager_id, "store created");
    Ok(created)
}

/// Retrieves a store by id.
///
/// # Errors
/// Returns `Error::StoreNotFound` if the store does not exist.
pub async fn get_store<C>(db: &C, store_id: i64) -> Result<store::Model>
where
    C: ConnectionTrait,
{
    Store::find_by_id(store_id)
        .one(db)
        .await?
        .ok_or(Error::StoreNotFound { id: store_id })
}

/// All stores, by name.
pub async fn list_stores<C>(db: &C) -> Result<Vec<store::Model>>
where
    C: ConnectionTrait,
{
    Store::find()
        .order_by_asc(store::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

fn ensure_manages(store: &store::Model, actor: &user::Model) -> Result<()> {
    if store.manager_id == actor.id || RoleSet::from_bits(actor.roles).has_role(Role::Admin) {
        Ok(())
    } else {
        Err(Error::forbidden(format!(
            "only the manager of {} or an administrator can do this",
            store.name
        )))
    }
}

/// Adds an item to a store.
///
/// # Errors
/// - `Error::Forbidden` if `actor` neither manages the store nor is an admin
/// - `Error::InvalidAmount` if the price is not positive
/// - `Error::BadRequest` for a blank name or negative stock
pub async fn add_item<C>(
    db: &C,
    actor: &user::Model,
    store_id: i64,
    item: NewItem,
) -> Result<store_item::Model>
where
    C: ConnectionTrait,
{
    let store = get_store(db, store_id).await?;
    ensure_manages(&store, actor)?;

    let price = round_currency(item.price);
    if !price.is_finite() || price <= 0.0 {
        return Err(Error::InvalidAmount { amount: item.price });
    }
    if item.name.trim().is_empty() {
        return Err(Error::bad_request("item name must not be empty"));
    }
    if item.quantity.is_some_and(|q| q < 0) {
        return Err(Error::bad_request("item quantity must not be negative"));
    }

    store_item::ActiveModel {
        store_id: Set(store.id),
        name: Set(item.name.trim().to_string()),
        description: Set(item.description),
        price: Set(price),
        quantity: Set(item.quantity),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Items of a store, by name.
pub async fn list_items<C>(db: &C, store_id: i64) -> Result<Vec<store_item::Model>>
where
    C: ConnectionTrait,
{
    let store = get_store(db, store_id).await?;
    store
        .find_related(StoreItem)
        .order_by_asc(store_item::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

async fn get_item<C>(db: &C, item_id: i64) -> Result<store_item::Model>
where
    C: ConnectionTrait,
{
    StoreItem::find_by_id(item_id)
        .one(db)
        .await?
        .ok_or(Error::ItemNotFound { id: item_id })
}

async fn get_request<C>(db: &C, request_id: i64) -> Result<store_request::Model>
where
    C: ConnectionTrait,
{
    StoreRequest::find_by_id(request_id)
        .one(db)
        .await?
        .ok_or(Error::RequestNotFound { id: request_id })
}

/// Records a student's request to buy `quantity` units of an item.
///
/// Nothing is charged yet; the balance and stock checks are repeated on approval.
///
/// # Errors
/// - `Error::BadRequest` if `quantity` is below 1
/// - `Error::OutOfStock` if the item does not have enough units left
/// - `Error::InsufficientFunds` if the student cannot cover the total price
pub async fn request_purchase(
    ledger: &Ledger,
    student_id: i64,
    item_id: i64,
    quantity: i32,
    now: DateTime<Utc>,
) -> Result<store_request::Model> {
    if quantity < 1 {
        return Err(Error::bad_request("quantity must be at least 1"));
    }

    let db = ledger.database();
    let item = get_item(db, item_id).await?;

    if let Some(available) = item.quantity {
        if available < quantity {
            return Err(Error::OutOfStock {
                available,
                requested: quantity,
            });
        }
    }

    let total = round_currency(item.price * f64::from(quantity));
    let balance = ledger.get_balance(student_id, now).await?;
    if balance < total {
        return Err(Error::InsufficientFunds {
            current: balance,
            required: total,
        });
    }

    let request = store_request::ActiveModel {
        store_id: Set(item.store_id),
        item_id: Set(item.id),
        student_id: Set(student_id),
        quantity: Set(quantity),
        status: Set(store_request::STATUS_PENDING.to_string()),
        transaction_id: Set(None),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    tracing::info!(request_id = request.id, student_id, item_id, quantity, "purchase requested");
    Ok(request)
}

/// Pending requests for a store, oldest first.
pub async fn list_pending_requests<C>(db: &C, store_id: i64) -> Result<Vec<store_request::Model>>
where
    C: ConnectionTrait,
{
    StoreRequest::find()
        .filter(store_request::Column::StoreId.eq(store_id))
        .filter(store_request::Column::Status.eq(store_request::STATUS_PENDING))
        .order_by_asc(store_request::Column::CreatedAt)
        .order_by_asc(store_request::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Moves a request out of `pending`. Returns false if someone else got there first.
async fn claim_request<C>(db: &C, request_id: i64, status: &str) -> Result<bool>
where
    C: ConnectionTrait,
{
    let result = StoreRequest::update_many()
        .col_expr(store_request::Column::Status, Expr::value(status))
        .filter(store_request::Column::Id.eq(request_id))
        .filter(store_request::Column::Status.eq(store_request::STATUS_PENDING))
        .exec(db)
        .await?;
    Ok(result.rows_affected == 1)
}

async fn not_pending<C>(db: &C, request_id: i64) -> Error
where
    C: ConnectionTrait,
{
    match get_request(db, request_id).await {
        Ok(request) => Error::RequestNotPending {
            id: request.id,
            status: request.status,
        },
        Err(e) => e,
    }
}

/// Takes `quantity` units out of stock if enough are left.
async fn take_stock<C>(db: &C, item: &store_item::Model, quantity: i32) -> Result<bool>
where
    C: ConnectionTrait,
{
    if item.quantity.is_none() {
        return Ok(true);
    }

    let result = StoreItem::update_many()
        .col_expr(
            store_item::Column::Quantity,
            Expr::col(store_item::Column::Quantity).sub(quantity),
        )
        .filter(store_item::Column::Id.eq(item.id))
        .filter(store_item::Column::Quantity.gte(quantity))
        .exec(db)
        .await?;
    Ok(result.rows_affected == 1)
}

async fn return_stock<C>(db: &C, item: &store_item::Model, quantity: i32) -> Result<()>
where
    C: ConnectionTrait,
{
    if item.quantity.is_some() {
        StoreItem::update_many()
            .col_expr(
                store_item::Column::Quantity,
                Expr::col(store_item::Column::Quantity).add(quantity),
            )
            .filter(store_item::Column::Id.eq(item.id))
            .exec(db)
            .await?;
    }
    Ok(())
}

async fn reopen_request<C>(db: &C, request_id: i64) -> Result<()>
where
    C: ConnectionTrait,
{
    StoreRequest::update_many()
        .col_expr(
            store_request::Column::Status,
            Expr::value(store_request::STATUS_PENDING),
        )
        .filter(store_request::Column::Id.eq(request_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Approves a pending request: charges the student, takes the stock and links
/// the resulting transaction.
///
/// The request is claimed first, so two managers approving at once produce one
/// charge. If stock or funds turn out to be insufficient the claim and stock are
/// put back and the request stays pending.
///
/// # Errors
/// - `Error::Forbidden` if `actor` neither manages the store nor is an admin
/// - `Error::RequestNotPending` if the request was already handled
/// - `Error::OutOfStock` / `Error::InsufficientFunds` if it can no longer be fulfilled
pub async fn approve_request(
    ledger: &Ledger,
    request_id: i64,
    actor: &user::Model,
    now: DateTime<Utc>,
) -> Result<(store_request::Model, transaction::Model)> {
    let db = ledger.database();
    let request = get_request(db, request_id).await?;
    let store = get_store(db, request.store_id).await?;
    ensure_manages(&store, actor)?;
    let item = get_item(db, request.item_id).await?;

    if !claim_request(db, request.id, store_request::STATUS_APPROVED).await? {
        return Err(not_pending(db, request.id).await);
    }

    if !take_stock(db, &item, request.quantity).await? {
        reopen_request(db, request.id).await?;
        return Err(Error::OutOfStock {
            available: get_item(db, item.id).await?.quantity.unwrap_or_default(),
            requested: request.quantity,
        });
    }

    let purchase = NewTransaction {
        amount: round_currency(item.price * f64::from(request.quantity)),
        reason: Some(format!("{} x {}", request.quantity, item.name)),
        from: Party::User(request.student_id),
        to: vec![Party::Label(store.name.clone())],
        store: Some(StoreContext {
            store_id: store.id,
            item_id: item.id,
            manager_id: actor.id,
        }),
    };

    let created = match ledger.create_transaction(purchase, now).await {
        Ok(mut rows) => rows.pop(),
        Err(e) => {
            tracing::warn!(request_id, error = %e, "purchase failed, request reopened");
            return_stock(db, &item, request.quantity).await?;
            reopen_request(db, request.id).await?;
            return Err(e);
        }
    };
    let transaction = created.ok_or_else(|| Error::Invariant {
        message: "purchase produced no transaction".to_string(),
    })?;

    let mut active: store_request::ActiveModel = request.into();
    active.status = Set(store_request::STATUS_APPROVED.to_string());
    active.transaction_id = Set(Some(transaction.id));
    let approved = active.update(db).await?;

    tracing::info!(request_id, transaction_id = transaction.id, "purchase approved");
    Ok((approved, transaction))
}

/// Denies a pending request. No balance or stock changes.
///
/// # Errors
/// - `Error::Forbidden` if `actor` neither manages the store nor is an admin
/// - `Error::RequestNotPending` if the request was already handled
pub async fn deny_request<C>(
    db: &C,
    request_id: i64,
    actor: &user::Model,
) -> Result<store_request::Model>
where
    C: ConnectionTrait,
{
    let request = get_request(db, request_id).await?;
    let store = get_store(db, request.store_id).await?;
    ensure_manages(&store, actor)?;

    if !claim_request(db, request.id, store_request::STATUS_DENIED).await? {
        return Err(not_pending(db, request.id).await);
    }

    tracing::info!(request_id, "purchase denied");
    get_request(db, request.id).await
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::*;
    use sea_orm::DatabaseConnection;

    struct Fixture {
        ledger: Ledger,
        db: DatabaseConnection,
        manager: user::Model,
        student: user::Model,
        store: store::Model,
        item: store_item::Model,
    }

    async fn fixture(student_balance: f64, stock: Option<i32>) -> Result<Fixture> {
        let (ledger, db) = setup_ledger().await?;
        let manager = create_test_user(&db, "Coach", Role::Staff).await?;
        let student = create_funded_user(&db, "Sam", Role::Student, student_balance).await?;
        let store = create_store(&db, "Snack Shack", None, manager.id, Utc::now()).await?;
        let item = add_item(
            &db,
            &manager,
            store.id,
            NewItem {
                name: "Granola bar".to_string(),
                description: None,
                price: 2.5,
                quantity: stock,
            },
        )
        .await?;

        Ok(Fixture {
            ledger,
            db,
            manager,
            student,
            store,
            item,
        })
    }

    #[tokio::test]
    async fn test_create_store_and_items() -> Result<()> {
        let f = fixture(0.0, Some(5)).await?;

        assert!(matches!(
            create_store(&f.db, "  ", None, f.manager.id, Utc::now()).await,
            Err(Error::BadRequest { .. })
        ));

        let result = add_item(
            &f.db,
            &f.student,
            f.store.id,
            NewItem {
                name: "Sticker".to_string(),
                description: None,
                price: 1.0,
                quantity: None,
            },
        )
        .await;
        assert!(matches!(result, Err(Error::Forbidden { .. })));

        let result = add_item(
            &f.db,
            &f.manager,
            f.store.id,
            NewItem {
                name: "Free".to_string(),
                description: None,
                price: 0.0,
                quantity: None,
            },
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidAmount { .. })));

        let admin = create_test_user(&f.db, "Principal", Role::Admin).await?;
        add_item(
            &f.db,
            &admin,
            f.store.id,
            NewItem {
                name: "Apple".to_string(),
                description: Some("Fresh".to_string()),
                price: 0.75,
                quantity: None,
            },
        )
        .await?;

        let items = list_items(&f.db, f.store.id).await?;
        let names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Apple", "Granola bar"]);

        assert!(matches!(
            list_items(&f.db, 999).await,
            Err(Error::StoreNotFound { .. })
        ));
        assert_eq!(list_stores(&f.db).await?.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_request_purchase_checks() -> Result<()> {
        let f = fixture(6.0, Some(3)).await?;
        let now = Utc::now();

        assert!(matches!(
            request_purchase(&f.ledger, f.student.id, f.item.id, 0, now).await,
            Err(Error::BadRequest { .. })
        ));
        assert!(matches!(
            request_purchase(&f.ledger, f.student.id, f.item.id, 4, now).await,
            Err(Error::OutOfStock {
                available: 3,
                requested: 4
            })
        ));
        assert!(matches!(
            request_purchase(&f.ledger, f.student.id, f.item.id, 3, now).await,
            Err(Error::InsufficientFunds { .. })
        ));
        assert!(matches!(
            request_purchase(&f.ledger, f.student.id, 999, 1, now).await,
            Err(Error::ItemNotFound { .. })
        ));

        let request = request_purchase(&f.ledger, f.student.id, f.item.id, 2, now).await?;
        assert_eq!(request.status, store_request::STATUS_PENDING);
        // requesting charges nothing
        assert_eq!(f.ledger.get_balance(f.student.id, now).await?, 6.0);

        Ok(())
    }

    #[tokio::test]
    async fn test_approve_request() -> Result<()> {
        let f = fixture(10.0, Some(3)).await?;
        let now = Utc::now();

        let request = request_purchase(&f.ledger, f.student.id, f.item.id, 2, now).await?;
        assert_eq!(list_pending_requests(&f.db, f.store.id).await?.len(), 1);

        let outsider = create_test_user(&f.db, "Other", Role::Staff).await?;
        assert!(matches!(
            approve_request(&f.ledger, request.id, &outsider, now).await,
            Err(Error::Forbidden { .. })
        ));

        let (approved, transaction) =
            approve_request(&f.ledger, request.id, &f.manager, now).await?;

        assert_eq!(approved.status, store_request::STATUS_APPROVED);
        assert_eq!(approved.transaction_id, Some(transaction.id));
        assert_eq!(transaction.amount, 5.0);
        assert_eq!(transaction.from_id, Some(f.student.id));
        assert_eq!(transaction.to_text.as_deref(), Some("Snack Shack"));
        assert_eq!(transaction.store_id, Some(f.store.id));
        assert_eq!(transaction.item_id, Some(f.item.id));
        assert_eq!(transaction.manager_id, Some(f.manager.id));

        assert_eq!(f.ledger.get_balance(f.student.id, now).await?, 5.0);
        assert_eq!(get_item(&f.db, f.item.id).await?.quantity, Some(1));
        assert!(list_pending_requests(&f.db, f.store.id).await?.is_empty());

        let again = approve_request(&f.ledger, request.id, &f.manager, now).await;
        assert!(matches!(again, Err(Error::RequestNotPending { .. })));

        Ok(())
    }

    #[tokio::test]
    async fn test_failed_approval_reopens_request() -> Result<()> {
        let f = fixture(5.0, Some(4)).await?;
        let now = Utc::now();

        let request = request_purchase(&f.ledger, f.student.id, f.item.id, 2, now).await?;

        // spend the money elsewhere before the manager gets to it
        send(&f.ledger, f.student.id, &[f.manager.id], 3.0, "lunch").await?;

        let result = approve_request(&f.ledger, request.id, &f.manager, now).await;
        assert!(matches!(result, Err(Error::InsufficientFunds { .. })));

        assert_eq!(get_request(&f.db, request.id).await?.status, store_request::STATUS_PENDING);
        assert_eq!(get_item(&f.db, f.item.id).await?.quantity, Some(4));
        assert_eq!(f.ledger.get_balance(f.student.id, now).await?, 2.0);

        Ok(())
    }

    #[tokio::test]
    async fn test_approval_out_of_stock() -> Result<()> {
        let f = fixture(20.0, Some(2)).await?;
        let now = Utc::now();

        let first = request_purchase(&f.ledger, f.student.id, f.item.id, 2, now).await?;
        let second = request_purchase(&f.ledger, f.student.id, f.item.id, 1, now).await?;

        approve_request(&f.ledger, first.id, &f.manager, now).await?;
        let result = approve_request(&f.ledger, second.id, &f.manager, now).await;
        assert!(matches!(
            result,
            Err(Error::OutOfStock {
                available: 0,
                requested: 1
            })
        ));
        assert_eq!(get_request(&f.db, second.id).await?.status, store_request::STATUS_PENDING);
        assert_eq!(f.ledger.get_balance(f.student.id, now).await?, 15.0);

        Ok(())
    }

    #[tokio::test]
    async fn test_deny_request() -> Result<()> {
        let f = fixture(10.0, None).await?;
        let now = Utc::now();

        let request = request_purchase(&f.ledger, f.student.id, f.item.id, 1, now).await?;
        assert!(matches!(
            deny_request(&f.db, request.id, &f.student).await,
            Err(Error::Forbidden { .. })
        ));

        let denied = deny_request(&f.db, request.id, &f.manager).await?;
        assert_eq!(denied.status, store_request::STATUS_DENIED);
        assert_eq!(f.ledger.get_balance(f.student.id, now).await?, 10.0);

        match approve_request(&f.ledger, request.id, &f.manager, now).await {
            Err(Error::RequestNotPending { status, .. }) => {
                assert_eq!(status, store_request::STATUS_DENIED);
            }
            other => panic!("expected RequestNotPending, got {other:?}"),
        }

        assert!(matches!(
            deny_request(&f.db, 999, &f.manager).await,
            Err(Error::RequestNotFound { .. })
        ));

        Ok(())
    }
}
