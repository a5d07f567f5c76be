//! Store handlers - stores, items and purchase requests.

use crate::{
    access::{
        gateway::{Part, Policy, Request, authorize},
        roles::Role,
        validator::{Validator, and, exists, gt, gte, is_integer, is_string, optional},
    },
    api::AppState,
    core::{
        store::{self, NewItem},
        view::TransactionView,
    },
    entities::{store as store_entity, store_item, store_request},
    errors::{Error, Result},
};
use chrono::Utc;
use serde::Serialize;
use std::sync::LazyLock;

fn id_param() -> Validator {
    and([exists(), is_integer()]).with_status(404)
}

static CREATE: LazyLock<Policy> = LazyLock::new(|| {
    Policy::authenticated()
        .roles(&[Role::Staff, Role::Admin])
        .field(Part::Body, "name", and([exists(), is_string()]))
        .field(Part::Body, "description", optional(is_string()))
});

static LIST: LazyLock<Policy> = LazyLock::new(Policy::authenticated);

static ADD_ITEM: LazyLock<Policy> = LazyLock::new(|| {
    Policy::authenticated()
        .roles(&[Role::Staff, Role::Admin])
        .field(Part::Params, "id", id_param())
        .field(Part::Body, "name", and([exists(), is_string()]))
        .field(Part::Body, "description", optional(is_string()))
        .field(Part::Body, "price", and([exists(), gt(0.0)]))
        .field(Part::Body, "quantity", optional(and([is_integer(), gte(0.0)])))
});

static ITEMS: LazyLock<Policy> =
    LazyLock::new(|| Policy::authenticated().field(Part::Params, "id", id_param()));

static REQUEST_PURCHASE: LazyLock<Policy> = LazyLock::new(|| {
    Policy::authenticated()
        .roles(&[Role::Student])
        .field(Part::Body, "item", and([exists(), is_integer()]))
        .field(Part::Body, "quantity", optional(and([is_integer(), gte(1.0)])))
});

static MANAGE_REQUEST: LazyLock<Policy> = LazyLock::new(|| {
    Policy::authenticated()
        .roles(&[Role::Staff, Role::Admin])
        .field(Part::Params, "id", id_param())
});

/// Result of approving a purchase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApprovalView {
    /// The request, now approved
    pub request: store_request::Model,
    /// The charge it produced
    pub transaction: TransactionView,
}

/// Opens a store managed by the caller.
pub async fn create(state: &AppState, request: &Request) -> Result<store_entity::Model> {
    let Some(actor) = authorize(request, &CREATE)? else {
        return Err(Error::Unauthorized);
    };

    store::create_store(
        state.ledger.database(),
        request.string(Part::Body, "name")?,
        request
            .optional_string(Part::Body, "description")?
            .map(str::to_string),
        actor.id,
        Utc::now(),
    )
    .await
}

/// Every store.
pub async fn list(state: &AppState, request: &Request) -> Result<Vec<store_entity::Model>> {
    authorize(request, &LIST)?;
    store::list_stores(state.ledger.database()).await
}

/// Adds an item to the store in `params.id`.
pub async fn add_item(state: &AppState, request: &Request) -> Result<store_item::Model> {
    let Some(actor) = authorize(request, &ADD_ITEM)? else {
        return Err(Error::Unauthorized);
    };

    let quantity = request
        .optional_integer(Part::Body, "quantity")?
        .map(|q| i32::try_from(q).map_err(|_| Error::bad_request("quantity in body is too large")))
        .transpose()?;

    let item = NewItem {
        name: request.string(Part::Body, "name")?.to_string(),
        description: request
            .optional_string(Part::Body, "description")?
            .map(str::to_string),
        price: request.number(Part::Body, "price")?,
        quantity,
    };

    store::add_item(
        state.ledger.database(),
        actor,
        request.integer(Part::Params, "id")?,
        item,
    )
    .await
}

/// Items of the store in `params.id`.
pub async fn items(state: &AppState, request: &Request) -> Result<Vec<store_item::Model>> {
    authorize(request, &ITEMS)?;
    store::list_items(state.ledger.database(), request.integer(Part::Params, "id")?).await
}

/// Asks to buy `body.quantity` (default 1) of `body.item`.
pub async fn request_purchase(
    state: &AppState,
    request: &Request,
) -> Result<store_request::Model> {
    let Some(actor) = authorize(request, &REQUEST_PURCHASE)? else {
        return Err(Error::Unauthorized);
    };

    let quantity = request
        .optional_integer(Part::Body, "quantity")?
        .unwrap_or(1);
    let quantity =
        i32::try_from(quantity).map_err(|_| Error::bad_request("quantity in body is too large"))?;

    store::request_purchase(
        &state.ledger,
        actor.id,
        request.integer(Part::Body, "item")?,
        quantity,
        Utc::now(),
    )
    .await
}

/// Pending requests of the store in `params.id`.
pub async fn pending(state: &AppState, request: &Request) -> Result<Vec<store_request::Model>> {
    authorize(request, &MANAGE_REQUEST)?;
    store::list_pending_requests(state.ledger.database(), request.integer(Part::Params, "id")?)
        .await
}

/// Approves the request in `params.id`.
pub async fn approve(state: &AppState, request: &Request) -> Result<ApprovalView> {
    let Some(actor) = authorize(request, &MANAGE_REQUEST)? else {
        return Err(Error::Unauthorized);
    };

    let (approved, transaction) = store::approve_request(
        &state.ledger,
        request.integer(Part::Params, "id")?,
        actor,
        Utc::now(),
    )
    .await?;

    Ok(ApprovalView {
        request: approved,
        transaction: TransactionView::for_viewer(&transaction, Some(actor.id)),
    })
}

/// Denies the request in `params.id`.
pub async fn deny(state: &AppState, request: &Request) -> Result<store_request::Model> {
    let Some(actor) = authorize(request, &MANAGE_REQUEST)? else {
        return Err(Error::Unauthorized);
    };
    store::deny_request(
        state.ledger.database(),
        request.integer(Part::Params, "id")?,
        actor,
    )
    .await
}
