//! Transaction handlers - transfer, delete and list history.

use crate::{
    access::{
        gateway::{Part, Policy, Request, authorize},
        roles::{Role, RoleSet},
        validator::{
            and, coerce_number, each, exists, gt, gte, is_array, is_integer, is_numeric_string,
            is_string, lte, not, optional, or,
        },
    },
    api::AppState,
    core::{
        transaction::{FindOptions, NewTransaction, Party, find_by_user},
        view::{TransactionPageView, TransactionView},
    },
    errors::{Error, Result},
};
use chrono::Utc;
use serde_json::Value;
use std::sync::LazyLock;

/// Largest page a client may ask for.
const MAX_PAGE_SIZE: f64 = 100.0;

static CREATE: LazyLock<Policy> = LazyLock::new(|| {
    let label = and([is_string(), not(is_numeric_string())]);
    Policy::authenticated()
        .field(Part::Body, "amount", and([exists(), gt(0.0)]))
        .field(
            Part::Body,
            "to",
            and([exists(), is_array(), each(or([is_integer(), label.clone()]))]),
        )
        .field(Part::Body, "reason", optional(is_string()))
        .field(Part::Body, "from", optional(label))
});

static DELETE: LazyLock<Policy> = LazyLock::new(|| {
    Policy::authenticated()
        .roles(&[Role::Staff, Role::Admin])
        .field(Part::Params, "id", and([exists(), is_integer()]).with_status(404))
});

static LIST: LazyLock<Policy> = LazyLock::new(|| {
    Policy::authenticated()
        .field(Part::Query, "user", optional(is_integer()))
        .field(
            Part::Query,
            "count",
            optional(and([is_integer(), gte(1.0), lte(MAX_PAGE_SIZE)])),
        )
        .field(Part::Query, "page", optional(and([is_integer(), gte(1.0)])))
        .field(Part::Query, "search", optional(is_string()))
});

/// Whole numbers, including numeric strings, are user ids; other strings are labels.
#[allow(clippy::cast_possible_truncation)]
fn party(value: &Value) -> Result<Party> {
    if let Some(n) = coerce_number(Some(value)) {
        return if n.fract() == 0.0 && n.abs() < 9.0e15 {
            Ok(Party::User(n as i64))
        } else {
            Err(Error::bad_request("to in body must hold user ids or labels"))
        };
    }

    match value {
        Value::String(text) => Ok(Party::Label(text.trim().to_string())),
        _ => Err(Error::bad_request("to in body must hold user ids or labels")),
    }
}

/// Sends `amount` to every entry of `to` as the signed-in user.
///
/// Body: `amount`, `to` (user ids or labels), optional `reason`. Admins may
/// pass `from` to send from a label instead of themselves.
pub async fn create(state: &AppState, request: &Request) -> Result<Vec<TransactionView>> {
    let Some(actor) = authorize(request, &CREATE)? else {
        return Err(Error::Unauthorized);
    };

    let from = match request.optional_string(Part::Body, "from")? {
        Some(label) if RoleSet::from_bits(actor.roles).has_role(Role::Admin) => {
            Party::Label(label.trim().to_string())
        }
        Some(_) => return Err(Error::forbidden("only administrators can send from a label")),
        None => Party::User(actor.id),
    };

    let to = request
        .array(Part::Body, "to")?
        .iter()
        .map(party)
        .collect::<Result<Vec<_>>>()?;

    let new = NewTransaction {
        amount: request.number(Part::Body, "amount")?,
        reason: request.optional_string(Part::Body, "reason")?.map(str::to_string),
        from,
        to,
        store: None,
    };

    let created = state.ledger.create_transaction(new, Utc::now()).await?;
    Ok(created
        .iter()
        .map(|t| TransactionView::for_viewer(t, Some(actor.id)))
        .collect())
}

/// Deletes the transaction in `params.id` and reverses its effects.
pub async fn delete(state: &AppState, request: &Request) -> Result<TransactionView> {
    let Some(actor) = authorize(request, &DELETE)? else {
        return Err(Error::Unauthorized);
    };
    let id = request.integer(Part::Params, "id")?;

    let deleted = state.ledger.delete_transaction(id, actor, Utc::now()).await?;
    Ok(TransactionView::for_viewer(&deleted, Some(actor.id)))
}

/// Pages through a user's history, newest first.
///
/// Query: optional `user` (staff and admins only, defaults to the caller),
/// `count`, `page` and `search`.
pub async fn list(state: &AppState, request: &Request) -> Result<TransactionPageView> {
    let Some(actor) = authorize(request, &LIST)? else {
        return Err(Error::Unauthorized);
    };

    let user_id = request
        .optional_integer(Part::Query, "user")?
        .unwrap_or(actor.id);
    if user_id != actor.id
        && !RoleSet::from_bits(actor.roles).has_any_role(&[Role::Staff, Role::Admin])
    {
        return Err(Error::forbidden("students can only list their own transactions"));
    }

    let defaults = FindOptions::default();
    let options = FindOptions {
        count: request
            .optional_integer(Part::Query, "count")?
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or(defaults.count),
        page: request
            .optional_integer(Part::Query, "page")?
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or(defaults.page),
        search: request
            .optional_string(Part::Query, "search")?
            .map(str::to_string),
    };

    let page = find_by_user(state.ledger.database(), user_id, &options).await?;
    Ok(TransactionPageView::for_viewer(&page, Some(actor.id)))
}
