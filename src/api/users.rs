//! User handlers - sign-in, profiles and administration.

use crate::{
    access::{
        gateway::{Part, Policy, Request, authorize},
        roles::{Role, RoleSet},
        validator::{
            Validator, and, each, exists, gte, is_array, is_integer, is_string, lte, matches,
            one_of, optional,
        },
    },
    api::AppState,
    core::{
        user::{self, Profile},
        view::UserView,
    },
    errors::{Error, Result},
};
use chrono::Utc;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

const DEFAULT_SEARCH_LIMIT: i64 = 20;

static EMAIL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

fn email() -> Validator {
    EMAIL.clone().map_or_else(is_string, matches)
}

fn id_param() -> Validator {
    and([exists(), is_integer()]).with_status(404)
}

fn role_names() -> Validator {
    and([
        exists(),
        is_array(),
        each(one_of(
            Role::ALL.iter().map(|r| Value::from(r.name())).collect(),
        )),
    ])
}

static SIGN_IN: LazyLock<Policy> = LazyLock::new(|| {
    Policy::public()
        .field(Part::Body, "googleId", and([exists(), is_string()]))
        .field(Part::Body, "name", and([exists(), is_string()]))
        .field(Part::Body, "email", optional(email()))
        .field(Part::Body, "accessToken", optional(is_string()))
        .field(Part::Body, "refreshToken", optional(is_string()))
});

static ME: LazyLock<Policy> = LazyLock::new(Policy::authenticated);

static GET: LazyLock<Policy> =
    LazyLock::new(|| Policy::authenticated().field(Part::Params, "id", id_param()));

static SEARCH: LazyLock<Policy> = LazyLock::new(|| {
    Policy::authenticated()
        .roles(&[Role::Staff, Role::Admin])
        .field(Part::Query, "q", and([exists(), is_string()]))
        .field(
            Part::Query,
            "limit",
            optional(and([is_integer(), gte(1.0), lte(100.0)])),
        )
});

static SET_ROLES: LazyLock<Policy> = LazyLock::new(|| {
    Policy::authenticated()
        .roles(&[Role::Admin])
        .field(Part::Params, "id", id_param())
        .deferred_field(Part::Body, "roles", role_names)
});

static SET_MULTIPLIER: LazyLock<Policy> = LazyLock::new(|| {
    Policy::authenticated()
        .roles(&[Role::Admin])
        .field(Part::Params, "id", id_param())
        .field(Part::Body, "multiplier", and([exists(), gte(0.0)]))
});

static SUSPEND: LazyLock<Policy> = LazyLock::new(|| {
    Policy::authenticated()
        .roles(&[Role::Admin])
        .field(Part::Params, "id", id_param())
});

/// Signs in the identity described by the body and returns its profile.
///
/// Body: `googleId`, `name`, optional `email`, `accessToken`, `refreshToken`.
pub async fn sign_in(state: &AppState, request: &Request) -> Result<UserView> {
    authorize(request, &SIGN_IN)?;

    let text = |field: &str| -> Result<Option<String>> {
        Ok(request.optional_string(Part::Body, field)?.map(str::to_string))
    };
    let profile = Profile {
        google_id: request.string(Part::Body, "googleId")?.to_string(),
        name: request.string(Part::Body, "name")?.trim().to_string(),
        email: text("email")?,
        access_token: text("accessToken")?,
        refresh_token: text("refreshToken")?,
    };

    let now = Utc::now();
    let signed_in = user::sign_in(state.ledger.database(), &state.settings, profile, now).await?;
    let current = state.ledger.current_user(signed_in.id, now).await?;
    Ok(UserView::from(&current))
}

/// The caller's own profile and balance.
pub async fn me(state: &AppState, request: &Request) -> Result<UserView> {
    let Some(actor) = authorize(request, &ME)? else {
        return Err(Error::Unauthorized);
    };
    let current = state.ledger.current_user(actor.id, Utc::now()).await?;
    Ok(UserView::from(&current))
}

/// Another user's profile. Students may only look themselves up.
pub async fn get(state: &AppState, request: &Request) -> Result<UserView> {
    let Some(actor) = authorize(request, &GET)? else {
        return Err(Error::Unauthorized);
    };
    let id = request.integer(Part::Params, "id")?;

    if id != actor.id && !RoleSet::from_bits(actor.roles).has_any_role(&[Role::Staff, Role::Admin])
    {
        return Err(Error::forbidden("students can only view their own profile"));
    }

    let current = state.ledger.current_user(id, Utc::now()).await?;
    Ok(UserView::from(&current))
}

/// Users whose name contains `query.q`.
pub async fn search(state: &AppState, request: &Request) -> Result<Vec<UserView>> {
    authorize(request, &SEARCH)?;

    let query = request.string(Part::Query, "q")?;
    let limit = request
        .optional_integer(Part::Query, "limit")?
        .unwrap_or(DEFAULT_SEARCH_LIMIT);
    let limit = u64::try_from(limit).unwrap_or_default();

    let users = user::search_users(state.ledger.database(), query, limit).await?;
    Ok(users.iter().map(UserView::from).collect())
}

/// Replaces the roles of `params.id` with `body.roles`.
pub async fn set_roles(state: &AppState, request: &Request) -> Result<UserView> {
    authorize(request, &SET_ROLES)?;

    let id = request.integer(Part::Params, "id")?;
    let names: Vec<&str> = request
        .array(Part::Body, "roles")?
        .iter()
        .filter_map(Value::as_str)
        .collect();

    let updated = user::set_roles(state.ledger.database(), id, names.as_slice()).await?;
    Ok(UserView::from(&updated))
}

/// Changes the weekly allowance multiplier of `params.id`.
pub async fn set_multiplier(state: &AppState, request: &Request) -> Result<UserView> {
    authorize(request, &SET_MULTIPLIER)?;

    let id = request.integer(Part::Params, "id")?;
    let multiplier = request.number(Part::Body, "multiplier")?;

    let updated = user::set_weekly_multiplier(state.ledger.database(), id, multiplier).await?;
    Ok(UserView::from(&updated))
}

/// Permanently removes the user in `params.id`.
pub async fn suspend(state: &AppState, request: &Request) -> Result<()> {
    let Some(actor) = authorize(request, &SUSPEND)? else {
        return Err(Error::Unauthorized);
    };
    let id = request.integer(Part::Params, "id")?;

    if id == actor.id {
        return Err(Error::bad_request("administrators cannot suspend themselves"));
    }

    state.ledger.suspend_user(id).await
}
