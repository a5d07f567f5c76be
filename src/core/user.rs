//! User business logic - sign-in, lookup and administration.
//!
//! Users are created the first time an identity resolves. Roles and the weekly
//! multiplier are changed by administrators; balances are never touched here
//! (see [`crate::core::ledger::Ledger`]).

use crate::{
    access::roles::{RoleSet, is_valid_roles},
    config::settings::Settings,
    core::transaction::contains_pattern,
    entities::{User, user},
    errors::{Error, Result},
    external::UserDirectory,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, QuerySelect, Set, prelude::*};

/// Identity as supplied by the sign-in provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// External directory id
    pub google_id: String,
    /// Display name
    pub name: String,
    /// Contact address
    pub email: Option<String>,
    /// OAuth access token
    pub access_token: Option<String>,
    /// OAuth refresh token
    pub refresh_token: Option<String>,
}

/// Signs a user in, creating them on first resolution.
///
/// New users get `STUDENT`, or the roles of a matching `[[admins]]` entry. Known
/// users have their name, email and any newly issued tokens refreshed.
pub async fn sign_in<C>(
    db: &C,
    settings: &Settings,
    profile: Profile,
    now: DateTime<Utc>,
) -> Result<user::Model>
where
    C: ConnectionTrait,
{
    if let Some(existing) = find_by_google_id(db, &profile.google_id).await? {
        let mut active: user::ActiveModel = existing.into();
        active.name = Set(profile.name);
        active.email = Set(profile.email);
        if profile.access_token.is_some() {
            active.access_token = Set(profile.access_token);
        }
        if profile.refresh_token.is_some() {
            active.refresh_token = Set(profile.refresh_token);
        }
        return active.update(db).await.map_err(Into::into);
    }

    let roles = settings
        .admin_for(&profile.google_id)
        .map_or(RoleSet::DEFAULT, |seed| seed.role_set());

    let created = user::ActiveModel {
        name: Set(profile.name),
        email: Set(profile.email),
        google_id: Set(Some(profile.google_id)),
        roles: Set(roles.bits()),
        balance: Set(0.0),
        balance_expires: Set(None),
        weekly_multiplier: Set(1.0),
        access_token: Set(profile.access_token),
        refresh_token: Set(profile.refresh_token),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    tracing::info!(user_id = created.id, roles = ?roles.names(), "new user signed in");
    Ok(created)
}

/// Makes sure every `[[admins]]` entry exists with at least its configured roles.
///
/// Returns the number of users created.
pub async fn seed_admins<C>(db: &C, settings: &Settings, now: DateTime<Utc>) -> Result<usize>
where
    C: ConnectionTrait,
{
    let mut created = 0;

    for seed in &settings.admins {
        let roles = seed.role_set();
        match find_by_google_id(db, &seed.google_id).await? {
            Some(existing) => {
                let current = RoleSet::from_bits(existing.roles);
                if !current.contains(roles) {
                    let mut active: user::ActiveModel = existing.into();
                    active.roles = Set(current.union(roles).bits());
                    active.update(db).await?;
                    tracing::info!(name = %seed.name, "granted configured roles");
                }
            }
            None => {
                user::ActiveModel {
                    name: Set(seed.name.clone()),
                    email: Set(seed.email.clone()),
                    google_id: Set(Some(seed.google_id.clone())),
                    roles: Set(roles.bits()),
                    balance: Set(0.0),
                    weekly_multiplier: Set(1.0),
                    created_at: Set(now),
                    ..Default::default()
                }
                .insert(db)
                .await?;
                created += 1;
            }
        }
    }

    Ok(created)
}

/// Retrieves a user by id.
///
/// # Errors
/// Returns `Error::UserNotFound` if no such user exists.
pub async fn get_user<C>(db: &C, user_id: i64) -> Result<user::Model>
where
    C: ConnectionTrait,
{
    User::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::UserNotFound {
            id: user_id.to_string(),
        })
}

/// Finds the user linked to an external directory id.
pub async fn find_by_google_id<C>(db: &C, google_id: &str) -> Result<Option<user::Model>>
where
    C: ConnectionTrait,
{
    User::find()
        .filter(user::Column::GoogleId.eq(google_id))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Users whose name contains `query`, alphabetically.
pub async fn search_users<C>(db: &C, query: &str, limit: u64) -> Result<Vec<user::Model>>
where
    C: ConnectionTrait,
{
    User::find()
        .filter(user::Column::Name.like(contains_pattern(query.trim())))
        .order_by_asc(user::Column::Name)
        .order_by_asc(user::Column::Id)
        .limit(limit)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Replaces a user's roles.
///
/// # Errors
/// Returns `Error::BadRequest` if `names` is empty or contains an unknown role.
pub async fn set_roles<C, S>(db: &C, user_id: i64, names: &[S]) -> Result<user::Model>
where
    C: ConnectionTrait,
    S: AsRef<str>,
{
    if names.is_empty() || !is_valid_roles(names) {
        return Err(Error::bad_request(
            "roles must be a non-empty list of STUDENT, STAFF or ADMIN",
        ));
    }

    let roles = RoleSet::from_names(names);
    let mut active: user::ActiveModel = get_user(db, user_id).await?.into();
    active.roles = Set(roles.bits());
    let updated = active.update(db).await?;

    tracing::info!(user_id, roles = ?roles.names(), "roles updated");
    Ok(updated)
}

/// Changes the factor applied to a user's weekly allowance.
///
/// Takes effect at the next weekly reset.
///
/// # Errors
/// Returns `Error::BadRequest` if `multiplier` is negative or not finite.
pub async fn set_weekly_multiplier<C>(db: &C, user_id: i64, multiplier: f64) -> Result<user::Model>
where
    C: ConnectionTrait,
{
    if !multiplier.is_finite() || multiplier < 0.0 {
        return Err(Error::bad_request(format!(
            "weekly multiplier must be a non-negative number, got {multiplier}"
        )));
    }

    let mut active: user::ActiveModel = get_user(db, user_id).await?.into();
    active.weekly_multiplier = Set(multiplier);
    active.update(db).await.map_err(Into::into)
}

/// Directory that looks identities up in the users table on every call, so
/// users created after startup resolve too.
#[derive(Debug, Clone)]
pub struct DatabaseDirectory {
    db: DatabaseConnection,
}

impl DatabaseDirectory {
    /// Creates a directory over `db`.
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserDirectory for DatabaseDirectory {
    async fn resolve(&self, external_id: &str) -> Result<Option<i64>> {
        Ok(find_by_google_id(&self.db, external_id)
            .await?
            .map(|user| user.id))
    }
}
