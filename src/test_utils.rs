//! Shared test utilities for the Kitcoin ledger.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test users with sensible defaults.

pub use crate::access::roles::{Role, RoleSet};

use crate::{
    api::AppState,
    config::settings::parse_settings,
    core::{
        allowance::{AllowancePolicy, end_of_week},
        ledger::Ledger,
        transaction::{NewTransaction, Party},
    },
    entities::{transaction, user},
    errors::Result,
};
use chrono::{Utc, Weekday};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};

/// Allowance policy used by every test ledger.
pub const TEST_POLICY: AllowancePolicy = AllowancePolicy {
    weekly_allowance: 100.0,
    week_start: Weekday::Sun,
};

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
///
/// The pool holds a single connection: every connection to `sqlite::memory:`
/// would otherwise open its own empty database.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1).sqlx_logging(false);

    let db = Database::connect(options).await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// A fresh database plus a ledger over it using [`TEST_POLICY`].
pub async fn setup_ledger() -> Result<(Ledger, DatabaseConnection)> {
    let db = setup_test_db().await?;
    Ok((Ledger::new(db.clone(), TEST_POLICY), db))
}

/// Handler state over a fresh database, with a weekly allowance of 100.
pub async fn setup_app() -> Result<(AppState, DatabaseConnection)> {
    let (ledger, db) = setup_ledger().await?;
    let settings = parse_settings("[ledger]\nweekly_allowance = 100.0\n")?;
    Ok((AppState::new(ledger, settings), db))
}

/// An unsaved user model with the given roles.
///
/// # Defaults
/// * balance: 0.0, no allowance window
/// * `weekly_multiplier`: 1.0
#[must_use]
pub fn user_model(id: i64, roles: RoleSet) -> user::Model {
    user::Model {
        id,
        name: format!("User {id}"),
        email: None,
        google_id: None,
        roles: roles.bits(),
        balance: 0.0,
        balance_expires: None,
        weekly_multiplier: 1.0,
        access_token: None,
        refresh_token: None,
        created_at: Utc::now(),
    }
}

/// Inserts a user with a zero balance.
pub async fn create_test_user(
    db: &DatabaseConnection,
    name: &str,
    role: Role,
) -> Result<user::Model> {
    create_funded_user(db, name, role, 0.0).await
}

/// Inserts a user holding `balance`.
///
/// Staff get an allowance window running to the end of the current week, so the
/// balance is not replaced by a weekly reset on first read. Other users get none.
pub async fn create_funded_user(
    db: &DatabaseConnection,
    name: &str,
    role: Role,
    balance: f64,
) -> Result<user::Model> {
    let now = Utc::now();
    let balance_expires = (role == Role::Staff && balance > 0.0)
        .then(|| end_of_week(now, TEST_POLICY.week_start));

    user::ActiveModel {
        name: Set(name.to_string()),
        roles: Set(role.bits()),
        balance: Set(balance),
        balance_expires: Set(balance_expires),
        weekly_multiplier: Set(1.0),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Sends `amount` from a user to each of `to`, now.
pub async fn send(
    ledger: &Ledger,
    from: i64,
    to: &[i64],
    amount: f64,
    reason: &str,
) -> Result<Vec<transaction::Model>> {
    ledger
        .create_transaction(
            NewTransaction {
                amount,
                reason: Some(reason.to_string()),
                from: Party::User(from),
                to: to.iter().copied().map(Party::User).collect(),
                store: None,
            },
            Utc::now(),
        )
        .await
}
