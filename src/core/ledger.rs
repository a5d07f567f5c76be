//! Ledger engine - the only code that moves balances.
//!
//! Every mutation follows the same shape: take the per-user locks of everyone
//! involved (ascending id order), open a database transaction, materialize the
//! weekly allowance for each user, check, write rows and balances, commit, release
//! the locks and only then hand receipts to the [`Notifier`].
//!
//! A failure at any step drops the database transaction, which rolls back every
//! row and balance written so far.

use crate::{
    access::roles::{Role, RoleSet},
    core::{
        allowance::{AllowancePolicy, materialize_balance, round_currency, window_covers},
        locks::UserLocks,
        transaction::{NewTransaction, Party, get_transaction_by_id},
    },
    entities::{Transaction, User, transaction, user},
    errors::{Error, Result},
    external::{LogNotifier, Notifier},
};
use chrono::{DateTime, TimeDelta, Utc};
use sea_orm::{DatabaseConnection, Set, TransactionTrait, prelude::*};
use std::collections::{BTreeMap, btree_map::Entry};
use std::sync::Arc;

/// How long after creation the sending staff member may still delete a transaction.
pub const MUTABILITY_WINDOW_HOURS: i64 = 24;

/// Shared ledger state: storage, allowance policy, lock registry and notifier.
pub struct Ledger {
    db: DatabaseConnection,
    policy: AllowancePolicy,
    locks: UserLocks,
    notifier: Arc<dyn Notifier>,
}

impl Ledger {
    /// Creates a ledger that logs receipts.
    #[must_use]
    pub fn new(db: DatabaseConnection, policy: AllowancePolicy) -> Self {
        Self {
            db,
            policy,
            locks: UserLocks::new(),
            notifier: Arc::new(LogNotifier),
        }
    }

    /// Replaces the receipt notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Underlying connection, for reads that need no lock.
    #[must_use]
    pub const fn database(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Allowance policy in force.
    #[must_use]
    pub const fn policy(&self) -> &AllowancePolicy {
        &self.policy
    }

    /// Moves `amount` from `new.from` to every entry of `new.to`.
    ///
    /// One row is created per recipient. If the sender is a user, their
    /// materialized balance must cover `amount * new.to.len()`; the check and all
    /// writes happen while the sender's lock is held, so the batch either applies
    /// completely or not at all.
    ///
    /// # Errors
    /// - `Error::InvalidAmount` if the amount is not a positive finite number
    /// - `Error::InvalidRecipient` if there are no recipients, the sender is among
    ///   them, or a label is blank
    /// - `Error::UserNotFound` if a user side does not exist
    /// - `Error::InsufficientFunds` if the sender cannot cover the aggregate
    #[tracing::instrument(skip(self, new), fields(amount = new.amount, recipients = new.to.len()))]
    pub async fn create_transaction(
        &self,
        new: NewTransaction,
        now: DateTime<Utc>,
    ) -> Result<Vec<transaction::Model>> {
        let amount = round_currency(new.amount);
        if !amount.is_finite() || amount <= 0.0 {
            return Err(Error::InvalidAmount { amount: new.amount });
        }

        check_parties(&new)?;

        let sender_id = new.from.user_id();
        let involved: Vec<i64> = std::iter::once(&new.from)
            .chain(&new.to)
            .filter_map(Party::user_id)
            .collect();

        let guards = self.locks.acquire(involved.iter().copied()).await;
        let txn = self.db.begin().await?;

        let mut users = BTreeMap::new();
        for id in involved {
            if let Entry::Vacant(slot) = users.entry(id) {
                let user = load_user(&txn, id).await?;
                let materialized = materialize_balance(&user, &self.policy, now);
                slot.insert((user, materialized));
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let recipient_count = new.to.len() as f64;
        let aggregate = round_currency(amount * recipient_count);

        if let Some((_, sender)) = sender_id.and_then(|id| users.get(&id)) {
            if sender.balance < aggregate {
                tracing::warn!(
                    sender_id,
                    balance = sender.balance,
                    required = aggregate,
                    "rejected transfer: insufficient funds"
                );
                return Err(Error::InsufficientFunds {
                    current: sender.balance,
                    required: aggregate,
                });
            }
        }

        let reason = new.reason.filter(|r| !r.trim().is_empty());
        let (from_id, from_text) = new.from.into_columns();
        let mut deltas: BTreeMap<i64, f64> = BTreeMap::new();
        let mut created = Vec::with_capacity(new.to.len());

        for recipient in new.to {
            if let Some(id) = recipient.user_id() {
                *deltas.entry(id).or_default() += amount;
            }
            let (to_id, to_text) = recipient.into_columns();

            let row = transaction::ActiveModel {
                amount: Set(amount),
                reason: Set(reason.clone()),
                from_id: Set(from_id),
                from_text: Set(from_text.clone()),
                to_id: Set(to_id),
                to_text: Set(to_text),
                store_id: Set(new.store.map(|s| s.store_id)),
                item_id: Set(new.store.map(|s| s.item_id)),
                manager_id: Set(new.store.map(|s| s.manager_id)),
                date: Set(now),
                ..Default::default()
            };
            created.push(row.insert(&txn).await?);
        }

        if let Some(id) = sender_id {
            *deltas.entry(id).or_default() -= aggregate;
        }

        for (id, (user, materialized)) in users {
            let delta = deltas.get(&id).copied().unwrap_or_default();
            store_balance(
                &txn,
                user,
                materialized.balance + delta,
                materialized.balance_expires,
            )
            .await?;
        }

        txn.commit().await?;
        drop(guards);

        tracing::info!(
            ids = ?created.iter().map(|t| t.id).collect::<Vec<_>>(),
            aggregate,
            "transactions created"
        );

        for row in &created {
            self.notifier.send_receipt(row);
        }

        Ok(created)
    }

    /// Deletes a transaction and reverses its balance effects.
    ///
    /// The recipient is debited the stored amount. The sender is credited it back,
    /// unless the sender is staff whose current allowance window no longer covers
    /// the transaction's date. Sides whose user has since been suspended are skipped.
    ///
    /// # Errors
    /// - `Error::TransactionNotFound` if the row does not exist
    /// - `Error::MutabilityWindowElapsed` if the acting staff sender is too late
    /// - `Error::Forbidden` if the actor is neither an admin nor the staff sender
    #[tracing::instrument(skip(self, actor), fields(actor_id = actor.id))]
    pub async fn delete_transaction(
        &self,
        transaction_id: i64,
        actor: &user::Model,
        now: DateTime<Utc>,
    ) -> Result<transaction::Model> {
        let existing = get_transaction_by_id(&self.db, transaction_id)
            .await?
            .ok_or(Error::TransactionNotFound { id: transaction_id })?;
        authorize_deletion(&existing, actor, now)?;

        let guards = self
            .locks
            .acquire([existing.from_id, existing.to_id].into_iter().flatten())
            .await;
        let txn = self.db.begin().await?;

        // re-read under the lock: a concurrent delete may have won
        let row = Transaction::find_by_id(transaction_id)
            .one(&txn)
            .await?
            .ok_or(Error::TransactionNotFound { id: transaction_id })?;

        if let Some(sender) = find_user(&txn, row.from_id).await? {
            let materialized = materialize_balance(&sender, &self.policy, now);
            let is_staff = RoleSet::from_bits(sender.roles).has_role(Role::Staff);
            let credit = if !is_staff || window_covers(&materialized, row.date) {
                row.amount
            } else {
                tracing::debug!(
                    sender_id = sender.id,
                    "allowance window has rolled over, sender not credited"
                );
                0.0
            };
            store_balance(
                &txn,
                sender,
                materialized.balance + credit,
                materialized.balance_expires,
            )
            .await?;
        }

        if let Some(recipient) = find_user(&txn, row.to_id).await? {
            let materialized = materialize_balance(&recipient, &self.policy, now);
            store_balance(
                &txn,
                recipient,
                materialized.balance - row.amount,
                materialized.balance_expires,
            )
            .await?;
        }

        Transaction::delete_by_id(row.id).exec(&txn).await?;
        txn.commit().await?;
        drop(guards);

        tracing::info!(transaction_id, "transaction deleted");
        Ok(row)
    }

    /// Returns the user with their allowance materialized, writing it back if stale.
    ///
    /// # Errors
    /// Returns `Error::UserNotFound` if the user does not exist.
    pub async fn current_user(&self, user_id: i64, now: DateTime<Utc>) -> Result<user::Model> {
        let _guards = self.locks.acquire([user_id]).await;

        let user = match load_user(&self.db, user_id).await {
            Err(e @ Error::UserNotFound { .. }) => {
                self.locks.forget(user_id);
                return Err(e);
            }
            loaded => loaded?,
        };
        let materialized = materialize_balance(&user, &self.policy, now);
        if !materialized.mutated {
            return Ok(user);
        }

        tracing::debug!(user_id, balance = materialized.balance, "weekly allowance reset");
        store_balance(
            &self.db,
            user,
            materialized.balance,
            materialized.balance_expires,
        )
        .await
    }

    /// Current balance of a user, weekly allowance included.
    ///
    /// # Errors
    /// Returns `Error::UserNotFound` if the user does not exist, or
    /// `Error::Database` if the allowance reset cannot be stored.
    pub async fn get_balance(&self, user_id: i64, now: DateTime<Utc>) -> Result<f64> {
        Ok(self.current_user(user_id, now).await?.balance)
    }

    /// Permanently removes a user. Their transactions stay, keeping the numeric id.
    ///
    /// # Errors
    /// Returns `Error::UserNotFound` if the user does not exist.
    #[tracing::instrument(skip(self))]
    pub async fn suspend_user(&self, user_id: i64) -> Result<()> {
        let _guards = self.locks.acquire([user_id]).await;

        let result = User::delete_by_id(user_id).exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(Error::UserNotFound {
                id: user_id.to_string(),
            });
        }

        self.locks.forget(user_id);
        tracing::info!(user_id, "user suspended");
        Ok(())
    }
}

fn check_parties(new: &NewTransaction) -> Result<()> {
    if new.to.is_empty() {
        return Err(Error::InvalidRecipient {
            reason: "at least one recipient is required".to_string(),
        });
    }

    if let Some(sender_id) = new.from.user_id() {
        if new.to.iter().any(|p| p.user_id() == Some(sender_id)) {
            return Err(Error::InvalidRecipient {
                reason: "the sender cannot also be a recipient".to_string(),
            });
        }
    }

    let blank_label = std::iter::once(&new.from)
        .chain(&new.to)
        .any(|p| matches!(p, Party::Label(text) if text.trim().is_empty()));
    if blank_label {
        return Err(Error::InvalidRecipient {
            reason: "labels must not be empty".to_string(),
        });
    }

    Ok(())
}

fn authorize_deletion(
    row: &transaction::Model,
    actor: &user::Model,
    now: DateTime<Utc>,
) -> Result<()> {
    let roles = RoleSet::from_bits(actor.roles);
    if roles.has_role(Role::Admin) {
        return Ok(());
    }

    if roles.has_role(Role::Staff) && row.from_id == Some(actor.id) {
        if now - row.date <= TimeDelta::hours(MUTABILITY_WINDOW_HOURS) {
            return Ok(());
        }
        return Err(Error::MutabilityWindowElapsed { id: row.id });
    }

    Err(Error::forbidden(
        "only an administrator or the sending staff member can delete a transaction",
    ))
}

/// Loads a user or fails with `Error::UserNotFound`.
pub(crate) async fn load_user<C>(db: &C, user_id: i64) -> Result<user::Model>
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

async fn find_user<C>(db: &C, user_id: Option<i64>) -> Result<Option<user::Model>>
where
    C: ConnectionTrait,
{
    match user_id {
        Some(id) => User::find_by_id(id).one(db).await.map_err(Into::into),
        None => Ok(None),
    }
}

/// Writes a rounded balance and allowance window back to the user row.
async fn store_balance<C>(
    db: &C,
    user: user::Model,
    balance: f64,
    balance_expires: Option<DateTime<Utc>>,
) -> Result<user::Model>
where
    C: ConnectionTrait,
{
    let mut active: user::ActiveModel = user.into();
    active.balance = Set(round_currency(balance));
    active.balance_expires = Set(balance_expires);
    active.update(db).await.map_err(Into::into)
}
