//! Interfaces to collaborators outside the ledger.
//!
//! Identity federation resolves external ids to users; notification sends
//! receipts. Both are consumed by the ledger but implemented elsewhere, so only
//! the traits and minimal implementations live here. The database-backed
//! directory is [`crate::core::user::DatabaseDirectory`].

use crate::{entities::transaction, errors::Result};
use async_trait::async_trait;
use std::collections::HashMap;

/// Resolves an external directory id (e.g. a Google account id) to a user id.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Returns the user id for `external_id`, if the directory knows it.
    ///
    /// # Errors
    /// Returns an error if the backing store cannot be read.
    async fn resolve(&self, external_id: &str) -> Result<Option<i64>>;
}

/// Receives a receipt for every committed transaction.
///
/// Called after the balance critical section has ended. Implementations must
/// not block; anything slow is spawned.
pub trait Notifier: Send + Sync {
    /// Hands off a receipt for `transaction`.
    fn send_receipt(&self, transaction: &transaction::Model);
}

/// Directory backed by a fixed map.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    entries: HashMap<String, i64>,
}

impl StaticDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a mapping.
    #[must_use]
    pub fn with_entry(mut self, external_id: impl Into<String>, user_id: i64) -> Self {
        self.entries.insert(external_id.into(), user_id);
        self
    }
}

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn resolve(&self, external_id: &str) -> Result<Option<i64>> {
        Ok(self.entries.get(external_id).copied())
    }
}

/// Notifier that only records receipts in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send_receipt(&self, transaction: &transaction::Model) {
        tracing::info!(
            transaction_id = transaction.id,
            amount = transaction.amount,
            from_id = ?transaction.from_id,
            to_id = ?transaction.to_id,
            "receipt"
        );
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use super::{Notifier, transaction};
    use std::sync::Mutex;

    /// Notifier that keeps the ids it was handed, for assertions.
    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        pub receipts: Mutex<Vec<i64>>,
    }

    impl Notifier for RecordingNotifier {
        fn send_receipt(&self, transaction: &transaction::Model) {
            if let Ok(mut receipts) = self.receipts.lock() {
                receipts.push(transaction.id);
            }
        }
    }
}
