//! Operation layer - framework-agnostic handlers over the ledger.
//!
//! Every handler takes the shared [`AppState`] and a [`Request`], runs the
//! gateway against its static policy, reads the validated input and returns a
//! typed view. [`respond`] turns any handler result into a JSON [`Response`].

/// Purchases, stores and their items
pub mod stores;
/// Transfers, deletion and history
pub mod transactions;
/// Sign-in, profiles and user administration
pub mod users;

use crate::{
    access::gateway::Request,
    config::settings::Settings,
    core::{ledger::Ledger, user::DatabaseDirectory},
    entities::user,
    errors::{Error, Result},
    external::UserDirectory,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// State shared by every handler.
pub struct AppState {
    /// The ledger and its database
    pub ledger: Ledger,
    /// Loaded configuration
    pub settings: Settings,
    /// Resolves signed-in identities to users
    pub directory: Arc<dyn UserDirectory>,
}

impl AppState {
    /// Creates the state, resolving identities against the ledger's users table.
    #[must_use]
    pub fn new(ledger: Ledger, settings: Settings) -> Self {
        let directory = Arc::new(DatabaseDirectory::new(ledger.database().clone()));
        Self {
            ledger,
            settings,
            directory,
        }
    }

    /// Replaces the identity directory.
    #[must_use]
    pub fn with_directory(mut self, directory: Arc<dyn UserDirectory>) -> Self {
        self.directory = directory;
        self
    }

    /// Resolves an external id to the current state of its user.
    ///
    /// An unknown id, or one whose user has been suspended, yields `None`.
    ///
    /// # Errors
    /// Returns an error if the directory or the database cannot be read.
    pub async fn identify(&self, external_id: &str) -> Result<Option<user::Model>> {
        let Some(user_id) = self.directory.resolve(external_id).await? else {
            return Ok(None);
        };

        match self.ledger.current_user(user_id, Utc::now()).await {
            Ok(user) => Ok(Some(user)),
            Err(Error::UserNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Builds a request acting as the user behind `external_id`, if any.
    pub async fn request_as(&self, external_id: &str) -> Result<Request> {
        let request = Request::new();
        Ok(match self.identify(external_id).await? {
            Some(user) => request.with_identity(user),
            None => request,
        })
    }
}

/// What a caller receives: a status and a JSON body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
    /// HTTP-equivalent status code
    pub status: u16,
    /// The view on success, an error envelope otherwise
    pub body: Value,
}

/// Converts a handler result into a response.
///
/// Errors become their client-facing [`crate::errors::ErrorResponse`]; internal
/// errors are logged under the correlation id included in the body.
pub fn respond<T: Serialize>(result: Result<T>) -> Response {
    let encoded = result.and_then(|view| serde_json::to_value(view).map_err(Error::from));

    match encoded {
        Ok(body) => Response { status: 200, body },
        Err(e) => {
            let error = e.into_response();
            Response {
                status: error.status,
                body: serde_json::to_value(&error).unwrap_or_default(),
            }
        }
    }
}
