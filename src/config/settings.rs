//! Ledger settings loading from config.toml
//!
//! The weekly allowance and the day the week starts on are fixed per deployment.
//! `[[admins]]` entries grant roles to known people the first time they sign in.
//!
//! ```toml
//! [ledger]
//! weekly_allowance = 100.0
//! week_start = "Sunday"
//!
//! [[admins]]
//! name = "Front Office"
//! google_id = "1234"
//! roles = ["STAFF", "ADMIN"]
//! ```

use crate::access::roles::{RoleSet, is_valid_roles};
use crate::errors::{Error, Result};
use chrono::Weekday;
use serde::Deserialize;
use std::path::Path;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Ledger policy
    pub ledger: LedgerSettings,
    /// People who get roles beyond `STUDENT` on first sign-in
    #[serde(default)]
    pub admins: Vec<AdminSeed>,
}

/// Weekly allowance policy for staff balances
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerSettings {
    /// Balance a staff member starts each week with, before their multiplier
    pub weekly_allowance: f64,
    /// Day the allowance week starts on (UTC)
    #[serde(default = "default_week_start")]
    pub week_start: Weekday,
}

/// A seeded privileged user
#[derive(Debug, Clone, Deserialize)]
pub struct AdminSeed {
    /// Display name
    pub name: String,
    /// Contact address
    #[serde(default)]
    pub email: Option<String>,
    /// External directory id matched on sign-in
    pub google_id: String,
    /// Role names to grant
    #[serde(default = "default_admin_roles")]
    pub roles: Vec<String>,
}

const fn default_week_start() -> Weekday {
    Weekday::Sun
}

fn default_admin_roles() -> Vec<String> {
    vec!["STAFF".to_string(), "ADMIN".to_string()]
}

impl AdminSeed {
    /// Roles this seed grants.
    #[must_use]
    pub fn role_set(&self) -> RoleSet {
        RoleSet::from_names(&self.roles)
    }
}

impl Settings {
    /// Checks values serde cannot check on its own.
    ///
    /// # Errors
    /// Returns `Error::Config` for a negative or non-finite allowance or an unknown role name.
    pub fn validate(&self) -> Result<()> {
        let allowance = self.ledger.weekly_allowance;
        if !allowance.is_finite() || allowance < 0.0 {
            return Err(Error::Config {
                message: format!("weekly_allowance must be a non-negative number, got {allowance}"),
            });
        }

        for admin in &self.admins {
            if !is_valid_roles(&admin.roles) || admin.roles.is_empty() {
                return Err(Error::Config {
                    message: format!("invalid roles for admin '{}': {:?}", admin.name, admin.roles),
                });
            }
        }

        Ok(())
    }

    /// Finds the seed entry for an external id.
    #[must_use]
    pub fn admin_for(&self, google_id: &str) -> Option<&AdminSeed> {
        self.admins.iter().find(|admin| admin.google_id == google_id)
    }
}

/// Parses and validates settings from TOML text.
///
/// # Errors
/// Returns `Error::Config` if the TOML is malformed or fails [`Settings::validate`].
pub fn parse_settings(contents: &str) -> Result<Settings> {
    let settings: Settings = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })?;
    settings.validate()?;
    Ok(settings)
}

/// Loads settings from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - Required fields are missing or out of range
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path_ref = path.as_ref();
    tracing::debug!("Attempting to load configuration from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path_ref.display()),
    })?;
    parse_settings(&contents)
}

/// Loads settings from `KITCOIN_CONFIG`, or ./config.toml when it is unset
pub fn load_default_settings() -> Result<Settings> {
    let path = std::env::var("KITCOIN_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    load_settings(path)
}
