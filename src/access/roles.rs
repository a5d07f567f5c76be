//! Role model - a single integer read as a set of named roles.
//!
//! The stored representation is a bitfield (`STUDENT = 1 << 1`, `STAFF = 1 << 2`,
//! `ADMIN = 1 << 3`). Call sites never touch the integer: they go through
//! [`RoleSet`] and its named operations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An assignable role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    /// Earns and spends points
    Student,
    /// Issues transfers, manages stores, receives a weekly allowance
    Staff,
    /// Audits the ledger and manages users
    Admin,
}

impl Role {
    /// Every assignable role, in canonical order.
    pub const ALL: [Self; 3] = [Self::Student, Self::Staff, Self::Admin];

    /// Bit this role occupies in a [`RoleSet`].
    #[must_use]
    pub const fn bits(self) -> i32 {
        match self {
            Self::Student => 1 << 1,
            Self::Staff => 1 << 2,
            Self::Admin => 1 << 3,
        }
    }

    /// Canonical role name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Student => "STUDENT",
            Self::Staff => "STAFF",
            Self::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.name() == s)
            .ok_or_else(|| format!("unknown role '{s}'"))
    }
}

/// A set of roles backed by the stored bitfield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RoleSet(i32);

impl RoleSet {
    /// No roles at all.
    pub const NONE: Self = Self(0);
    /// Union of every assignable role; used for "no restriction" checks.
    pub const ALL: Self = Self(Role::Student.bits() | Role::Staff.bits() | Role::Admin.bits());
    /// Role given to newly created users.
    pub const DEFAULT: Self = Self(Role::Student.bits());

    /// Reads a stored bitfield. Bits outside [`RoleSet::ALL`] are dropped.
    #[must_use]
    pub const fn from_bits(bits: i32) -> Self {
        Self(bits & Self::ALL.0)
    }

    /// The bitfield to store.
    #[must_use]
    pub const fn bits(self) -> i32 {
        self.0
    }

    /// Builds a set from role names. Unknown names are silently dropped, so
    /// callers validate with [`is_valid_roles`] first.
    #[must_use]
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        names
            .iter()
            .filter_map(|name| name.as_ref().parse::<Role>().ok())
            .collect()
    }

    /// True if `role` is in the set.
    #[must_use]
    pub const fn has_role(self, role: Role) -> bool {
        self.0 & role.bits() == role.bits()
    }

    /// True if at least one of `roles` is in the set.
    #[must_use]
    pub fn has_any_role(self, roles: &[Role]) -> bool {
        roles.iter().any(|role| self.has_role(*role))
    }

    /// True if every one of `roles` is in the set.
    #[must_use]
    pub fn has_all_roles(self, roles: &[Role]) -> bool {
        roles.iter().all(|role| self.has_role(*role))
    }

    /// True if every role of `other` is also in this set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set union.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// True if no role is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Roles in canonical order.
    pub fn roles(self) -> impl Iterator<Item = Role> {
        Role::ALL.into_iter().filter(move |role| self.has_role(*role))
    }

    /// Role names in canonical order, as exposed by API views.
    #[must_use]
    pub fn names(self) -> Vec<&'static str> {
        self.roles().map(Role::name).collect()
    }
}

impl From<Role> for RoleSet {
    fn from(role: Role) -> Self {
        Self(role.bits())
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::NONE, |set, role| set.union(role.into()))
    }
}

/// True if `name` is exactly an assignable role name.
#[must_use]
pub fn is_valid_role(name: &str) -> bool {
    name.parse::<Role>().is_ok()
}

/// True if every name is an assignable role name.
#[must_use]
pub fn is_valid_roles<S: AsRef<str>>(names: &[S]) -> bool {
    names.iter().all(|name| is_valid_role(name.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_roles_then_has_role() {
        for role in Role::ALL {
            let set = RoleSet::from_names(&[role.name()]);
            assert!(set.has_role(role), "{role} missing from its own set");
        }
    }

    #[test]
    fn test_bit_values_are_fixed() {
        assert_eq!(RoleSet::NONE.bits(), 0);
        assert_eq!(Role::Student.bits(), 2);
        assert_eq!(Role::Staff.bits(), 4);
        assert_eq!(Role::Admin.bits(), 8);
        assert_eq!(RoleSet::ALL.bits(), 14);
        assert_eq!(RoleSet::DEFAULT, RoleSet::from(Role::Student));
    }

    #[test]
    fn test_from_names_drops_unknown() {
        let set = RoleSet::from_names(&["STAFF", "WIZARD", "admin", "ADMIN"]);
        assert!(set.has_role(Role::Staff));
        assert!(set.has_role(Role::Admin));
        assert!(!set.has_role(Role::Student));
        assert_eq!(set.names(), vec!["STAFF", "ADMIN"]);
    }

    #[test]
    fn test_sentinels_are_not_assignable() {
        assert!(!is_valid_role("NONE"));
        assert!(!is_valid_role("ALL"));
        assert_eq!(RoleSet::from_names(&["NONE", "ALL"]), RoleSet::NONE);
    }

    #[test]
    fn test_any_and_all() {
        let staff = RoleSet::from(Role::Staff);
        assert!(staff.has_any_role(&[Role::Staff, Role::Admin]));
        assert!(!staff.has_all_roles(&[Role::Staff, Role::Admin]));
        assert!(!staff.has_any_role(&[]));
        assert!(staff.has_all_roles(&[]));

        assert!(RoleSet::ALL.has_all_roles(&Role::ALL));
        assert!(RoleSet::ALL.contains(staff));
        assert!(!staff.contains(RoleSet::ALL));
    }

    #[test]
    fn test_from_bits_masks_unknown_bits() {
        let set = RoleSet::from_bits(1 | Role::Admin.bits() | (1 << 10));
        assert_eq!(set, RoleSet::from(Role::Admin));
        assert!(RoleSet::from_bits(0).is_empty());
    }

    #[test]
    fn test_is_valid_roles() {
        assert!(is_valid_roles(&["STUDENT", "STAFF"]));
        assert!(!is_valid_roles(&["STUDENT", "student"]));
        assert!(is_valid_roles::<&str>(&[]));
    }
}
