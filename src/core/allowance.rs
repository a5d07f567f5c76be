//! Weekly allowance business logic
//!
//! Staff balances are a weekly budget: at the start of each week the balance is
//! reset to `weekly_allowance * weekly_multiplier`. The reset is lazy. Nothing runs
//! on a schedule; instead every read or write of a balance first passes the stored
//! user through [`materialize_balance`], which reports the balance as it should be
//! right now and whether the stored row is stale.

use crate::{
    access::roles::{Role, RoleSet},
    config::settings::LedgerSettings,
    entities::user,
};
use chrono::{DateTime, Datelike, Days, NaiveTime, TimeDelta, Utc, Weekday};

/// Policy parameters for the weekly staff reset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AllowancePolicy {
    /// Base weekly balance for staff
    pub weekly_allowance: f64,
    /// Day each allowance week starts on, at 00:00 UTC
    pub week_start: Weekday,
}

impl From<&LedgerSettings> for AllowancePolicy {
    fn from(settings: &LedgerSettings) -> Self {
        Self {
            weekly_allowance: settings.weekly_allowance,
            week_start: settings.week_start,
        }
    }
}

/// A user's balance after applying the weekly reset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Materialized {
    /// Balance as of `now`
    pub balance: f64,
    /// End of the allowance window as of `now`
    pub balance_expires: Option<DateTime<Utc>>,
    /// True if the stored row differs and must be written back
    pub mutated: bool,
}

/// Rounds a currency value to 2 decimal places.
#[must_use]
pub fn round_currency(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// The instant the week containing `now` ends, i.e. the next `week_start` at 00:00 UTC.
#[must_use]
pub fn end_of_week(now: DateTime<Utc>, week_start: Weekday) -> DateTime<Utc> {
    let today = now.date_naive();
    let days_into_week =
        (7 + today.weekday().num_days_from_monday() - week_start.num_days_from_monday()) % 7;
    let next_start = today - Days::new(u64::from(days_into_week)) + Days::new(7);
    next_start.and_time(NaiveTime::MIN).and_utc()
}

/// First instant covered by the allowance window ending at `expires`.
#[must_use]
pub fn window_start(expires: DateTime<Utc>) -> DateTime<Utc> {
    expires - TimeDelta::days(7)
}

/// Computes the balance a user has at `now`.
///
/// Only staff are subject to the reset. A staff balance whose window is unset or
/// has ended becomes `weekly_allowance * weekly_multiplier` with a window ending at
/// the end of the current week; within the same week the result is unchanged, so
/// repeated calls never reset twice.
#[must_use]
pub fn materialize_balance(
    user: &user::Model,
    policy: &AllowancePolicy,
    now: DateTime<Utc>,
) -> Materialized {
    let unchanged = Materialized {
        balance: user.balance,
        balance_expires: user.balance_expires,
        mutated: false,
    };

    if !RoleSet::from_bits(user.roles).has_role(Role::Staff) {
        return unchanged;
    }

    match user.balance_expires {
        Some(expires) if expires > now => unchanged,
        _ => Materialized {
            balance: round_currency(policy.weekly_allowance * user.weekly_multiplier),
            balance_expires: Some(end_of_week(now, policy.week_start)),
            mutated: true,
        },
    }
}

/// True if a staff member's current window still covers `date`.
///
/// Used when a transaction is reversed: credit from an earlier week would
/// otherwise be added on top of a fresh allowance.
#[must_use]
pub fn window_covers(materialized: &Materialized, date: DateTime<Utc>) -> bool {
    materialized
        .balance_expires
        .is_some_and(|expires| date >= window_start(expires) && date < expires)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::user_model;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    const POLICY: AllowancePolicy = AllowancePolicy {
        weekly_allowance: 100.0,
        week_start: Weekday::Sun,
    };

    #[test]
    fn test_round_currency() {
        assert_eq!(round_currency(0.1 + 0.2), 0.3);
        assert_eq!(round_currency(10.005_1), 10.01);
        assert_eq!(round_currency(-2.499), -2.5);
    }

    #[test]
    fn test_end_of_week_sunday_start() {
        // 2024-03-13 is a Wednesday
        assert_eq!(end_of_week(at(2024, 3, 13, 15), Weekday::Sun), at(2024, 3, 17, 0));
        // on the start day itself the week runs to the next start day
        assert_eq!(end_of_week(at(2024, 3, 17, 0), Weekday::Sun), at(2024, 3, 24, 0));
        // Saturday night is still the same week
        assert_eq!(end_of_week(at(2024, 3, 16, 23), Weekday::Sun), at(2024, 3, 17, 0));
    }

    #[test]
    fn test_end_of_week_monday_start() {
        assert_eq!(end_of_week(at(2024, 3, 13, 15), Weekday::Mon), at(2024, 3, 18, 0));
        assert_eq!(end_of_week(at(2024, 3, 17, 9), Weekday::Mon), at(2024, 3, 18, 0));
        assert_eq!(end_of_week(at(2024, 3, 18, 0), Weekday::Mon), at(2024, 3, 25, 0));
    }

    #[test]
    fn test_students_are_never_reset() {
        let mut student = user_model(1, RoleSet::from(Role::Student));
        student.balance = 12.5;

        let result = materialize_balance(&student, &POLICY, at(2024, 3, 13, 15));
        assert!(!result.mutated);
        assert_eq!(result.balance, 12.5);
        assert!(result.balance_expires.is_none());
    }

    #[test]
    fn test_expired_staff_balance_resets() {
        let mut staff = user_model(1, RoleSet::from(Role::Staff));
        staff.balance = 3.0;
        staff.weekly_multiplier = 1.5;
        staff.balance_expires = Some(at(2024, 3, 10, 0));

        let now = at(2024, 3, 13, 15);
        let result = materialize_balance(&staff, &POLICY, now);
        assert!(result.mutated);
        assert_eq!(result.balance, 150.0);
        assert_eq!(result.balance_expires, Some(at(2024, 3, 17, 0)));
    }

    #[test]
    fn test_missing_expiry_resets() {
        let staff = user_model(1, RoleSet::from(Role::Staff));
        let result = materialize_balance(&staff, &POLICY, at(2024, 3, 13, 15));
        assert!(result.mutated);
        assert_eq!(result.balance, 100.0);
    }

    #[test]
    fn test_reset_is_idempotent_within_week() {
        let staff = user_model(1, RoleSet::from(Role::Staff));
        let first = materialize_balance(&staff, &POLICY, at(2024, 3, 13, 15));

        let mut stored = staff;
        stored.balance = first.balance - 40.0;
        stored.balance_expires = first.balance_expires;

        let second = materialize_balance(&stored, &POLICY, at(2024, 3, 16, 23));
        assert!(!second.mutated);
        assert_eq!(second.balance, 60.0);
    }

    #[test]
    fn test_expiry_instant_counts_as_expired() {
        let mut staff = user_model(1, RoleSet::from(Role::Staff));
        staff.balance_expires = Some(at(2024, 3, 17, 0));
        staff.balance = 1.0;

        let result = materialize_balance(&staff, &POLICY, at(2024, 3, 17, 0));
        assert!(result.mutated);
        assert_eq!(result.balance_expires, Some(at(2024, 3, 24, 0)));
    }

    #[test]
    fn test_window_covers() {
        let materialized = Materialized {
            balance: 0.0,
            balance_expires: Some(at(2024, 3, 17, 0)),
            mutated: false,
        };
        assert!(window_covers(&materialized, at(2024, 3, 10, 0)));
        assert!(window_covers(&materialized, at(2024, 3, 16, 23)));
        assert!(!window_covers(&materialized, at(2024, 3, 9, 23)));

        let unset = Materialized {
            balance_expires: None,
            ..materialized
        };
        assert!(!window_covers(&unset, at(2024, 3, 12, 0)));
    }
}
