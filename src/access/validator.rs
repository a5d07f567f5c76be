//! Composable field validators over untyped JSON input.
//!
//! A [`Validator`] checks an optional [`Value`] (absent and `null` both count as
//! absent) and either passes or returns a reason. Reasons carry a `{KEY}`
//! placeholder which the gateway replaces with `"<field> in <part>"`, so the same
//! validator can be declared on any number of fields.
//!
//! ```
//! use kitcoin_ledger::access::validator::{and, gt, is_number};
//! use serde_json::json;
//!
//! let positive = and([is_number(), gt(0.0)]);
//! assert!(positive.validate(Some(&json!(5))).is_ok());
//! assert_eq!(
//!     positive.validate(Some(&json!("x"))).unwrap_err(),
//!     "{KEY} must be a number\nAND {KEY} must be greater than 0"
//! );
//! ```

use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Placeholder substituted with the fully-qualified field name.
pub const KEY_PLACEHOLDER: &str = "{KEY}";

type Test = dyn Fn(Option<&Value>) -> bool + Send + Sync;

enum Rule {
    Check { test: Box<Test>, message: String },
    And(Vec<Validator>),
    Or(Vec<Validator>),
    Not(Validator),
    Optional(Validator),
}

/// A reusable validation rule.
#[derive(Clone)]
pub struct Validator {
    rule: Arc<Rule>,
    status: Option<u16>,
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("message", &self.message())
            .field("status", &self.status)
            .finish()
    }
}

impl Validator {
    /// Builds a leaf validator from a predicate and its failure message.
    pub fn new<F>(message: impl Into<String>, test: F) -> Self
    where
        F: Fn(Option<&Value>) -> bool + Send + Sync + 'static,
    {
        Self::from_rule(Rule::Check {
            test: Box::new(test),
            message: message.into(),
        })
    }

    fn from_rule(rule: Rule) -> Self {
        Self {
            rule: Arc::new(rule),
            status: None,
        }
    }

    /// Reports failures of this validator with `status` instead of 400.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Status override, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    /// Runs the validator.
    ///
    /// # Errors
    /// Returns the failure reason, still containing `{KEY}` placeholders.
    pub fn validate(&self, value: Option<&Value>) -> Result<(), String> {
        match &*self.rule {
            Rule::Check { test, message } => {
                if test(value) {
                    Ok(())
                } else {
                    Err(message.clone())
                }
            }
            Rule::And(validators) => {
                // every branch runs so that all reasons surface
                let failures: Vec<String> = validators
                    .iter()
                    .filter_map(|v| v.validate(value).err())
                    .collect();
                if failures.is_empty() {
                    Ok(())
                } else {
                    Err(join_distinct(failures, "\nAND "))
                }
            }
            Rule::Or(validators) => {
                let results: Vec<Result<(), String>> =
                    validators.iter().map(|v| v.validate(value)).collect();
                if results.iter().any(Result::is_ok) {
                    Ok(())
                } else {
                    Err(join_distinct(
                        results.into_iter().filter_map(Result::err).collect(),
                        "\nOR ",
                    ))
                }
            }
            Rule::Not(inner) => match inner.validate(value) {
                Ok(()) => Err(format!("NOT {}", inner.message())),
                Err(_) => Ok(()),
            },
            Rule::Optional(inner) => {
                if is_absent(value) {
                    Ok(())
                } else {
                    inner.validate(value).map_err(|e| format!("OPTIONAL {e}"))
                }
            }
        }
    }

    /// Describes what the validator requires, independent of any input.
    #[must_use]
    pub fn message(&self) -> String {
        match &*self.rule {
            Rule::Check { message, .. } => message.clone(),
            Rule::And(validators) => {
                join_distinct(validators.iter().map(Self::message).collect(), "\nAND ")
            }
            Rule::Or(validators) => {
                join_distinct(validators.iter().map(Self::message).collect(), "\nOR ")
            }
            Rule::Not(inner) => format!("NOT {}", inner.message()),
            Rule::Optional(inner) => format!("OPTIONAL {}", inner.message()),
        }
    }
}

fn join_distinct(reasons: Vec<String>, separator: &str) -> String {
    let mut distinct: Vec<String> = Vec::with_capacity(reasons.len());
    for reason in reasons {
        if !distinct.contains(&reason) {
            distinct.push(reason);
        }
    }
    distinct.join(separator)
}

fn is_absent(value: Option<&Value>) -> bool {
    value.is_none_or(Value::is_null)
}

/// Reads a number, or a string that parses as one.
#[must_use]
pub fn coerce_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
        }
        _ => None,
    }
}

/// Replaces the `{KEY}` placeholder with `"<field> in <part>"`.
#[must_use]
pub fn substitute_key(message: &str, field: &str, part: &str) -> String {
    message.replace(KEY_PLACEHOLDER, &format!("{field} in {part}"))
}

/// Passes when the value is present and not `null`.
#[must_use]
pub fn exists() -> Validator {
    Validator::new("{KEY} is required", |v| !is_absent(v))
}

/// Passes on JSON strings.
#[must_use]
pub fn is_string() -> Validator {
    Validator::new("{KEY} must be a string", |v| matches!(v, Some(Value::String(_))))
}

/// Passes on JSON numbers.
#[must_use]
pub fn is_number() -> Validator {
    Validator::new("{KEY} must be a number", |v| matches!(v, Some(Value::Number(_))))
}

/// Passes on JSON booleans.
#[must_use]
pub fn is_boolean() -> Validator {
    Validator::new("{KEY} must be a boolean", |v| matches!(v, Some(Value::Bool(_))))
}

/// Passes on JSON arrays.
#[must_use]
pub fn is_array() -> Validator {
    Validator::new("{KEY} must be an array", |v| matches!(v, Some(Value::Array(_))))
}

/// Passes on strings that parse as a finite number.
#[must_use]
pub fn is_numeric_string() -> Validator {
    Validator::new("{KEY} must be a numeric string", |v| {
        matches!(v, Some(Value::String(_))) && coerce_number(v).is_some()
    })
}

/// Passes on whole numbers, given as numbers or numeric strings.
#[must_use]
pub fn is_integer() -> Validator {
    Validator::new("{KEY} must be an integer", |v| {
        coerce_number(v).is_some_and(|n| n.fract() == 0.0)
    })
}

fn compare(description: &str, threshold: f64, op: fn(f64, f64) -> bool) -> Validator {
    Validator::new(format!("{{KEY}} must be {description} {threshold}"), move |v| {
        coerce_number(v).is_some_and(|n| op(n, threshold))
    })
}

/// Passes on numbers (or numeric strings) greater than `threshold`.
#[must_use]
pub fn gt(threshold: f64) -> Validator {
    compare("greater than", threshold, |n, t| n > t)
}

/// Passes on numbers (or numeric strings) less than `threshold`.
#[must_use]
pub fn lt(threshold: f64) -> Validator {
    compare("less than", threshold, |n, t| n < t)
}

/// Passes on numbers (or numeric strings) equal to `threshold`.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn eq(threshold: f64) -> Validator {
    compare("equal to", threshold, |n, t| n == t)
}

/// Passes on numbers (or numeric strings) greater than or equal to `threshold`.
#[must_use]
pub fn gte(threshold: f64) -> Validator {
    compare("greater than or equal to", threshold, |n, t| n >= t)
}

/// Passes on numbers (or numeric strings) less than or equal to `threshold`.
#[must_use]
pub fn lte(threshold: f64) -> Validator {
    compare("less than or equal to", threshold, |n, t| n <= t)
}

/// Passes when the value equals `expected` exactly.
#[must_use]
pub fn equals_literal(expected: Value) -> Validator {
    Validator::new(format!("{{KEY}} must equal {expected}"), move |v| {
        v == Some(&expected)
    })
}

/// Passes when the value equals one of `allowed`.
#[must_use]
pub fn one_of(allowed: Vec<Value>) -> Validator {
    let listed = allowed
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    Validator::new(format!("{{KEY}} must be one of {listed}"), move |v| {
        v.is_some_and(|value| allowed.contains(value))
    })
}

/// Passes on strings matching `pattern`.
#[must_use]
pub fn matches(pattern: Regex) -> Validator {
    Validator::new(format!("{{KEY}} must match /{pattern}/"), move |v| {
        matches!(v, Some(Value::String(s)) if pattern.is_match(s))
    })
}

/// Passes on arrays whose every element passes `inner`.
#[must_use]
pub fn each(inner: Validator) -> Validator {
    let message = format!("{{KEY}} must be an array where each element: {}", inner.message());
    Validator::new(message, move |v| match v {
        Some(Value::Array(items)) => items.iter().all(|item| inner.validate(Some(item)).is_ok()),
        _ => false,
    })
}

/// Passes only if every validator passes.
pub fn and(validators: impl IntoIterator<Item = Validator>) -> Validator {
    Validator::from_rule(Rule::And(validators.into_iter().collect()))
}

/// Passes if any validator passes. An empty list never passes.
pub fn or(validators: impl IntoIterator<Item = Validator>) -> Validator {
    Validator::from_rule(Rule::Or(validators.into_iter().collect()))
}

/// Passes iff `inner` fails.
#[must_use]
pub fn not(inner: Validator) -> Validator {
    Validator::from_rule(Rule::Not(inner))
}

/// Passes on absent values, otherwise defers to `inner`.
#[must_use]
pub fn optional(inner: Validator) -> Validator {
    Validator::from_rule(Rule::Optional(inner))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use serde_json::json;

    fn check(validator: &Validator, value: &Value) -> Result<(), String> {
        validator.validate(Some(value))
    }

    #[test]
    fn test_primitives() {
        assert!(check(&is_string(), &json!("a")).is_ok());
        assert!(check(&is_string(), &json!(1)).is_err());
        assert!(check(&is_number(), &json!(1.5)).is_ok());
        assert!(check(&is_number(), &json!("1.5")).is_err());
        assert!(check(&is_boolean(), &json!(false)).is_ok());
        assert!(check(&is_array(), &json!([1, 2])).is_ok());
        assert!(check(&is_numeric_string(), &json!("12.5")).is_ok());
        assert!(check(&is_numeric_string(), &json!(" ")).is_err());
        assert!(check(&is_numeric_string(), &json!(12)).is_err());
    }

    #[test]
    fn test_integer_coerces_strings() {
        assert!(check(&is_integer(), &json!(4)).is_ok());
        assert!(check(&is_integer(), &json!("4")).is_ok());
        assert!(check(&is_integer(), &json!(4.5)).is_err());
        assert!(check(&is_integer(), &json!("four")).is_err());
        assert!(is_integer().validate(None).is_err());
    }

    #[test]
    fn test_comparisons_coerce_numeric_strings() {
        assert!(check(&gt(0.0), &json!("0.01")).is_ok());
        assert!(check(&gt(0.0), &json!(0)).is_err());
        assert!(check(&gte(1.0), &json!(1)).is_ok());
        assert!(check(&lt(10.0), &json!("9")).is_ok());
        assert!(check(&lte(10.0), &json!(10.5)).is_err());
        assert!(check(&eq(3.0), &json!("3")).is_ok());
        assert!(check(&gt(0.0), &json!(true)).is_err());
        assert_eq!(
            check(&gte(1.0), &json!(0)).unwrap_err(),
            "{KEY} must be greater than or equal to 1"
        );
    }

    #[test]
    fn test_literals_and_enums() {
        assert!(check(&equals_literal(json!("yes")), &json!("yes")).is_ok());
        assert!(check(&equals_literal(json!("yes")), &json!("no")).is_err());

        let direction = one_of(vec![json!("asc"), json!("desc")]);
        assert!(check(&direction, &json!("desc")).is_ok());
        assert_eq!(
            check(&direction, &json!("up")).unwrap_err(),
            "{KEY} must be one of \"asc\", \"desc\""
        );
    }

    #[test]
    fn test_regex() {
        let hex = matches(Regex::new("^[0-9a-f]+$").unwrap());
        assert!(check(&hex, &json!("beef")).is_ok());
        assert!(check(&hex, &json!("xyz")).is_err());
        assert!(check(&hex, &json!(12)).is_err());
    }

    #[test]
    fn test_and_reports_all_failures() {
        let validator = and([is_string(), gt(0.0)]);
        assert_eq!(
            check(&validator, &json!(true)).unwrap_err(),
            "{KEY} must be a string\nAND {KEY} must be greater than 0"
        );
        assert!(check(&and([is_number(), gt(0.0)]), &json!(3)).is_ok());
        // only the failing branch is reported
        assert_eq!(
            check(&and([is_number(), gt(0.0)]), &json!(-3)).unwrap_err(),
            "{KEY} must be greater than 0"
        );
    }

    #[test]
    fn test_or_passes_on_any() {
        let validator = or([is_number(), is_numeric_string()]);
        assert!(check(&validator, &json!(3)).is_ok());
        assert!(check(&validator, &json!("3")).is_ok());
        assert_eq!(
            check(&validator, &json!([])).unwrap_err(),
            "{KEY} must be a number\nOR {KEY} must be a numeric string"
        );
        assert!(or([]).validate(Some(&json!(1))).is_err());
    }

    #[test]
    fn test_duplicate_reasons_collapse() {
        let validator = and([is_string(), is_string(), gt(1.0)]);
        assert_eq!(
            check(&validator, &json!(null)).unwrap_err(),
            "{KEY} must be a string\nAND {KEY} must be greater than 1"
        );
    }

    #[test]
    fn test_not() {
        let validator = not(is_string());
        assert!(check(&validator, &json!(1)).is_ok());
        assert_eq!(
            check(&validator, &json!("a")).unwrap_err(),
            "NOT {KEY} must be a string"
        );
    }

    #[test]
    fn test_optional() {
        let validator = optional(and([is_number(), gt(0.0)]));
        assert!(validator.validate(None).is_ok());
        assert!(check(&validator, &Value::Null).is_ok());
        assert!(check(&validator, &json!(2)).is_ok());
        assert_eq!(
            check(&validator, &json!(-2)).unwrap_err(),
            "OPTIONAL {KEY} must be greater than 0"
        );
    }

    #[test]
    fn test_exists() {
        assert!(exists().validate(None).is_err());
        assert!(check(&exists(), &Value::Null).is_err());
        assert!(check(&exists(), &json!(0)).is_ok());
    }

    #[test]
    fn test_each() {
        let ids = each(is_integer());
        assert!(check(&ids, &json!([1, "2"])).is_ok());
        assert!(check(&ids, &json!([1, "two"])).is_err());
        assert!(check(&ids, &json!(1)).is_err());
    }

    #[test]
    fn test_substitute_key() {
        let message = check(&is_string(), &json!(1)).unwrap_err();
        assert_eq!(
            substitute_key(&message, "reason", "body"),
            "reason in body must be a string"
        );
    }

    #[test]
    fn test_status_override_survives_clone() {
        let validator = exists().with_status(404);
        assert_eq!(validator.clone().status(), Some(404));
        assert_eq!(exists().status(), None);
    }
}
