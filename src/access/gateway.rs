//! Access gateway - decides whether a request may reach an operation.
//!
//! Each operation declares a static [`Policy`]. [`authorize`] checks it in a fixed
//! order: authentication, then roles, then every declared field validator in
//! declaration order. The first failure rejects the request.

use crate::{
    access::{
        roles::{Role, RoleSet},
        validator::{Validator, coerce_number, substitute_key},
    },
    entities::user,
    errors::{Error, Result},
};
use serde_json::{Map, Value};
use std::fmt;

/// Where in the request a field lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Part {
    /// Path parameters
    Params,
    /// Query string
    Query,
    /// Request body
    Body,
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Params => "params",
            Self::Query => "query",
            Self::Body => "body",
        })
    }
}

/// An inbound operation: who is asking, and the raw input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request {
    /// Signed-in user, if any
    pub identity: Option<user::Model>,
    /// Path parameters
    pub params: Map<String, Value>,
    /// Query string values
    pub query: Map<String, Value>,
    /// Body fields
    pub body: Map<String, Value>,
}

impl Request {
    /// An anonymous request with no input.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches the signed-in user.
    #[must_use]
    pub fn with_identity(mut self, user: user::Model) -> Self {
        self.identity = Some(user);
        self
    }

    /// Sets one input field.
    #[must_use]
    pub fn with(mut self, part: Part, field: &str, value: impl Into<Value>) -> Self {
        self.part_mut(part).insert(field.to_string(), value.into());
        self
    }

    /// Replaces the body with a JSON object. Non-object values leave it empty.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = match body {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self
    }

    /// All fields of one part.
    #[must_use]
    pub const fn part(&self, part: Part) -> &Map<String, Value> {
        match part {
            Part::Params => &self.params,
            Part::Query => &self.query,
            Part::Body => &self.body,
        }
    }

    fn part_mut(&mut self, part: Part) -> &mut Map<String, Value> {
        match part {
            Part::Params => &mut self.params,
            Part::Query => &mut self.query,
            Part::Body => &mut self.body,
        }
    }

    /// Raw value of a field; `null` reads as absent.
    #[must_use]
    pub fn value(&self, part: Part, field: &str) -> Option<&Value> {
        self.part(part).get(field).filter(|v| !v.is_null())
    }

    /// A whole number, accepting numeric strings.
    ///
    /// # Errors
    /// Returns `Error::BadRequest` if the field is absent or not a whole number.
    pub fn integer(&self, part: Part, field: &str) -> Result<i64> {
        self.optional_integer(part, field)?
            .ok_or_else(|| missing(part, field))
    }

    /// Like [`Request::integer`], but absent is `None`.
    ///
    /// # Errors
    /// Returns `Error::BadRequest` if the field is present but not a whole number.
    #[allow(clippy::cast_possible_truncation)]
    pub fn optional_integer(&self, part: Part, field: &str) -> Result<Option<i64>> {
        let Some(value) = self.value(part, field) else {
            return Ok(None);
        };
        coerce_number(Some(value))
            .filter(|n| n.fract() == 0.0 && n.abs() < 9.0e15)
            .map(|n| Some(n as i64))
            .ok_or_else(|| Error::bad_request(format!("{field} in {part} must be an integer")))
    }

    /// A number, accepting numeric strings.
    ///
    /// # Errors
    /// Returns `Error::BadRequest` if the field is absent or not a number.
    pub fn number(&self, part: Part, field: &str) -> Result<f64> {
        let value = self.value(part, field).ok_or_else(|| missing(part, field))?;
        coerce_number(Some(value))
            .ok_or_else(|| Error::bad_request(format!("{field} in {part} must be a number")))
    }

    /// A string field.
    ///
    /// # Errors
    /// Returns `Error::BadRequest` if the field is absent or not a string.
    pub fn string(&self, part: Part, field: &str) -> Result<&str> {
        self.optional_string(part, field)?
            .ok_or_else(|| missing(part, field))
    }

    /// Like [`Request::string`], but absent is `None`.
    pub fn optional_string(&self, part: Part, field: &str) -> Result<Option<&str>> {
        match self.value(part, field) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(Error::bad_request(format!(
                "{field} in {part} must be a string"
            ))),
        }
    }

    /// An array field.
    ///
    /// # Errors
    /// Returns `Error::BadRequest` if the field is absent or not an array.
    pub fn array(&self, part: Part, field: &str) -> Result<&[Value]> {
        match self.value(part, field) {
            Some(Value::Array(items)) => Ok(items.as_slice()),
            Some(_) => Err(Error::bad_request(format!(
                "{field} in {part} must be an array"
            ))),
            None => Err(missing(part, field)),
        }
    }
}

fn missing(part: Part, field: &str) -> Error {
    Error::bad_request(format!("{field} in {part} is required"))
}

/// A validator, or a factory for one that is built when the request is checked.
#[derive(Debug, Clone)]
pub enum FieldRule {
    /// Built when the policy was declared
    Ready(Validator),
    /// Built on every check
    Deferred(fn() -> Validator),
}

impl FieldRule {
    fn resolve(&self) -> Validator {
        match self {
            Self::Ready(validator) => validator.clone(),
            Self::Deferred(factory) => factory(),
        }
    }
}

#[derive(Debug, Clone)]
struct FieldCheck {
    part: Part,
    field: &'static str,
    rule: FieldRule,
}

/// What an operation requires of a request.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    authentication_required: bool,
    allowed_roles: Vec<Role>,
    fields: Vec<FieldCheck>,
}

impl Policy {
    /// A policy that lets anyone through.
    #[must_use]
    pub fn public() -> Self {
        Self::default()
    }

    /// A policy that requires a signed-in user.
    #[must_use]
    pub fn authenticated() -> Self {
        Self {
            authentication_required: true,
            ..Self::default()
        }
    }

    /// Restricts the operation to users holding at least one of `roles`.
    #[must_use]
    pub fn roles(mut self, roles: &[Role]) -> Self {
        self.allowed_roles = roles.to_vec();
        self
    }

    /// Declares a validated field.
    #[must_use]
    pub fn field(mut self, part: Part, field: &'static str, validator: Validator) -> Self {
        self.fields.push(FieldCheck {
            part,
            field,
            rule: FieldRule::Ready(validator),
        });
        self
    }

    /// Declares a field whose validator is built at check time.
    #[must_use]
    pub fn deferred_field(
        mut self,
        part: Part,
        field: &'static str,
        factory: fn() -> Validator,
    ) -> Self {
        self.fields.push(FieldCheck {
            part,
            field,
            rule: FieldRule::Deferred(factory),
        });
        self
    }

    /// Whether a signed-in user is required.
    #[must_use]
    pub const fn authentication_required(&self) -> bool {
        self.authentication_required
    }

    /// Roles that may perform the operation; empty means any.
    #[must_use]
    pub fn allowed_roles(&self) -> &[Role] {
        &self.allowed_roles
    }
}

/// Checks a request against a policy.
///
/// Returns the identity the operation runs as, if any.
///
/// # Errors
/// - `Error::Unauthorized` if the policy needs a user and there is none
/// - `Error::Forbidden` if the user holds none of the allowed roles
/// - `Error::BadRequest` for the first field that fails its validator, with the
///   validator's status override if it has one
pub fn authorize<'r>(request: &'r Request, policy: &Policy) -> Result<Option<&'r user::Model>> {
    let identity = request.identity.as_ref();

    if policy.authentication_required && identity.is_none() {
        return Err(Error::Unauthorized);
    }

    if let Some(user) = identity {
        if !policy.allowed_roles.is_empty()
            && !RoleSet::from_bits(user.roles).has_any_role(&policy.allowed_roles)
        {
            tracing::debug!(user_id = user.id, "rejected by role policy");
            return Err(Error::forbidden(format!(
                "requires one of: {}",
                policy
                    .allowed_roles
                    .iter()
                    .copied()
                    .map(Role::name)
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
    }

    for check in &policy.fields {
        let validator = check.rule.resolve();
        let part = check.part.to_string();
        if let Err(reason) = validator.validate(request.value(check.part, check.field)) {
            return Err(Error::BadRequest {
                message: substitute_key(&reason, check.field, &part),
                status: validator.status().unwrap_or(400),
            });
        }
    }

    Ok(identity)
}
