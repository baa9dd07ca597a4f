//! Request validation.
//!
//! A [`Pipeline`] runs in three phases over an immutable [`Payload`]:
//!
//! 1. sanitization of the configured text fields (never fails),
//! 2. every format [`Rule`]; all failures are collected into one
//!    `ValidationFailed`,
//! 3. the dependent [`Check`]s in declared order, stopping at the first error.
//!
//! A payload that gets through all three is returned, sanitized, to the caller.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{AuthError, FieldError};
use crate::sanitize::strip_markup;
use crate::store::CredentialStore;

pub const USERNAME_MAX: usize = 64;
pub const PASSWORD_MAX: usize = 64;
pub const EVENT_NAME_MAX: usize = 64;

/// Snapshot of a request body. Validators only ever see it by reference.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload(Map<String, Value>);

impl Payload {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    /// Present and not `null`.
    pub fn is_present(&self, field: &str) -> bool {
        self.0.get(field).is_some_and(|v| !v.is_null())
    }

    /// Deserialize the (validated) payload into a typed request.
    pub fn into_request<T: DeserializeOwned>(self) -> Result<T, AuthError> {
        serde_json::from_value(Value::Object(self.0))
            .map_err(|e| AuthError::ValidationFailed(vec![FieldError::new("body", e.to_string())]))
    }

    fn sanitized(mut self, fields: &[&'static str]) -> Self {
        for field in fields {
            if let Some(Value::String(s)) = self.0.get_mut(*field) {
                *s = strip_markup(s);
            }
        }
        self
    }
}

impl TryFrom<Value> for Payload {
    type Error = AuthError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            _ => Err(AuthError::ValidationFailed(vec![FieldError::new(
                "body",
                "request body must be a JSON object",
            )])),
        }
    }
}

/// Independent, synchronous payload check.
pub trait Rule: Send + Sync {
    fn check(&self, payload: &Payload) -> Result<(), FieldError>;
}

/// Character-count bounds on a text field. A required field that is missing
/// counts as empty; an optional one that is missing passes.
pub struct Length {
    field: &'static str,
    min: usize,
    max: usize,
    required: bool,
}

impl Length {
    pub fn required(field: &'static str, min: usize, max: usize) -> Self {
        Self {
            field,
            min,
            max,
            required: true,
        }
    }

    pub fn optional(field: &'static str, min: usize, max: usize) -> Self {
        Self {
            field,
            min,
            max,
            required: false,
        }
    }
}

impl Rule for Length {
    fn check(&self, payload: &Payload) -> Result<(), FieldError> {
        let value = match payload.get(self.field) {
            None | Some(Value::Null) if !self.required => return Ok(()),
            None | Some(Value::Null) => "",
            Some(Value::String(s)) => s.as_str(),
            Some(_) => return Err(FieldError::new(self.field, format!("{} must be text", self.field))),
        };

        let len = value.chars().count();
        if len < self.min {
            return Err(FieldError::new(
                self.field,
                format!("{} must be at least {} characters", self.field, self.min),
            ));
        }
        if len > self.max {
            return Err(FieldError::new(
                self.field,
                format!("{} must be at most {} characters", self.field, self.max),
            ));
        }
        Ok(())
    }
}

/// For partial updates: no single field is required, but one must be given.
pub struct AtLeastOneOf {
    fields: Vec<&'static str>,
}

impl AtLeastOneOf {
    pub fn new(fields: &[&'static str]) -> Self {
        Self {
            fields: fields.to_vec(),
        }
    }
}

impl Rule for AtLeastOneOf {
    fn check(&self, payload: &Payload) -> Result<(), FieldError> {
        if self.fields.iter().any(|f| payload.is_present(f)) {
            Ok(())
        } else {
            Err(FieldError::new(
                "body",
                format!("require at least one value of: {}", self.fields.join(", ")),
            ))
        }
    }
}

/// What a dependent check concluded when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    /// The check's inputs were absent, so it had nothing to say.
    Skipped,
}

/// Data-driven check that may hit storage. Runs after every [`Rule`] passed.
#[async_trait]
pub trait Check: Send + Sync {
    async fn check(&self, payload: &Payload) -> Result<Verdict, AuthError>;
}

/// Fails with `DuplicateUsername` if the username is already registered.
///
/// Two registrations racing past this check are still stopped by the UNIQUE
/// constraint on `users.username`.
pub struct UsernameNotTaken {
    store: CredentialStore,
}

impl UsernameNotTaken {
    pub fn new(store: CredentialStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Check for UsernameNotTaken {
    async fn check(&self, payload: &Payload) -> Result<Verdict, AuthError> {
        let Some(username) = payload.text("username") else {
            return Ok(Verdict::Skipped);
        };

        match self.store.find_by_username(username).await? {
            Some(_) => Err(AuthError::DuplicateUsername),
            None => Ok(Verdict::Passed),
        }
    }
}

/// Username and password together. Skips when either is missing so that
/// pipelines without format rules for them do not report a login failure.
/// Every real failure is `AuthenticationFailed`.
pub struct ValidLogin {
    store: CredentialStore,
}

impl ValidLogin {
    pub fn new(store: CredentialStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Check for ValidLogin {
    async fn check(&self, payload: &Payload) -> Result<Verdict, AuthError> {
        let username = payload.text("username").filter(|u| !u.is_empty());
        let password = payload.text("password").filter(|p| !p.is_empty());
        let (Some(username), Some(password)) = (username, password) else {
            return Ok(Verdict::Skipped);
        };

        self.store.verify_login(username, password).await?;
        Ok(Verdict::Passed)
    }
}

#[derive(Default)]
pub struct Pipeline {
    sanitize: Vec<&'static str>,
    rules: Vec<Box<dyn Rule>>,
    checks: Vec<Box<dyn Check>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sanitize(mut self, field: &'static str) -> Self {
        self.sanitize.push(field);
        self
    }

    pub fn rule(mut self, rule: impl Rule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn check(mut self, check: impl Check + 'static) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    /// New account: username and password bounds, then username uniqueness.
    pub fn registration(store: CredentialStore) -> Self {
        Self::new()
            .sanitize("username")
            .rule(Length::required("username", 1, USERNAME_MAX))
            .rule(Length::required("password", 1, PASSWORD_MAX))
            .check(UsernameNotTaken::new(store))
    }

    pub fn login(store: CredentialStore) -> Self {
        Self::new()
            .sanitize("username")
            .rule(Length::required("username", 1, USERNAME_MAX))
            .rule(Length::required("password", 1, PASSWORD_MAX))
            .check(ValidLogin::new(store))
    }

    /// Change username and/or password. A taken username is left to the
    /// store, which reports it when the UNIQUE constraint fires.
    pub fn user_update() -> Self {
        Self::new()
            .sanitize("username")
            .rule(AtLeastOneOf::new(&["username", "password"]))
            .rule(Length::optional("username", 1, USERNAME_MAX))
            .rule(Length::optional("password", 1, PASSWORD_MAX))
    }

    pub fn event() -> Self {
        Self::new()
            .sanitize("name")
            .rule(Length::required("name", 1, EVENT_NAME_MAX))
    }

    pub fn event_update() -> Self {
        Self::new()
            .sanitize("name")
            .rule(AtLeastOneOf::new(&["name", "slug", "description"]))
            .rule(Length::optional("name", 1, EVENT_NAME_MAX))
    }

    /// Validate `payload`. Returns the sanitized payload when accepted.
    pub async fn run(&self, payload: Payload) -> Result<Payload, AuthError> {
        let payload = payload.sanitized(&self.sanitize);

        let errors: Vec<FieldError> = self
            .rules
            .iter()
            .filter_map(|rule| rule.check(&payload).err())
            .collect();
        if !errors.is_empty() {
            return Err(AuthError::ValidationFailed(errors));
        }

        for check in &self.checks {
            if check.check(&payload).await? == Verdict::Skipped {
                debug!("Validation check skipped: inputs absent");
            }
        }

        Ok(payload)
    }
}
