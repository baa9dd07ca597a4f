//! Conditional updates: an `UPDATE` built from only the supplied fields whose
//! values are text, numbers or timestamps.
//!
//! Table and column names come from the [`Column`] implementations below and
//! are the only identifiers ever written into SQL text. Values are always bound
//! as parameters.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use tracing::debug;

use crate::error::DbError;
use crate::rows::{FromRecord, RowSet};
use crate::Database;

/// Storage format for timestamps, matching SQLite's `CURRENT_TIMESTAMP`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// An updatable column of one table. Implemented only by the closed enums in
/// this module, so the set of table and column names is fixed at compile time.
pub trait Column: Copy + std::fmt::Debug {
    const TABLE: &'static str;

    fn name(self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserColumn {
    Username,
    Password,
}

impl Column for UserColumn {
    const TABLE: &'static str = "users";

    fn name(self) -> &'static str {
        match self {
            UserColumn::Username => "username",
            UserColumn::Password => "password",
        }
    }
}

/// No description column: it cannot change after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventColumn {
    Name,
    Slug,
    Updated,
}

impl Column for EventColumn {
    const TABLE: &'static str = "events";

    fn name(self) -> &'static str {
        match self {
            EventColumn::Name => "name",
            EventColumn::Slug => "slug",
            EventColumn::Updated => "updated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationColumn {
    Name,
    Comment,
}

impl Column for RegistrationColumn {
    const TABLE: &'static str = "registrations";

    fn name(self) -> &'static str {
        match self {
            RegistrationColumn::Name => "name",
            RegistrationColumn::Comment => "comment",
        }
    }
}

/// A value offered for a column. Only `Text`, `Integer`, `Real` and
/// `Timestamp` are written; any other variant drops its field from the update.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Real(f64),
    Timestamp(DateTime<Utc>),
    Bool(bool),
    Null,
    List(Vec<FieldValue>),
}

impl FieldValue {
    fn to_param(&self) -> Option<Value> {
        match self {
            FieldValue::Text(s) => Some(Value::Text(s.clone())),
            FieldValue::Integer(i) => Some(Value::Integer(*i)),
            FieldValue::Real(f) => Some(Value::Real(*f)),
            FieldValue::Timestamp(ts) => Some(Value::Text(ts.format(TIMESTAMP_FORMAT).to_string())),
            FieldValue::Bool(_) | FieldValue::Null | FieldValue::List(_) => None,
        }
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Integer(i)
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        FieldValue::Real(f)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(ts: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(ts)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}

/// A built conditional update: SQL text plus parameters, id first.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl UpdateStatement {
    /// Build `UPDATE <table> SET f1 = ?2, ... WHERE id = ?1 RETURNING *`.
    ///
    /// `fields` and `values` are parallel. Pairs whose value is not writable
    /// are dropped; the rest keep their relative order. Returns `Ok(None)` when
    /// nothing survives.
    pub fn build<C: Column>(
        id: i64,
        fields: &[C],
        values: &[FieldValue],
    ) -> Result<Option<Self>, DbError> {
        if fields.len() != values.len() {
            return Err(DbError::MalformedUpdate {
                fields: fields.len(),
                values: values.len(),
            });
        }

        let kept: Vec<(C, Value)> = fields
            .iter()
            .zip(values)
            .filter_map(|(field, value)| value.to_param().map(|param| (*field, param)))
            .collect();

        if kept.is_empty() {
            return Ok(None);
        }

        // id is ?1
        let assignments = kept
            .iter()
            .enumerate()
            .map(|(i, (field, _))| format!("{} = ?{}", field.name(), i + 2))
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?1 RETURNING *",
            C::TABLE,
            assignments
        );

        let mut params = Vec::with_capacity(kept.len() + 1);
        params.push(Value::Integer(id));
        params.extend(kept.into_iter().map(|(_, param)| param));

        Ok(Some(Self { sql, params }))
    }
}

/// Result of a conditional update. `Applied` carries the statement's rows as
/// returned, which is empty when no row had the given id.
#[derive(Debug)]
pub enum UpdateOutcome {
    /// No field survived filtering; no statement was issued.
    Unchanged,
    Applied(RowSet),
}

impl UpdateOutcome {
    pub fn decode<T: FromRecord>(self) -> Result<Updated<T>, DbError> {
        match self {
            UpdateOutcome::Unchanged => Ok(Updated::Unchanged),
            UpdateOutcome::Applied(rows) => Ok(rows
                .decode_first()?
                .map_or(Updated::NotFound, Updated::Row)),
        }
    }
}

/// Typed view of an [`UpdateOutcome`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Updated<T> {
    Unchanged,
    Row(T),
    NotFound,
}

impl<T> Updated<T> {
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Updated<U> {
        match self {
            Updated::Unchanged => Updated::Unchanged,
            Updated::Row(row) => Updated::Row(f(row)),
            Updated::NotFound => Updated::NotFound,
        }
    }

    pub fn row(self) -> Option<T> {
        match self {
            Updated::Row(row) => Some(row),
            Updated::Unchanged | Updated::NotFound => None,
        }
    }
}

impl Database {
    /// Update row `id` of `C::TABLE` with the writable pairs of
    /// (`fields`, `values`). Mismatched lengths fail before anything runs.
    pub async fn conditional_update<C: Column>(
        &self,
        id: i64,
        fields: &[C],
        values: &[FieldValue],
    ) -> Result<UpdateOutcome, DbError> {
        let Some(statement) = UpdateStatement::build(id, fields, values)? else {
            return Ok(UpdateOutcome::Unchanged);
        };

        // Values may be password hashes; log the shape only.
        debug!(
            table = C::TABLE,
            fields = statement.params.len() - 1,
            "Conditional update: {}",
            statement.sql
        );

        let rows = self.execute(&statement.sql, statement.params).await?;
        Ok(UpdateOutcome::Applied(rows))
    }
}
