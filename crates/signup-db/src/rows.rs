use rusqlite::types::{FromSql, Value, ValueRef};
use rusqlite::{Connection, params_from_iter};

use crate::error::DbError;

/// Owned result of one statement: column names, row values and a row count.
///
/// For statements that produce rows (`SELECT`, `... RETURNING`) the count is
/// the number of rows returned; otherwise it is the number of rows changed.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    row_count: usize,
}

impl RowSet {
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().map(|values| Record {
            columns: &self.columns,
            values,
        })
    }

    pub fn decode<T: FromRecord>(&self) -> Result<Vec<T>, DbError> {
        self.records().map(|r| T::from_record(&r)).collect()
    }

    /// Decode the first row, if any.
    pub fn decode_first<T: FromRecord>(&self) -> Result<Option<T>, DbError> {
        self.records().next().map(|r| T::from_record(&r)).transpose()
    }
}

/// One row of a [`RowSet`], addressed by column name.
pub struct Record<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl Record<'_> {
    pub fn get<T: FromSql>(&self, column: &str) -> Result<T, DbError> {
        let value = self
            .columns
            .iter()
            .position(|c| c == column)
            .and_then(|idx| self.values.get(idx))
            .ok_or_else(|| DbError::Decode {
                column: column.to_string(),
                reason: "no such column".into(),
            })?;

        T::column_result(ValueRef::from(value)).map_err(|e| DbError::Decode {
            column: column.to_string(),
            reason: e.to_string(),
        })
    }
}

pub trait FromRecord: Sized {
    fn from_record(record: &Record<'_>) -> Result<Self, DbError>;
}

/// Run one statement with positionally bound parameters and copy out its rows.
pub(crate) fn collect(conn: &Connection, sql: &str, params: &[Value]) -> rusqlite::Result<RowSet> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_owned)
        .collect();

    if columns.is_empty() {
        let changed = stmt.execute(params_from_iter(params))?;
        return Ok(RowSet {
            columns,
            rows: Vec::new(),
            row_count: changed,
        });
    }

    let mut rows = Vec::new();
    let mut cursor = stmt.query(params_from_iter(params))?;
    while let Some(row) = cursor.next()? {
        let values = (0..columns.len())
            .map(|idx| row.get::<_, Value>(idx))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.push(values);
    }

    let row_count = rows.len();
    Ok(RowSet {
        columns,
        rows,
        row_count,
    })
}
