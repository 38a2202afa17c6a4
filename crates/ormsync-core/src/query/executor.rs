//! Statement execution.
//!
//! Failures are caught at the statement boundary: each one is logged with
//! the offending SQL and returned as [`Error::Query`].

use super::builder::{Batch, Statement};
use super::result::{ResultSet, Row};
use crate::database::Database;
use crate::error::{Error, Result};
use crate::value::Value;
use rusqlite::{params_from_iter, Connection};

/// Executes statements against one database.
pub struct StatementExecutor<'a> {
    db: &'a Database,
}

impl<'a> StatementExecutor<'a> {
    /// Create an executor for a database.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Run a SELECT and collect its rows.
    pub fn query(&self, statement: &Statement) -> Result<ResultSet> {
        let conn = self.db.connect()?;
        query_on(&conn, statement)
    }

    /// Run a SELECT returning a single integer (COUNT, MAX).
    pub fn query_scalar(&self, statement: &Statement) -> Result<Option<i64>> {
        let rows = self.query(statement)?;
        Ok(rows
            .first()
            .and_then(|row| row.iter().next())
            .and_then(|(_, value)| value.as_i64()))
    }

    /// Run a write statement, returning the affected row count.
    pub fn execute(&self, statement: &Statement) -> Result<usize> {
        let conn = self.db.connect()?;
        execute_on(&conn, statement)
    }

    /// Run an INSERT, returning the new row id.
    pub fn insert(&self, statement: &Statement) -> Result<i64> {
        let conn = self.db.connect()?;
        execute_on(&conn, statement)?;
        Ok(conn.last_insert_rowid())
    }

    /// Run every statement of a batch in one transaction.
    ///
    /// The first failure rolls the whole batch back.
    pub fn execute_batch(&self, batch: &Batch) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let mut conn = self.db.connect()?;
        in_transaction(&mut conn, |tx| {
            let mut affected = 0;
            for statement in batch.statements() {
                affected += execute_on(tx, statement)?;
            }
            Ok(affected)
        })
    }

    /// Run parameterless SQL such as DDL.
    pub fn execute_sql(&self, sql: &str) -> Result<()> {
        let conn = self.db.connect()?;
        execute_sql_on(&conn, sql)
    }
}

pub(crate) fn query_on(conn: &Connection, statement: &Statement) -> Result<ResultSet> {
    tracing::debug!(sql = %statement.sql, params = statement.params.len(), "query");
    let fail = |e: rusqlite::Error| failed(statement, e);

    let mut prepared = conn.prepare(&statement.sql).map_err(fail)?;
    let columns: Vec<String> = prepared
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();
    let mut rows = prepared
        .query(params_from_iter(statement.params.iter()))
        .map_err(fail)?;

    let mut collected = Vec::new();
    while let Some(row) = rows.next().map_err(fail)? {
        let mut entries = Vec::with_capacity(columns.len());
        for (idx, name) in columns.iter().enumerate() {
            let value: Value = row.get(idx).map_err(fail)?;
            entries.push((name.clone(), value));
        }
        collected.push(Row::new(entries));
    }
    Ok(ResultSet::new(columns, collected))
}

pub(crate) fn execute_on(conn: &Connection, statement: &Statement) -> Result<usize> {
    tracing::debug!(sql = %statement.sql, params = statement.params.len(), "execute");
    conn.execute(&statement.sql, params_from_iter(statement.params.iter()))
        .map_err(|e| failed(statement, e))
}

pub(crate) fn execute_sql_on(conn: &Connection, sql: &str) -> Result<()> {
    tracing::debug!(sql = %sql, "execute");
    conn.execute_batch(sql).map_err(|e| failed_sql(sql, e))
}

/// Run `f` inside one transaction; an error rolls everything back.
pub(crate) fn in_transaction<T>(
    conn: &mut Connection,
    f: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
    let tx = conn
        .transaction()
        .map_err(|e| failed_sql("BEGIN TRANSACTION", e))?;
    let value = f(&*tx)?;
    tx.commit().map_err(|e| failed_sql("COMMIT", e))?;
    Ok(value)
}

fn failed(statement: &Statement, source: rusqlite::Error) -> Error {
    failed_sql(&statement.sql, source)
}

fn failed_sql(sql: &str, source: rusqlite::Error) -> Error {
    tracing::error!(statement = %sql, error = %source, "statement failed");
    Error::query(sql, source)
}
