//! Startup cleanup of cache tables.

use crate::catalog::{parse_timestamp, quote_ident, CachePolicy, TableDescriptor};
use crate::database::Database;
use crate::error::{ConfigError, Result};
use crate::query::{execute_on, in_transaction, Projection, QueryBuilder, Statement};
use crate::value::Value;
use chrono::Utc;
use serde::Serialize;

/// What a cache cleanup did to one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheCleanup {
    /// Cache table.
    pub table: String,
    /// Rows deleted.
    pub deleted: usize,
    /// Rows kept because their expiry could not be read.
    pub unparsable: usize,
    /// Failure, when the cleanup did not complete.
    pub error: Option<String>,
}

/// Run the table's cache policy. Tables without one are left alone.
pub(crate) fn cleanup(db: &Database, table: &TableDescriptor) -> Result<Option<CacheCleanup>> {
    let outcome = match &table.cache {
        None => return Ok(None),
        Some(CachePolicy::DeleteOnLoad) => delete_all(db, table)?,
        Some(CachePolicy::DeleteExpired { expiry_column }) => {
            delete_expired(db, table, expiry_column, Utc::now().timestamp_millis())?
        }
    };
    tracing::info!(
        table = %table.name,
        deleted = outcome.deleted,
        unparsable = outcome.unparsable,
        "cache table cleaned"
    );
    Ok(Some(outcome))
}

fn delete_all(db: &Database, table: &TableDescriptor) -> Result<CacheCleanup> {
    let deleted = db.executor().execute(&Statement::new(format!(
        "DELETE FROM {}",
        quote_ident(&table.name)
    )))?;
    Ok(CacheCleanup {
        table: table.name.clone(),
        deleted,
        ..CacheCleanup::default()
    })
}

/// Delete every row whose expiry lies before `now_millis`, one statement per
/// row, all in one transaction.
pub(crate) fn delete_expired(
    db: &Database,
    table: &TableDescriptor,
    expiry_column: &str,
    now_millis: i64,
) -> Result<CacheCleanup> {
    let pk = table
        .primary_key()
        .ok_or_else(|| ConfigError::MissingPrimaryKey {
            table: table.name.clone(),
            relation: format!("cache expiry on {}", expiry_column),
        })?;
    let builder = QueryBuilder::new(table);
    let rows = db.executor().query(&builder.select(
        &Projection::columns([pk.name.as_str(), expiry_column]),
        &[],
    )?)?;

    let mut expired = Vec::new();
    let mut unparsable = 0;
    for row in &rows {
        let Some(id) = row.get_i64(&pk.name) else {
            continue;
        };
        match row.get(expiry_column).map(expiry_millis) {
            Some(Some(expiry)) if expiry < now_millis => expired.push(builder.delete_by_id(id)?),
            Some(Some(_)) => {}
            Some(None) | None => {
                unparsable += 1;
                tracing::warn!(
                    table = %table.name,
                    id,
                    column = expiry_column,
                    "cache row has unreadable expiry; keeping it"
                );
            }
        }
    }

    let deleted = if expired.is_empty() {
        0
    } else {
        let mut conn = db.connect()?;
        in_transaction(&mut conn, |tx| {
            let mut deleted = 0;
            for statement in &expired {
                deleted += execute_on(tx, statement)?;
            }
            Ok(deleted)
        })?
    };

    Ok(CacheCleanup {
        table: table.name.clone(),
        deleted,
        unparsable,
        error: None,
    })
}

fn expiry_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(millis) => Some(*millis),
        Value::Text(text) => parse_timestamp(text),
        _ => None,
    }
}
