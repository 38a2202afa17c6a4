//! Table rebuild: copy rows out, recreate the table, copy rows back.

use crate::catalog::{quote_ident, TableDescriptor};
use crate::database::Database;
use crate::error::{Error, Result};
use crate::query::{execute_on, execute_sql_on, in_transaction, query_on, Row, Statement};
use crate::value::Value;
use rusqlite::Connection;

/// Recreate `table` from its descriptor, preserving rows.
///
/// Runs on one connection inside one transaction. Only values of columns that
/// are still declared survive. NOT NULL columns missing from (or null in) the
/// old rows are backfilled from the declared default or the storage type's
/// zero value. Returns the number of rows copied.
///
/// With foreign key enforcement on, enforcement is suspended on the rebuild
/// connection (the DROP would otherwise cascade into referencing tables) and
/// `PRAGMA foreign_key_check` must come back clean before the commit.
pub(crate) fn rebuild_table(db: &Database, table: &TableDescriptor) -> Result<usize> {
    let create = table.create_statement()?;
    let quoted = quote_ident(&table.name);
    let enforcing = db.config().foreign_keys;
    let mut conn = db.connect()?;
    if enforcing {
        set_foreign_keys(&conn, false)?;
    }

    let result = in_transaction(&mut conn, |tx| {
        let rows = query_on(tx, &Statement::new(format!("SELECT * FROM {}", quoted)))?;
        execute_sql_on(tx, &format!("DROP TABLE {}", quoted))?;
        execute_sql_on(tx, &create)?;
        for row in &rows {
            execute_on(tx, &reinsert(table, row)?)?;
        }
        if enforcing {
            let violations = query_on(tx, &Statement::new("PRAGMA foreign_key_check"))?;
            if !violations.is_empty() {
                return Err(Error::ForeignKeyViolation {
                    table: table.name.clone(),
                    violations: violations.len(),
                });
            }
        }
        Ok(rows.len())
    });

    if enforcing {
        set_foreign_keys(&conn, true)?;
    }
    let copied = result?;

    tracing::info!(table = %table.name, rows = copied, "table rebuilt");
    Ok(copied)
}

fn set_foreign_keys(conn: &Connection, enabled: bool) -> Result<()> {
    let sql = format!("PRAGMA foreign_keys = {}", if enabled { "ON" } else { "OFF" });
    execute_sql_on(conn, &sql)
}

fn reinsert(table: &TableDescriptor, row: &Row) -> Result<Statement> {
    let mut names = Vec::with_capacity(table.columns.len());
    let mut params = Vec::with_capacity(table.columns.len());

    for column in &table.columns {
        let value = match row.get(&column.name) {
            Some(value) if !value.is_null() => value.clone(),
            _ if column.not_null && !column.primary_key => column.backfill_value()?,
            _ => continue,
        };
        names.push(quote_ident(&column.name));
        params.push(value);
    }

    let target = quote_ident(&table.name);
    if names.is_empty() {
        return Ok(Statement::new(format!("INSERT INTO {} DEFAULT VALUES", target)));
    }
    let placeholders: Vec<String> = (1..=params.len()).map(|i| format!("?{}", i)).collect();
    Ok(Statement::with_params(
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            target,
            names.join(", "),
            placeholders.join(", ")
        ),
        params,
    ))
}

/// Live columns with no declaration. A rebuild discards their values.
pub(crate) fn discarded_columns<'a>(table: &TableDescriptor, live: &'a [String]) -> Vec<&'a str> {
    live.iter()
        .filter(|name| !table.has_column(name))
        .map(String::as_str)
        .collect()
}
