//! Live-schema inspection.

use crate::catalog::quote_ident;
use crate::database::Database;
use crate::error::Result;
use crate::query::{query_on, Statement};
use crate::value::Value;

/// A column as reported by the live database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveColumn {
    /// Column name.
    pub name: String,
    /// Declared SQL type, as stored.
    pub declared_type: String,
    /// Whether the column is NOT NULL.
    pub not_null: bool,
    /// Default expression text, if any.
    pub default: Option<String>,
    /// Whether the column is part of the primary key.
    pub primary_key: bool,
}

/// Reads the schema of a live database.
pub trait SchemaInspector {
    /// User tables, sorted by name.
    fn list_tables(&self) -> Result<Vec<String>>;

    /// Whether a table exists.
    fn table_exists(&self, table: &str) -> Result<bool>;

    /// Columns of a table in storage order. Empty when the table is missing.
    fn list_columns(&self, table: &str) -> Result<Vec<LiveColumn>>;

    /// The CREATE statement the database stored for a table.
    fn stored_create_statement(&self, table: &str) -> Result<Option<String>>;
}

/// [`SchemaInspector`] over `sqlite_master` and `PRAGMA table_info`.
pub struct SqliteInspector<'a> {
    db: &'a Database,
}

impl<'a> SqliteInspector<'a> {
    /// Create an inspector for a database.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    fn query(&self, statement: &Statement) -> Result<crate::query::ResultSet> {
        let conn = self.db.connect()?;
        query_on(&conn, statement)
    }
}

impl SchemaInspector for SqliteInspector<'_> {
    fn list_tables(&self) -> Result<Vec<String>> {
        let rows = self.query(&Statement::new(
            "SELECT name FROM sqlite_master WHERE type = 'table' \
             AND name NOT LIKE 'sqlite_%' ORDER BY name",
        ))?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("name").and_then(Value::as_str).map(String::from))
            .collect())
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        let rows = self.query(&Statement::with_params(
            "SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = ?1",
            vec![Value::from(table)],
        ))?;
        Ok(rows.first().and_then(|r| r.get_i64("n")).unwrap_or(0) > 0)
    }

    fn list_columns(&self, table: &str) -> Result<Vec<LiveColumn>> {
        let rows = self.query(&Statement::new(format!(
            "PRAGMA table_info({})",
            quote_ident(table)
        )))?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                Some(LiveColumn {
                    name: row.get("name")?.as_str()?.to_string(),
                    declared_type: row
                        .get("type")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    not_null: row.get_i64("notnull").unwrap_or(0) != 0,
                    default: row
                        .get("dflt_value")
                        .and_then(Value::as_str)
                        .map(String::from),
                    primary_key: row.get_i64("pk").unwrap_or(0) != 0,
                })
            })
            .collect())
    }

    fn stored_create_statement(&self, table: &str) -> Result<Option<String>> {
        let rows = self.query(&Statement::with_params(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
            vec![Value::from(table)],
        ))?;
        Ok(rows
            .first()
            .and_then(|r| r.get("sql"))
            .and_then(Value::as_str)
            .map(String::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inspect_live_table() {
        let db = Database::open_in_memory("inspector_live").unwrap();
        db.executor()
            .execute_sql(
                "CREATE TABLE \"user\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL, \
                 \"name\" TEXT NOT NULL DEFAULT 'x', \"email\" TEXT)",
            )
            .unwrap();
        let inspector = db.inspector();

        assert!(inspector.table_exists("user").unwrap());
        assert!(!inspector.table_exists("post").unwrap());
        assert_eq!(inspector.list_tables().unwrap(), vec!["user".to_string()]);

        let columns = inspector.list_columns("user").unwrap();
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "email"]);
        assert!(columns[0].primary_key);
        assert!(columns[1].not_null);
        assert_eq!(columns[1].default.as_deref(), Some("'x'"));
        assert_eq!(columns[2].declared_type, "TEXT");

        let sql = inspector.stored_create_statement("user").unwrap().unwrap();
        assert!(sql.starts_with("CREATE TABLE \"user\""));
        assert!(inspector.stored_create_statement("post").unwrap().is_none());
    }

    #[test]
    fn test_missing_table_has_no_columns() {
        let db = Database::open_in_memory("inspector_missing").unwrap();
        assert!(db.inspector().list_columns("ghost").unwrap().is_empty());
    }
}
