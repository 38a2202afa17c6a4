//! Statement rendering.
//!
//! Every value is encoded through its column and bound as a positional
//! parameter; only identifiers (quoted) end up in the SQL text.

use super::condition::Condition;
use crate::catalog::{encoding_error, quote_ident, ColumnDescriptor, TableDescriptor};
use crate::error::{ConfigError, Error, Result};
use crate::value::Value;
use std::fmt;

/// A rendered statement with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// SQL text with `?N` placeholders.
    pub sql: String,
    /// Parameters in placeholder order.
    pub params: Vec<Value>,
}

impl Statement {
    /// A statement without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// A statement with parameters.
    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Statements executed together in one transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    statements: Vec<Statement>,
}

impl Batch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a statement.
    pub fn push(&mut self, statement: Statement) {
        self.statements.push(statement);
    }

    /// Number of statements.
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Statements in execution order.
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }
}

impl Extend<Statement> for Batch {
    fn extend<T: IntoIterator<Item = Statement>>(&mut self, iter: T) {
        self.statements.extend(iter);
    }
}

impl FromIterator<Statement> for Batch {
    fn from_iter<T: IntoIterator<Item = Statement>>(iter: T) -> Self {
        Self {
            statements: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BEGIN TRANSACTION; ")?;
        for statement in &self.statements {
            write!(f, "{}; ", statement.sql)?;
        }
        f.write_str("COMMIT;")
    }
}

/// Columns returned by a SELECT.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Projection {
    /// `*`.
    #[default]
    All,
    /// Listed columns, in order.
    Columns(Vec<String>),
}

impl Projection {
    /// Project the given columns.
    pub fn columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Projection::Columns(columns.into_iter().map(Into::into).collect())
    }
}

/// Renders statements against one table descriptor.
pub struct QueryBuilder<'a> {
    table: &'a TableDescriptor,
}

impl<'a> QueryBuilder<'a> {
    /// Create a builder for a table.
    pub fn new(table: &'a TableDescriptor) -> Self {
        Self { table }
    }

    fn column(&self, name: &str) -> Result<&'a ColumnDescriptor> {
        self.table.column(name).ok_or_else(|| Error::UnknownColumn {
            table: self.table.name.clone(),
            column: name.to_string(),
        })
    }

    fn primary_key(&self) -> Result<&'a ColumnDescriptor> {
        self.table.primary_key().ok_or_else(|| {
            ConfigError::MissingPrimaryKey {
                table: self.table.name.clone(),
                relation: "lookup by id".to_string(),
            }
            .into()
        })
    }

    fn encode(&self, column: &ColumnDescriptor, value: &Value) -> Result<Value> {
        column
            .to_storage(value)
            .map_err(|e| encoding_error(column, e))
    }

    fn equality(&self, column: &str, value: &Value, params: &mut Vec<Value>) -> Result<String> {
        let descriptor = self.column(column)?;
        if value.is_null() {
            return Ok(format!("{} IS NULL", quote_ident(column)));
        }
        params.push(self.encode(descriptor, value)?);
        Ok(format!("{} = ?{}", quote_ident(column), params.len()))
    }

    fn where_clause(&self, conditions: &[Condition], params: &mut Vec<Value>) -> Result<String> {
        if conditions.is_empty() {
            return Ok(String::new());
        }
        let mut parts = Vec::with_capacity(conditions.len());
        for condition in conditions {
            parts.push(match condition {
                Condition::Eq { column, value } => self.equality(column, value, params)?,
                Condition::Binary { left, op, right } => {
                    let l = self.equality(&left.0, &left.1, params)?;
                    let r = self.equality(&right.0, &right.1, params)?;
                    format!("({} {} {})", l, op.keyword(), r)
                }
            });
        }
        Ok(format!(" WHERE {}", parts.join(" AND ")))
    }

    /// `SELECT [columns|*] FROM t [WHERE ...]`. No conditions selects every row.
    pub fn select(&self, projection: &Projection, conditions: &[Condition]) -> Result<Statement> {
        let columns = match projection {
            Projection::All => "*".to_string(),
            Projection::Columns(columns) => {
                let mut quoted = Vec::with_capacity(columns.len());
                for name in columns {
                    self.column(name)?;
                    quoted.push(quote_ident(name));
                }
                quoted.join(", ")
            }
        };
        let mut params = Vec::new();
        let filter = self.where_clause(conditions, &mut params)?;
        Ok(Statement::with_params(
            format!("SELECT {} FROM {}{}", columns, quote_ident(&self.table.name), filter),
            params,
        ))
    }

    /// [`select`](Self::select) ordered ascending by one column.
    pub fn select_ordered(
        &self,
        projection: &Projection,
        conditions: &[Condition],
        order_by: &str,
    ) -> Result<Statement> {
        self.column(order_by)?;
        let mut statement = self.select(projection, conditions)?;
        statement.sql.push_str(" ORDER BY ");
        statement.sql.push_str(&quote_ident(order_by));
        Ok(statement)
    }

    /// Select one row by primary key.
    pub fn select_by_id(&self, id: i64) -> Result<Statement> {
        let pk = self.primary_key()?;
        self.select(&Projection::All, &[Condition::eq(pk.name.clone(), id)])
    }

    /// `SELECT COUNT(*) FROM t [WHERE ...]`.
    pub fn count(&self, conditions: &[Condition]) -> Result<Statement> {
        let mut params = Vec::new();
        let filter = self.where_clause(conditions, &mut params)?;
        Ok(Statement::with_params(
            format!(
                "SELECT COUNT(*) AS \"count\" FROM {}{}",
                quote_ident(&self.table.name),
                filter
            ),
            params,
        ))
    }

    /// `SELECT MAX(column) FROM t`.
    pub fn max(&self, column: &str) -> Result<Statement> {
        self.column(column)?;
        Ok(Statement::new(format!(
            "SELECT MAX({}) AS \"max\" FROM {}",
            quote_ident(column),
            quote_ident(&self.table.name)
        )))
    }

    /// `INSERT INTO t (...) VALUES (...)`.
    ///
    /// Fails with [`Error::MissingRequiredColumns`] when a NOT NULL column
    /// without default is absent or null. A null primary key is left to
    /// autoincrement.
    pub fn insert(&self, values: &[(String, Value)]) -> Result<Statement> {
        for (name, _) in values {
            self.column(name)?;
        }

        let missing: Vec<String> = self
            .table
            .columns
            .iter()
            .filter(|c| c.not_null && !c.primary_key)
            .filter(|c| match values.iter().find(|(name, _)| *name == c.name) {
                Some((_, value)) => value.is_null(),
                None => c.default.is_none(),
            })
            .map(|c| c.name.clone())
            .collect();
        if !missing.is_empty() {
            return Err(Error::MissingRequiredColumns {
                table: self.table.name.clone(),
                columns: missing,
            });
        }

        let mut names = Vec::with_capacity(values.len());
        let mut params = Vec::with_capacity(values.len());
        for (name, value) in values {
            let column = self.column(name)?;
            if column.primary_key && value.is_null() {
                continue;
            }
            names.push(quote_ident(name));
            params.push(self.encode(column, value)?);
        }

        let table = quote_ident(&self.table.name);
        if names.is_empty() {
            return Ok(Statement::new(format!("INSERT INTO {} DEFAULT VALUES", table)));
        }
        let placeholders: Vec<String> = (1..=params.len()).map(|i| format!("?{}", i)).collect();
        Ok(Statement::with_params(
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                names.join(", "),
                placeholders.join(", ")
            ),
            params,
        ))
    }

    /// `UPDATE t SET ... [WHERE ...]`. Setting a NOT NULL column to null fails
    /// with [`Error::MissingRequiredColumns`].
    pub fn update(
        &self,
        values: &[(String, Value)],
        conditions: &[Condition],
    ) -> Result<Statement> {
        let mut missing = Vec::new();
        let mut assignments = Vec::with_capacity(values.len());
        let mut params = Vec::with_capacity(values.len() + conditions.len());

        for (name, value) in values {
            let column = self.column(name)?;
            if column.primary_key {
                continue;
            }
            if column.not_null && value.is_null() {
                missing.push(name.clone());
                continue;
            }
            params.push(self.encode(column, value)?);
            assignments.push(format!("{} = ?{}", quote_ident(name), params.len()));
        }
        if !missing.is_empty() {
            return Err(Error::MissingRequiredColumns {
                table: self.table.name.clone(),
                columns: missing,
            });
        }
        if assignments.is_empty() {
            return Err(Error::EmptyUpdate {
                table: self.table.name.clone(),
            });
        }

        let filter = self.where_clause(conditions, &mut params)?;
        Ok(Statement::with_params(
            format!(
                "UPDATE {} SET {}{}",
                quote_ident(&self.table.name),
                assignments.join(", "),
                filter
            ),
            params,
        ))
    }

    /// Update one row by primary key.
    pub fn update_by_id(&self, values: &[(String, Value)], id: i64) -> Result<Statement> {
        let pk = self.primary_key()?;
        self.update(values, &[Condition::eq(pk.name.clone(), id)])
    }

    /// `DELETE FROM t [WHERE ...]`.
    pub fn delete(&self, conditions: &[Condition]) -> Result<Statement> {
        let mut params = Vec::new();
        let filter = self.where_clause(conditions, &mut params)?;
        Ok(Statement::with_params(
            format!("DELETE FROM {}{}", quote_ident(&self.table.name), filter),
            params,
        ))
    }

    /// Delete one row by primary key.
    pub fn delete_by_id(&self, id: i64) -> Result<Statement> {
        let pk = self.primary_key()?;
        self.delete(&[Condition::eq(pk.name.clone(), id)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnDescriptor, EnumEncoder, StorageType};

    fn user() -> TableDescriptor {
        TableDescriptor::new("user")
            .with_column(ColumnDescriptor::primary_key("id"))
            .with_column(ColumnDescriptor::required("name", StorageType::Text))
            .with_column(ColumnDescriptor::required("password", StorageType::Text))
            .with_column(ColumnDescriptor::new("active", StorageType::Boolean))
            .with_column(
                ColumnDescriptor::new("role", StorageType::Integer)
                    .with_encoder(EnumEncoder::new(["Member", "Admin"])),
            )
    }

    #[test]
    fn test_select_all_without_conditions() {
        let table = user();
        let stmt = QueryBuilder::new(&table).select(&Projection::All, &[]).unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM \"user\"");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_select_binds_encoded_values() {
        let table = user();
        let stmt = QueryBuilder::new(&table)
            .select(
                &Projection::columns(["id", "name"]),
                &[
                    Condition::eq("role", "Admin"),
                    Condition::or("name", "Jon", "active", true),
                ],
            )
            .unwrap();

        assert_eq!(
            stmt.sql,
            "SELECT \"id\", \"name\" FROM \"user\" WHERE \"role\" = ?1 AND (\"name\" = ?2 OR \"active\" = ?3)"
        );
        assert_eq!(
            stmt.params,
            vec![
                Value::Integer(1),
                Value::Text("Jon".into()),
                Value::Bool(true)
            ]
        );
    }

    #[test]
    fn test_null_condition_renders_is_null() {
        let table = user();
        let stmt = QueryBuilder::new(&table)
            .delete(&[Condition::eq("active", Value::Null)])
            .unwrap();
        assert_eq!(stmt.sql, "DELETE FROM \"user\" WHERE \"active\" IS NULL");
    }

    #[test]
    fn test_insert_requires_not_null_columns() {
        let table = user();
        let err = QueryBuilder::new(&table)
            .insert(&[("name".into(), Value::Text("Jon Doe".into()))])
            .unwrap_err();

        match err {
            Error::MissingRequiredColumns { table, columns } => {
                assert_eq!(table, "user");
                assert_eq!(columns, vec!["password".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_insert_skips_null_primary_key() {
        let table = user();
        let stmt = QueryBuilder::new(&table)
            .insert(&[
                ("id".into(), Value::Null),
                ("name".into(), Value::Text("Jon Doe".into())),
                ("password".into(), Value::Text("Abc123".into())),
            ])
            .unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO \"user\" (\"name\", \"password\") VALUES (?1, ?2)"
        );
    }

    #[test]
    fn test_unknown_column() {
        let table = user();
        assert!(matches!(
            QueryBuilder::new(&table).select(&Projection::All, &[Condition::eq("nope", 1)]),
            Err(Error::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_update_rules() {
        let table = user();
        let builder = QueryBuilder::new(&table);

        let stmt = builder
            .update_by_id(&[("name".into(), Value::Text("Jane".into()))], 4)
            .unwrap();
        assert_eq!(stmt.sql, "UPDATE \"user\" SET \"name\" = ?1 WHERE \"id\" = ?2");
        assert_eq!(stmt.params, vec![Value::Text("Jane".into()), Value::Integer(4)]);

        assert!(matches!(
            builder.update_by_id(&[("password".into(), Value::Null)], 4),
            Err(Error::MissingRequiredColumns { .. })
        ));
        assert!(matches!(
            builder.update_by_id(&[("id".into(), Value::Integer(9))], 4),
            Err(Error::EmptyUpdate { .. })
        ));
    }

    #[test]
    fn test_batch_display() {
        let batch: Batch = vec![Statement::new("DELETE FROM a"), Statement::new("DELETE FROM b")]
            .into_iter()
            .collect();
        assert_eq!(
            batch.to_string(),
            "BEGIN TRANSACTION; DELETE FROM a; DELETE FROM b; COMMIT;"
        );
    }
}
