//! Rows and result sets.

use crate::value::Value;

/// One row: ordered `(column, value)` pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    entries: Vec<(String, Value)>,
}

impl Row {
    /// Create a row from ordered entries.
    pub fn new(entries: Vec<(String, Value)>) -> Self {
        Self { entries }
    }

    /// Get a value by column name.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Get an integer value by column name.
    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_i64)
    }

    /// Check whether the row has a column.
    pub fn contains(&self, column: &str) -> bool {
        self.entries.iter().any(|(name, _)| name == column)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(column, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Consume the row into its entries.
    pub fn into_entries(self) -> Vec<(String, Value)> {
        self.entries
    }
}

/// Rows returned by a SELECT.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// Projected column names.
    pub columns: Vec<String>,
    /// Rows in result order.
    pub rows: Vec<Row>,
}

impl ResultSet {
    /// Create a result set.
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Whether a column exists in the first row (or the projection, when empty).
    pub fn has_column(&self, column: &str) -> bool {
        match self.rows.first() {
            Some(row) => row.contains(column),
            None => self.columns.iter().any(|c| c == column),
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First row, if any.
    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    /// Iterate over rows.
    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }
}

impl IntoIterator for ResultSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_access() {
        let row = Row::new(vec![
            ("id".into(), Value::Integer(1)),
            ("name".into(), Value::Text("Jon Doe".into())),
        ]);
        assert_eq!(row.get_i64("id"), Some(1));
        assert_eq!(row.get("name").and_then(Value::as_str), Some("Jon Doe"));
        assert!(row.get("password").is_none());
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn test_has_column_checks_first_row() {
        let rows = ResultSet::new(
            vec!["id".into()],
            vec![Row::new(vec![("id".into(), Value::Integer(1))])],
        );
        assert!(rows.has_column("id"));
        assert!(!rows.has_column("name"));

        let empty = ResultSet::new(vec!["id".into()], Vec::new());
        assert!(empty.is_empty());
        assert!(empty.has_column("id"));
    }
}
