//! Query conditions.

use crate::value::Value;

/// Logical connective of a binary condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logic {
    /// Both sides must hold.
    And,
    /// Either side must hold.
    Or,
}

impl Logic {
    pub(crate) fn keyword(&self) -> &'static str {
        match self {
            Logic::And => "AND",
            Logic::Or => "OR",
        }
    }
}

/// A WHERE condition. A list of conditions is joined with AND.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `column = value` (`column IS NULL` for a null value).
    Eq {
        /// Column name.
        column: String,
        /// Native value, encoded through the column before binding.
        value: Value,
    },
    /// `(left) AND|OR (right)`, each side an equality.
    Binary {
        /// Left equality.
        left: (String, Value),
        /// Connective.
        op: Logic,
        /// Right equality.
        right: (String, Value),
    },
}

impl Condition {
    /// Equality condition.
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    /// `left AND right`.
    pub fn and(
        left_column: impl Into<String>,
        left_value: impl Into<Value>,
        right_column: impl Into<String>,
        right_value: impl Into<Value>,
    ) -> Self {
        Condition::Binary {
            left: (left_column.into(), left_value.into()),
            op: Logic::And,
            right: (right_column.into(), right_value.into()),
        }
    }

    /// `left OR right`.
    pub fn or(
        left_column: impl Into<String>,
        left_value: impl Into<Value>,
        right_column: impl Into<String>,
        right_value: impl Into<Value>,
    ) -> Self {
        Condition::Binary {
            left: (left_column.into(), left_value.into()),
            op: Logic::Or,
            right: (right_column.into(), right_value.into()),
        }
    }

    /// Columns referenced by this condition.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Condition::Eq { column, .. } => vec![column.as_str()],
            Condition::Binary { left, right, .. } => vec![left.0.as_str(), right.0.as_str()],
        }
    }
}
