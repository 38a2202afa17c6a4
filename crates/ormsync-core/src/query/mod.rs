//! Parameter-bound statement building and execution.

mod builder;
mod condition;
mod executor;
mod result;

pub use builder::{Batch, Projection, QueryBuilder, Statement};
pub use condition::{Condition, Logic};
pub use executor::StatementExecutor;
pub use result::{ResultSet, Row};

pub(crate) use executor::{execute_on, execute_sql_on, in_transaction, query_on};
