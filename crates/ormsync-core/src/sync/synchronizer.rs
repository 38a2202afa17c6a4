//! Schema synchronization.
//!
//! Reconciles every registered table and junction against the live database:
//! missing tables are created, missing columns added in place where SQLite
//! allows it, and anything else that drifted is rebuilt. A second run over an
//! unchanged registry issues no DDL.

use super::cache::{self, CacheCleanup};
use super::inspector::SchemaInspector;
use super::rebuild::{discarded_columns, rebuild_table};
use crate::catalog::{quote_ident, ColumnDescriptor, SchemaRegistry, TableDescriptor};
use crate::database::Database;
use crate::error::Result;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Decides whether live columns missing from the descriptors may be dropped.
pub trait DropPolicy: Send + Sync {
    /// Return true to rebuild `table` without `columns` (their data is lost).
    fn should_drop_columns(&self, table: &str, columns: &[String]) -> bool;
}

/// Never drop undeclared columns.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverDrop;

impl DropPolicy for NeverDrop {
    fn should_drop_columns(&self, _table: &str, _columns: &[String]) -> bool {
        false
    }
}

/// Always drop undeclared columns.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysDrop;

impl DropPolicy for AlwaysDrop {
    fn should_drop_columns(&self, _table: &str, _columns: &[String]) -> bool {
        true
    }
}

impl<F> DropPolicy for F
where
    F: Fn(&str, &[String]) -> bool + Send + Sync,
{
    fn should_drop_columns(&self, table: &str, columns: &[String]) -> bool {
        self(table, columns)
    }
}

/// Synchronizer configuration.
#[derive(Clone)]
pub struct SyncConfig {
    /// Decision for undeclared live columns.
    pub drop_policy: Arc<dyn DropPolicy>,
    /// Whether cache tables run their startup cleanup.
    pub clean_caches: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            drop_policy: Arc::new(NeverDrop),
            clean_caches: true,
        }
    }
}

impl SyncConfig {
    /// Use a drop policy.
    pub fn with_drop_policy(mut self, policy: impl DropPolicy + 'static) -> Self {
        self.drop_policy = Arc::new(policy);
        self
    }

    /// Enable or disable cache cleanup.
    pub fn with_cache_cleanup(mut self, enabled: bool) -> Self {
        self.clean_caches = enabled;
        self
    }
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("clean_caches", &self.clean_caches)
            .finish_non_exhaustive()
    }
}

/// Why a table has to be rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "columns", rename_all = "snake_case")]
pub enum RebuildReason {
    /// Declared columns that ALTER TABLE cannot add.
    ColumnsNotAddable(Vec<String>),
    /// Undeclared live columns the drop policy accepted.
    DroppedColumns(Vec<String>),
    /// Column sets agree but the stored definition differs.
    DefinitionChanged,
}

impl fmt::Display for RebuildReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebuildReason::ColumnsNotAddable(columns) => {
                write!(f, "columns cannot be added in place: {}", columns.join(", "))
            }
            RebuildReason::DroppedColumns(columns) => {
                write!(f, "dropping columns: {}", columns.join(", "))
            }
            RebuildReason::DefinitionChanged => f.write_str("definition changed"),
        }
    }
}

/// Planned action for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TableAction {
    /// The table does not exist.
    Create,
    /// Add missing columns with ALTER TABLE.
    AddColumns {
        /// Columns to add, in declaration order.
        columns: Vec<String>,
    },
    /// Recreate the table, copying rows.
    Rebuild {
        /// Why.
        reason: RebuildReason,
    },
    /// Nothing to do.
    Unchanged,
}

/// Planned work for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TablePlan {
    /// Table name.
    pub table: String,
    /// What will happen.
    pub action: TableAction,
    /// Undeclared live columns the drop policy declined.
    pub kept_columns: Vec<String>,
}

impl fmt::Display for TablePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.action {
            TableAction::Create => write!(f, "create {}", self.table)?,
            TableAction::AddColumns { columns } => {
                write!(f, "alter {}: add {}", self.table, columns.join(", "))?
            }
            TableAction::Rebuild { reason } => write!(f, "rebuild {}: {}", self.table, reason)?,
            TableAction::Unchanged => write!(f, "unchanged {}", self.table)?,
        }
        if !self.kept_columns.is_empty() {
            write!(f, " (keeping undeclared {})", self.kept_columns.join(", "))?;
        }
        Ok(())
    }
}

/// Planned work for a whole registry, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    /// Per-table plans.
    pub tables: Vec<TablePlan>,
}

impl SyncPlan {
    /// Whether applying the plan would issue no DDL.
    pub fn is_noop(&self) -> bool {
        self.tables
            .iter()
            .all(|t| t.action == TableAction::Unchanged)
    }

    /// Plans that change something.
    pub fn changes(&self) -> impl Iterator<Item = &TablePlan> {
        self.tables
            .iter()
            .filter(|t| t.action != TableAction::Unchanged)
    }
}

/// What synchronization did to one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TableOutcome {
    /// The table was created.
    Created,
    /// Columns were added in place.
    Altered {
        /// Added columns.
        added: Vec<String>,
    },
    /// The table was rebuilt.
    Rebuilt {
        /// Rows copied into the new table.
        rows: usize,
    },
    /// Nothing changed.
    Unchanged,
    /// Synchronizing the table failed; the run continued.
    Failed {
        /// Error text.
        reason: String,
    },
}

/// Outcome for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    /// Table name.
    pub table: String,
    /// What happened.
    pub outcome: TableOutcome,
    /// Undeclared live columns left in place.
    pub kept_columns: Vec<String>,
}

/// Result of one synchronization run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Per-table outcomes in execution order.
    pub tables: Vec<TableReport>,
    /// Cache cleanups that ran.
    pub caches: Vec<CacheCleanup>,
    /// DDL statements executed.
    pub ddl_statements: usize,
}

impl SyncReport {
    /// Whether every table and cache cleanup succeeded.
    pub fn is_success(&self) -> bool {
        self.failed().is_empty() && self.caches.iter().all(|c| c.error.is_none())
    }

    /// Tables that failed.
    pub fn failed(&self) -> Vec<&TableReport> {
        self.tables
            .iter()
            .filter(|t| matches!(t.outcome, TableOutcome::Failed { .. }))
            .collect()
    }

    /// Outcome for a table.
    pub fn outcome(&self, table: &str) -> Option<&TableOutcome> {
        self.tables
            .iter()
            .find(|t| t.table == table)
            .map(|t| &t.outcome)
    }

    /// Cache cleanup for a table.
    pub fn cache(&self, table: &str) -> Option<&CacheCleanup> {
        self.caches.iter().find(|c| c.table == table)
    }
}

/// Reconciles a [`SchemaRegistry`] against a live database.
pub struct SchemaSynchronizer<'a> {
    registry: &'a SchemaRegistry,
    db: &'a Database,
    config: SyncConfig,
}

impl<'a> SchemaSynchronizer<'a> {
    /// Create a synchronizer with the default configuration.
    pub fn new(registry: &'a SchemaRegistry, db: &'a Database) -> Self {
        Self::with_config(registry, db, SyncConfig::default())
    }

    /// Create a synchronizer with an explicit configuration.
    pub fn with_config(registry: &'a SchemaRegistry, db: &'a Database, config: SyncConfig) -> Self {
        Self {
            registry,
            db,
            config,
        }
    }

    /// Tables in synchronization order: entity tables by dependency, then junctions.
    fn ordered_tables(&self) -> Vec<&'a TableDescriptor> {
        let mut tables = self.registry.dependency_order();
        tables.extend(self.registry.junctions().map(|j| &j.table));
        tables
    }

    /// Compute what a run would do, without touching the database.
    pub fn plan(&self) -> Result<SyncPlan> {
        self.plan_with(&self.db.inspector())
    }

    /// [`plan`](Self::plan) against an explicit inspector.
    pub fn plan_with(&self, inspector: &dyn SchemaInspector) -> Result<SyncPlan> {
        self.registry.ensure_built()?;
        let mut plan = SyncPlan::default();
        for table in self.ordered_tables() {
            plan.tables.push(self.plan_table(inspector, table)?);
        }
        Ok(plan)
    }

    /// Synchronize every table, then run cache cleanups.
    pub fn synchronize(&self) -> Result<SyncReport> {
        self.synchronize_with(&self.db.inspector())
    }

    /// [`synchronize`](Self::synchronize) against an explicit inspector.
    ///
    /// Fails only on configuration errors; per-table failures are recorded in
    /// the report and the run continues.
    pub fn synchronize_with(&self, inspector: &dyn SchemaInspector) -> Result<SyncReport> {
        self.registry.ensure_built()?;
        let mut report = SyncReport::default();

        for table in self.ordered_tables() {
            let result = self
                .plan_table(inspector, table)
                .and_then(|plan| self.apply(inspector, table, plan, &mut report.ddl_statements));
            let (outcome, kept_columns) = match result {
                Ok(done) => done,
                Err(e) => {
                    tracing::error!(
                        table = %table.name,
                        error = %e,
                        "table synchronization failed"
                    );
                    (
                        TableOutcome::Failed {
                            reason: e.to_string(),
                        },
                        Vec::new(),
                    )
                }
            };
            report.tables.push(TableReport {
                table: table.name.clone(),
                outcome,
                kept_columns,
            });
        }

        if self.config.clean_caches {
            for table in self.registry.tables() {
                if table.cache.is_none()
                    || matches!(report.outcome(&table.name), Some(TableOutcome::Failed { .. }))
                {
                    continue;
                }
                match cache::cleanup(self.db, table) {
                    Ok(Some(cleanup)) => report.caches.push(cleanup),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::error!(table = %table.name, error = %e, "cache cleanup failed");
                        report.caches.push(CacheCleanup {
                            table: table.name.clone(),
                            error: Some(e.to_string()),
                            ..CacheCleanup::default()
                        });
                    }
                }
            }
        }

        tracing::info!(
            tables = report.tables.len(),
            ddl = report.ddl_statements,
            failed = report.failed().len(),
            "schema synchronized"
        );
        Ok(report)
    }

    fn plan_table(
        &self,
        inspector: &dyn SchemaInspector,
        table: &TableDescriptor,
    ) -> Result<TablePlan> {
        let plan = |action: TableAction, kept_columns: Vec<String>| TablePlan {
            table: table.name.clone(),
            action,
            kept_columns,
        };

        if !inspector.table_exists(&table.name)? {
            return Ok(plan(TableAction::Create, Vec::new()));
        }

        let live: Vec<String> = inspector
            .list_columns(&table.name)?
            .into_iter()
            .map(|c| c.name)
            .collect();
        let missing: Vec<&ColumnDescriptor> = table
            .columns
            .iter()
            .filter(|c| !live.contains(&c.name))
            .collect();
        let extra: Vec<String> = discarded_columns(table, &live)
            .into_iter()
            .map(String::from)
            .collect();

        let not_addable: Vec<String> = missing
            .iter()
            .filter(|c| !c.can_add_in_place())
            .map(|c| c.name.clone())
            .collect();
        if !not_addable.is_empty() {
            return Ok(plan(
                TableAction::Rebuild {
                    reason: RebuildReason::ColumnsNotAddable(not_addable),
                },
                Vec::new(),
            ));
        }

        let add: Vec<String> = missing.iter().map(|c| c.name.clone()).collect();

        if !extra.is_empty() {
            if self.config.drop_policy.should_drop_columns(&table.name, &extra) {
                return Ok(plan(
                    TableAction::Rebuild {
                        reason: RebuildReason::DroppedColumns(extra),
                    },
                    Vec::new(),
                ));
            }
            tracing::warn!(
                table = %table.name,
                columns = ?extra,
                "live table has undeclared columns; leaving them in place"
            );
            let action = if add.is_empty() {
                TableAction::Unchanged
            } else {
                TableAction::AddColumns { columns: add }
            };
            return Ok(plan(action, extra));
        }

        let rendered = table.create_statement()?;
        let stored = inspector
            .stored_create_statement(&table.name)?
            .unwrap_or_default();

        if !add.is_empty() {
            let mut definitions = Vec::with_capacity(missing.len());
            for column in &missing {
                definitions.push(column.definition()?);
            }
            let predicted = stored_after_alter(&stored, &definitions);
            let action = if predicted.is_some_and(|p| same_definition(&p, &rendered)) {
                TableAction::AddColumns { columns: add }
            } else {
                TableAction::Rebuild {
                    reason: RebuildReason::DefinitionChanged,
                }
            };
            return Ok(plan(action, Vec::new()));
        }

        if same_definition(&stored, &rendered) {
            Ok(plan(TableAction::Unchanged, Vec::new()))
        } else {
            tracing::debug!(
                table = %table.name,
                stored = %stored,
                rendered = %rendered,
                "definition drift"
            );
            Ok(plan(
                TableAction::Rebuild {
                    reason: RebuildReason::DefinitionChanged,
                },
                Vec::new(),
            ))
        }
    }

    fn apply(
        &self,
        inspector: &dyn SchemaInspector,
        table: &TableDescriptor,
        plan: TablePlan,
        ddl: &mut usize,
    ) -> Result<(TableOutcome, Vec<String>)> {
        let executor = self.db.executor();
        let outcome = match plan.action {
            TableAction::Create => {
                tracing::info!(table = %table.name, "creating table");
                executor.execute_sql(&table.create_statement()?)?;
                *ddl += 1;
                TableOutcome::Created
            }
            TableAction::AddColumns { columns } => {
                for name in &columns {
                    let Some(column) = table.column(name) else {
                        continue;
                    };
                    tracing::info!(table = %table.name, column = %name, "adding column");
                    executor.execute_sql(&format!(
                        "ALTER TABLE {} ADD COLUMN {}",
                        quote_ident(&table.name),
                        column.definition()?
                    ))?;
                    *ddl += 1;
                }

                let stored = inspector
                    .stored_create_statement(&table.name)?
                    .unwrap_or_default();
                if plan.kept_columns.is_empty()
                    && !same_definition(&stored, &table.create_statement()?)
                {
                    tracing::info!(
                        table = %table.name,
                        "definition still differs after ALTER; rebuilding"
                    );
                    let rows = rebuild_table(self.db, table)?;
                    *ddl += 2;
                    TableOutcome::Rebuilt { rows }
                } else {
                    TableOutcome::Altered { added: columns }
                }
            }
            TableAction::Rebuild { reason } => {
                tracing::info!(table = %table.name, reason = %reason, "rebuilding table");
                let rows = rebuild_table(self.db, table)?;
                *ddl += 2;
                TableOutcome::Rebuilt { rows }
            }
            TableAction::Unchanged => TableOutcome::Unchanged,
        };
        Ok((outcome, plan.kept_columns))
    }
}

/// The text SQLite stores after `ALTER TABLE ADD COLUMN`: each definition is
/// spliced in after the last column, ahead of any table constraint.
fn stored_after_alter(stored: &str, definitions: &[String]) -> Option<String> {
    let at = match stored.to_ascii_lowercase().find(", foreign key") {
        Some(at) => at,
        None => stored.rfind(')')?,
    };
    Some(format!(
        "{}, {}{}",
        &stored[..at],
        definitions.join(", "),
        &stored[at..]
    ))
}

/// Whether two CREATE TABLE statements describe the same table.
fn same_definition(stored: &str, rendered: &str) -> bool {
    normalize_ddl(stored) == normalize_ddl(rendered)
}

/// Canonical form of a CREATE TABLE statement for comparison.
///
/// Drops `IF NOT EXISTS` and a trailing semicolon, collapses whitespace,
/// removes spacing around punctuation, and lowercases keywords. Quoted
/// identifiers and string literals are kept verbatim.
pub fn normalize_ddl(sql: &str) -> String {
    let is_punct = |c: char| matches!(c, '(' | ')' | ',' | ';' | '=');
    let mut out = String::with_capacity(sql.len());
    let mut quote: Option<char> = None;
    let mut pending_space = false;

    for c in sql.chars() {
        if let Some(close) = quote {
            out.push(c);
            if c == close {
                quote = None;
            }
            continue;
        }
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            pending_space = false;
            if !out.chars().last().map_or(true, is_punct) && !is_punct(c) {
                out.push(' ');
            }
        }
        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '[' => quote = Some(']'),
            _ => {}
        }
        out.extend(c.to_lowercase());
    }

    let out = match out.strip_prefix("create table if not exists ") {
        Some(rest) => format!("create table {}", rest),
        None => out,
    };
    out.trim_end_matches(';').to_string()
}
