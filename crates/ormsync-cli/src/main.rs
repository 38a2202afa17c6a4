//! ormsync command-line client
//!
//! Synchronizes a SQLite database against a JSON schema manifest and
//! inspects its tables.

mod formatter;

use clap::{Parser, Subcommand};
use formatter::{Formatter, OutputFormat};
use ormsync_core::catalog::quote_ident;
use ormsync_core::sync::{AlwaysDrop, NeverDrop};
use ormsync_core::{
    Database, SchemaInspector, SchemaRegistry, SchemaSynchronizer, Statement, SyncConfig,
};
use std::path::{Path, PathBuf};

/// ormsync command-line client
#[derive(Parser, Debug)]
#[command(name = "ormsync")]
#[command(version, about = "Schema-synchronizing ORM over SQLite")]
pub struct Args {
    /// SQLite database file
    #[arg(long, default_value = "ormsync.db")]
    pub db: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", value_enum, global = true)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bring the database in line with a schema manifest
    Sync {
        /// JSON schema manifest
        #[arg(long)]
        schema: PathBuf,

        /// Rebuild tables to drop columns the manifest no longer declares
        #[arg(long)]
        drop_columns: bool,

        /// Report planned changes without executing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// List the tables in the database
    Tables,
    /// Print every row of a table
    Dump {
        /// Table name
        table: String,
    },
}

impl Command {
    /// Whether the command leaves the database untouched.
    fn is_read_only(&self) -> bool {
        match self {
            Command::Sync { dry_run, .. } => *dry_run,
            Command::Tables | Command::Dump { .. } => true,
        }
    }
}

fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ormsync=info,ormsync_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_database(&args.db, args.command.is_read_only())?;
    let formatter = formatter::create_formatter(args.format);

    match args.command {
        Command::Sync {
            schema,
            drop_columns,
            dry_run,
        } => run_sync(&db, &schema, drop_columns, dry_run, &*formatter),
        Command::Tables => {
            let tables = db.inspector().list_tables()?;
            println!("{}", formatter.format_tables(&tables));
            Ok(())
        }
        Command::Dump { table } => {
            if !db.inspector().table_exists(&table)? {
                return Err(format!("no such table: {}", table).into());
            }
            let rows = db
                .executor()
                .query(&Statement::new(format!("SELECT * FROM {}", quote_ident(&table))))?;
            println!("{}", formatter.format_rows(&rows));
            Ok(())
        }
    }
}

/// Open the database file. Read-only commands refuse a missing file
/// instead of creating an empty one.
fn open_database(path: &Path, read_only: bool) -> Result<Database, Box<dyn std::error::Error>> {
    if read_only && !path.exists() {
        return Err(format!("database file not found: {}", path.display()).into());
    }
    Ok(Database::open_file(path)?)
}

/// Synchronize against a manifest, or print the plan on a dry run.
fn run_sync(
    db: &Database,
    schema: &Path,
    drop_columns: bool,
    dry_run: bool,
    formatter: &dyn Formatter,
) -> Result<(), Box<dyn std::error::Error>> {
    let manifest = std::fs::read_to_string(schema)?;
    let registry = SchemaRegistry::from_manifest_json(&manifest)?;

    let config = if drop_columns {
        SyncConfig::default().with_drop_policy(AlwaysDrop)
    } else {
        SyncConfig::default().with_drop_policy(NeverDrop)
    };
    let synchronizer = SchemaSynchronizer::with_config(&registry, db, config);

    if dry_run {
        let plan = synchronizer.plan()?;
        println!("{}", formatter.format_plan(&plan));
        return Ok(());
    }

    let report = synchronizer.synchronize()?;
    println!("{}", formatter.format_report(&report));
    if !report.is_success() {
        return Err(format!("{} table(s) failed to synchronize", report.failed().len()).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_does_not_create_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.db");

        let args = Args::parse_from([
            "ormsync",
            "--db",
            path.to_str().unwrap(),
            "sync",
            "--schema",
            "schema.json",
            "--dry-run",
        ]);
        assert!(args.command.is_read_only());

        let err = run(args).unwrap_err();
        assert!(err.to_string().contains("database file not found"));
        assert!(!path.exists());
    }

    #[test]
    fn test_tables_on_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.db");

        assert!(open_database(&path, true).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_sync_creates_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.db");

        let args = Args::parse_from([
            "ormsync",
            "--db",
            path.to_str().unwrap(),
            "sync",
            "--schema",
            "schema.json",
        ]);
        assert!(!args.command.is_read_only());

        open_database(&path, false).unwrap();
        assert!(path.exists());
    }
}
