//! Database handles.
//!
//! A [`Database`] is an explicitly constructed handle to one SQLite database.
//! Statements open a connection per call; several named databases live side
//! by side in a [`DatabaseRegistry`].

use crate::error::{Error, Result};
use crate::query::StatementExecutor;
use crate::sync::SqliteInspector;
use dashmap::DashMap;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default busy timeout for each connection.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    /// A database file.
    File(PathBuf),
    /// A named in-memory database shared by every connection of this handle.
    Memory(String),
}

impl DatabaseLocation {
    fn open_target(&self) -> String {
        match self {
            DatabaseLocation::File(path) => path.to_string_lossy().into_owned(),
            DatabaseLocation::Memory(name) => format!("file:{}?mode=memory&cache=shared", name),
        }
    }
}

impl fmt::Display for DatabaseLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseLocation::File(path) => write!(f, "{}", path.display()),
            DatabaseLocation::Memory(name) => write!(f, "memory:{}", name),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database location.
    pub location: DatabaseLocation,
    /// How long a connection waits on a locked database.
    pub busy_timeout: Duration,
    /// Whether SQLite enforces FOREIGN KEY constraints.
    ///
    /// Off by default: schema rebuilds drop and recreate referenced tables.
    pub foreign_keys: bool,
}

impl DatabaseConfig {
    /// Configuration for a database file.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: DatabaseLocation::File(path.into()),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            foreign_keys: false,
        }
    }

    /// Configuration for a named in-memory database.
    pub fn memory(name: impl Into<String>) -> Self {
        Self {
            location: DatabaseLocation::Memory(name.into()),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            foreign_keys: false,
        }
    }

    /// Set the busy timeout.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Enable or disable FOREIGN KEY enforcement.
    pub fn with_foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }
}

/// Handle to one SQLite database.
pub struct Database {
    config: DatabaseConfig,
    /// Keeps in-memory databases alive between per-call connections.
    _anchor: Option<Mutex<Connection>>,
}

impl Database {
    /// Open a database, verifying that a connection can be established.
    pub fn open(config: DatabaseConfig) -> Result<Self> {
        let mut db = Self {
            config,
            _anchor: None,
        };
        let conn = db.connect()?;
        if matches!(db.config.location, DatabaseLocation::Memory(_)) {
            db._anchor = Some(Mutex::new(conn));
        }
        tracing::debug!(location = %db.config.location, "database opened");
        Ok(db)
    }

    /// Open a database file.
    pub fn open_file(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open(DatabaseConfig::file(path))
    }

    /// Open a named in-memory database.
    pub fn open_in_memory(name: impl Into<String>) -> Result<Self> {
        Self::open(DatabaseConfig::memory(name))
    }

    /// The configuration this handle was opened with.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Open a fresh connection with this handle's pragmas applied.
    pub fn connect(&self) -> Result<Connection> {
        let location = &self.config.location;
        let open_err = |source| Error::Open {
            location: location.to_string(),
            source,
        };

        let conn = Connection::open(location.open_target()).map_err(open_err)?;
        conn.busy_timeout(self.config.busy_timeout)
            .map_err(open_err)?;
        conn.pragma_update(None, "foreign_keys", self.config.foreign_keys)
            .map_err(open_err)?;
        Ok(conn)
    }

    /// Statement executor bound to this database.
    pub fn executor(&self) -> StatementExecutor<'_> {
        StatementExecutor::new(self)
    }

    /// Live-schema inspector bound to this database.
    pub fn inspector(&self) -> SqliteInspector<'_> {
        SqliteInspector::new(self)
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Named database handles.
#[derive(Debug, Default)]
pub struct DatabaseRegistry {
    handles: DashMap<String, Arc<Database>>,
}

impl DatabaseRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a database and register it under `name`, replacing any previous handle.
    pub fn open(&self, name: impl Into<String>, config: DatabaseConfig) -> Result<Arc<Database>> {
        let db = Arc::new(Database::open(config)?);
        self.handles.insert(name.into(), Arc::clone(&db));
        Ok(db)
    }

    /// Register an existing handle. Returns the handle it replaced.
    pub fn insert(&self, name: impl Into<String>, db: Arc<Database>) -> Option<Arc<Database>> {
        self.handles.insert(name.into(), db)
    }

    /// Get a handle by name.
    pub fn get(&self, name: &str) -> Option<Arc<Database>> {
        self.handles.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove a handle.
    pub fn remove(&self, name: &str) -> Option<Arc<Database>> {
        self.handles.remove(name).map(|(_, db)| db)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handles.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
