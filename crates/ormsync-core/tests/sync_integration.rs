//! Integration tests for schema synchronization.

use ormsync_core::catalog::{format_timestamp, TimestampEncoder};
use ormsync_core::sync::{AlwaysDrop, RebuildReason, TableAction};
use ormsync_core::{
    CachePolicy, ColumnDescriptor, Database, DatabaseConfig, Entity, EntityBinder,
    ForeignKeyDescriptor, SchemaInspector,
    SchemaRegistry, SchemaSynchronizer, Statement, StorageType, SyncConfig, SyncReport,
    TableDescriptor, TableOutcome, Value,
};

struct TestContext {
    db: Database,
    _dir: tempfile::TempDir,
}

impl TestContext {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_file(dir.path().join("sync.db")).unwrap();
        Self { db, _dir: dir }
    }

    fn with_foreign_keys() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig::file(dir.path().join("sync.db")).with_foreign_keys(true);
        let db = Database::open(config).unwrap();
        Self { db, _dir: dir }
    }

    fn sync(&self, registry: &SchemaRegistry) -> SyncReport {
        SchemaSynchronizer::new(registry, &self.db)
            .synchronize()
            .unwrap()
    }

    fn sync_with(&self, registry: &SchemaRegistry, config: SyncConfig) -> SyncReport {
        SchemaSynchronizer::with_config(registry, &self.db, config)
            .synchronize()
            .unwrap()
    }

    fn columns(&self, table: &str) -> Vec<String> {
        self.db
            .inspector()
            .list_columns(table)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect()
    }

    fn exec(&self, sql: &str) {
        self.db.executor().execute_sql(sql).unwrap();
    }

    fn count(&self, table: &str) -> i64 {
        self.db
            .executor()
            .query_scalar(&Statement::new(format!("SELECT COUNT(*) FROM \"{}\"", table)))
            .unwrap()
            .unwrap()
    }
}

fn user_table() -> TableDescriptor {
    TableDescriptor::new("user")
        .with_column(ColumnDescriptor::primary_key("id"))
        .with_column(ColumnDescriptor::required("name", StorageType::Text))
        .with_column(ColumnDescriptor::required("password", StorageType::Text))
}

fn registry_of(tables: Vec<TableDescriptor>) -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    for table in tables {
        registry.register(table).unwrap();
    }
    registry.build_junctions().unwrap();
    registry
}

fn blog_registry() -> SchemaRegistry {
    let profile = TableDescriptor::new("profile")
        .with_column(ColumnDescriptor::primary_key("id"))
        .with_column(ColumnDescriptor::new("bio", StorageType::Text));
    let post = TableDescriptor::new("post")
        .with_column(ColumnDescriptor::primary_key("id"))
        .with_column(ColumnDescriptor::required("title", StorageType::Text))
        .with_column(
            ColumnDescriptor::new("published", StorageType::Boolean).with_default(false),
        );
    let user = user_table()
        .with_column(ColumnDescriptor::new("email", StorageType::Text).unique())
        .with_foreign_key(ForeignKeyDescriptor::one_to_one("profile", "profile"))
        .with_foreign_key(ForeignKeyDescriptor::one_to_many("posts", "post"))
        .with_foreign_key(ForeignKeyDescriptor::many_to_many("friends", "user"));
    let session = TableDescriptor::new("session")
        .with_column(ColumnDescriptor::primary_key("id"))
        .with_column(ColumnDescriptor::new("token", StorageType::Text))
        .with_cache(CachePolicy::DeleteOnLoad);

    registry_of(vec![user, post, profile, session])
}

#[test]
fn test_fresh_database_gets_every_table() {
    let ctx = TestContext::new();
    let report = ctx.sync(&blog_registry());

    assert!(report.is_success());
    let tables = ctx.db.inspector().list_tables().unwrap();
    for expected in ["user", "post", "profile", "session", "user_posts", "user_friends"] {
        assert!(tables.contains(&expected.to_string()), "missing {expected}");
    }
    assert_eq!(report.ddl_statements, 6);

    // Entity tables without relations come before their dependents, junctions last.
    let order: Vec<&str> = report.tables.iter().map(|t| t.table.as_str()).collect();
    let pos = |name: &str| order.iter().position(|t| *t == name).unwrap();
    assert!(pos("profile") < pos("user"));
    assert!(pos("user") < pos("user_posts"));

    assert_eq!(ctx.columns("user_friends"), vec!["id", "user_id_1", "user_id_2"]);
    assert_eq!(ctx.columns("user_posts"), vec!["id", "user_id", "post_id"]);
    assert!(ctx.columns("user").contains(&"profile_id".to_string()));
}

#[test]
fn test_second_run_is_idempotent() {
    let ctx = TestContext::new();
    let registry = blog_registry();
    ctx.sync(&registry);

    let second = ctx.sync(&registry);
    assert!(second.is_success());
    assert_eq!(second.ddl_statements, 0);
    assert!(second
        .tables
        .iter()
        .all(|t| t.outcome == TableOutcome::Unchanged));

    let plan = SchemaSynchronizer::new(&registry, &ctx.db).plan().unwrap();
    assert!(plan.is_noop());
}

#[test]
fn test_drift_add_column_in_place() {
    let ctx = TestContext::new();
    ctx.sync(&registry_of(vec![user_table()]));
    ctx.exec("INSERT INTO \"user\" (\"name\", \"password\") VALUES ('Jon Doe', 'Abc123')");

    let v2 = registry_of(vec![
        user_table().with_column(ColumnDescriptor::new("email", StorageType::Text))
    ]);
    let report = ctx.sync(&v2);

    assert_eq!(
        report.outcome("user"),
        Some(&TableOutcome::Altered {
            added: vec!["email".to_string()]
        })
    );
    assert_eq!(report.ddl_statements, 1);
    assert_eq!(ctx.columns("user"), vec!["id", "name", "password", "email"]);
    assert_eq!(ctx.count("user"), 1);

    // The stored definition now matches; nothing more to do.
    assert_eq!(ctx.sync(&v2).ddl_statements, 0);
}

#[test]
fn test_drift_keep_extra_column_with_never_drop() {
    let ctx = TestContext::new();
    ctx.exec(
        "CREATE TABLE \"user\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL, \
         \"name\" TEXT NOT NULL, \"password\" TEXT NOT NULL, \"legacy\" TEXT)",
    );

    let report = ctx.sync(&registry_of(vec![user_table()]));

    assert!(report.is_success());
    assert_eq!(report.outcome("user"), Some(&TableOutcome::Unchanged));
    assert_eq!(report.tables[0].kept_columns, vec!["legacy".to_string()]);
    assert_eq!(report.ddl_statements, 0);
    assert!(ctx.columns("user").contains(&"legacy".to_string()));
}

#[test]
fn test_drop_policy_accepting_rebuilds_and_keeps_rows() {
    let ctx = TestContext::new();
    ctx.exec(
        "CREATE TABLE \"user\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL, \
         \"name\" TEXT NOT NULL, \"password\" TEXT NOT NULL, \"legacy\" TEXT); \
         INSERT INTO \"user\" (\"name\", \"password\", \"legacy\") VALUES ('Jon Doe', 'Abc123', 'x');",
    );
    let registry = registry_of(vec![user_table()]);

    let plan = SchemaSynchronizer::with_config(
        &registry,
        &ctx.db,
        SyncConfig::default().with_drop_policy(AlwaysDrop),
    )
    .plan()
    .unwrap();
    assert_eq!(
        plan.tables[0].action,
        TableAction::Rebuild {
            reason: RebuildReason::DroppedColumns(vec!["legacy".to_string()])
        }
    );

    let report = ctx.sync_with(&registry, SyncConfig::default().with_drop_policy(AlwaysDrop));
    assert_eq!(report.outcome("user"), Some(&TableOutcome::Rebuilt { rows: 1 }));
    assert_eq!(ctx.columns("user"), vec!["id", "name", "password"]);

    let rows = ctx
        .db
        .executor()
        .query(&Statement::new("SELECT \"name\" FROM \"user\""))
        .unwrap();
    assert_eq!(rows.rows[0].get("name"), Some(&Value::Text("Jon Doe".into())));
}

#[test]
fn test_unaddable_column_forces_rebuild_with_backfill() {
    let ctx = TestContext::new();
    ctx.sync(&registry_of(vec![user_table()]));
    ctx.exec("INSERT INTO \"user\" (\"name\", \"password\") VALUES ('Jon Doe', 'Abc123')");

    // NOT NULL without default cannot be added with ALTER TABLE.
    let v2 = registry_of(vec![
        user_table().with_column(ColumnDescriptor::required("age", StorageType::Integer))
    ]);
    let report = ctx.sync(&v2);

    assert_eq!(report.outcome("user"), Some(&TableOutcome::Rebuilt { rows: 1 }));
    let rows = ctx
        .db
        .executor()
        .query(&Statement::new("SELECT \"age\", \"name\" FROM \"user\""))
        .unwrap();
    assert_eq!(rows.rows[0].get_i64("age"), Some(0));
    assert_eq!(rows.rows[0].get("name"), Some(&Value::Text("Jon Doe".into())));
    assert_eq!(ctx.sync(&v2).ddl_statements, 0);
}

#[test]
fn test_rebuild_with_foreign_keys_enforced() {
    let ctx = TestContext::with_foreign_keys();
    let post = TableDescriptor::new("post")
        .with_column(ColumnDescriptor::primary_key("id"))
        .with_column(ColumnDescriptor::required("title", StorageType::Text));
    let author = || {
        user_table().with_foreign_key(ForeignKeyDescriptor::one_to_many("posts", "post"))
    };

    let v1 = registry_of(vec![author(), post.clone()]);
    ctx.sync(&v1);
    let mut jon = Entity::new("user")
        .with("name", "Jon Doe")
        .with("password", "Abc123");
    jon.push_many("posts", Entity::new("post").with("title", "hello"));
    assert!(EntityBinder::new(&v1, &ctx.db).save(&mut jon).unwrap().is_success());

    // A UNIQUE column cannot be added in place, so the referenced table is rebuilt.
    let v2 = registry_of(vec![
        author().with_column(ColumnDescriptor::new("email", StorageType::Text).unique()),
        post,
    ]);
    let report = ctx.sync(&v2);
    assert_eq!(report.outcome("user"), Some(&TableOutcome::Rebuilt { rows: 1 }));

    let loaded = EntityBinder::new(&v2, &ctx.db)
        .load("user", jon.id())
        .unwrap()
        .unwrap();
    assert_eq!(loaded.many("posts").len(), 1);
    assert_eq!(ctx.count("user_posts"), 1);

    // Enforcement is back on for regular traffic.
    let orphan = ctx.db.executor().execute(&Statement::new(
        "INSERT INTO \"user_posts\" (\"user_id\", \"post_id\") VALUES (99, 99)",
    ));
    assert!(orphan.is_err());
}

#[test]
fn test_changed_definition_rebuilds() {
    let ctx = TestContext::new();
    ctx.exec(
        "CREATE TABLE \"user\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL, \
         \"name\" TEXT, \"password\" TEXT NOT NULL)",
    );

    let registry = registry_of(vec![user_table()]);
    let report = ctx.sync(&registry);

    assert!(matches!(report.outcome("user"), Some(TableOutcome::Rebuilt { .. })));
    assert_eq!(ctx.sync(&registry).ddl_statements, 0);
}

#[test]
fn test_dry_run_plan_touches_nothing() {
    let ctx = TestContext::new();
    let registry = blog_registry();
    let plan = SchemaSynchronizer::new(&registry, &ctx.db).plan().unwrap();

    assert!(plan.tables.iter().all(|t| t.action == TableAction::Create));
    assert!(ctx.db.inspector().list_tables().unwrap().is_empty());
}

#[test]
fn test_failed_table_does_not_stop_the_run() {
    let ctx = TestContext::new();
    // Duplicate codes make the rebuild into a UNIQUE column fail.
    ctx.exec(
        "CREATE TABLE \"broken\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL, \"code\" TEXT); \
         INSERT INTO \"broken\" (\"code\") VALUES ('x'), ('x');",
    );

    let broken = TableDescriptor::new("broken")
        .with_column(ColumnDescriptor::primary_key("id"))
        .with_column(ColumnDescriptor::new("code", StorageType::Text).unique());
    let report = ctx.sync(&registry_of(vec![broken, user_table()]));

    assert!(!report.is_success());
    assert_eq!(report.failed().len(), 1);
    assert!(matches!(report.outcome("broken"), Some(TableOutcome::Failed { .. })));
    assert_eq!(report.outcome("user"), Some(&TableOutcome::Created));

    // The failed rebuild rolled back; the old rows are still there.
    assert_eq!(ctx.count("broken"), 2);
}

#[test]
fn test_cache_delete_on_load() {
    let ctx = TestContext::new();
    let registry = blog_registry();
    ctx.sync(&registry);
    ctx.exec("INSERT INTO \"session\" (\"token\") VALUES ('a'), ('b'), ('c')");

    let report = ctx.sync(&registry);
    assert_eq!(report.cache("session").map(|c| c.deleted), Some(3));
    assert_eq!(ctx.count("session"), 0);
}

#[test]
fn test_cache_delete_expired() {
    let ctx = TestContext::new();
    let token = TableDescriptor::new("token")
        .with_column(ColumnDescriptor::primary_key("id"))
        .with_column(
            ColumnDescriptor::new("expires_at", StorageType::Text).with_encoder(TimestampEncoder),
        )
        .with_cache(CachePolicy::DeleteExpired {
            expiry_column: "expires_at".into(),
        });
    let registry = registry_of(vec![token]);
    ctx.sync(&registry);

    let now = chrono::Utc::now().timestamp_millis();
    for offset in [-3_600_000, 3_600_000, -60_000] {
        ctx.db
            .executor()
            .execute(&Statement::with_params(
                "INSERT INTO \"token\" (\"expires_at\") VALUES (?1)",
                vec![Value::Text(format_timestamp(now + offset).unwrap())],
            ))
            .unwrap();
    }

    let report = ctx.sync(&registry);
    let cleanup = report.cache("token").unwrap();
    assert_eq!(cleanup.deleted, 2);
    assert_eq!(cleanup.unparsable, 0);
    assert_eq!(ctx.count("token"), 1);
}
