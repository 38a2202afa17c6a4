//! Entity binder: moves entity graphs in and out of the database.
//!
//! Loads decode rows through column encoders and follow relations
//! recursively. Saves cascade to related entities first, write the primary
//! row, then replace junction rows. Write failures come back as a
//! [`SaveOutcome`]; only configuration problems and missing required columns
//! are returned as errors.

use crate::catalog::{ColumnDescriptor, RelationKind, SchemaRegistry, TableDescriptor};
use crate::database::Database;
use crate::entity::{Entity, Model, Related};
use crate::error::{ConfigError, Error, Result};
use crate::query::{Batch, Condition, Projection, QueryBuilder, Row};
use crate::value::Value;
use std::any::type_name;

/// Default depth limit for recursive loads.
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// How new primary keys are assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdAllocation {
    /// Let SQLite assign the id and read it back from `last_insert_rowid`.
    #[default]
    EngineAutoincrement,
    /// Read `MAX(id)` and insert `max + 1` explicitly.
    ///
    /// Not atomic: two concurrent saves of new entities of one type can pick
    /// the same id, and the second insert fails. Callers must serialize saves.
    ScanMaxPlusOne,
}

/// Binder configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinderConfig {
    /// Relations deeper than this are bound shallow (scalars only).
    pub max_depth: usize,
    /// Id assignment strategy.
    pub id_allocation: IdAllocation,
}

impl Default for BinderConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            id_allocation: IdAllocation::EngineAutoincrement,
        }
    }
}

impl BinderConfig {
    /// Set the depth limit.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set the id allocation strategy.
    pub fn with_id_allocation(mut self, allocation: IdAllocation) -> Self {
        self.id_allocation = allocation;
        self
    }
}

/// Result of a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Everything was written.
    Success,
    /// The binder has no database attached; nothing was written.
    NotUsingDatabase,
    /// The entity's own row could not be written.
    PrimaryWriteFailed,
    /// The row was written but a related entity or junction row was not.
    RelatedWriteFailed,
}

impl SaveOutcome {
    /// Whether the save fully succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, SaveOutcome::Success)
    }
}

/// Translates between entities and rows.
pub struct EntityBinder<'a> {
    registry: &'a SchemaRegistry,
    db: Option<&'a Database>,
    config: BinderConfig,
}

impl<'a> EntityBinder<'a> {
    /// Create a binder over a registry and database.
    pub fn new(registry: &'a SchemaRegistry, db: &'a Database) -> Self {
        Self {
            registry,
            db: Some(db),
            config: BinderConfig::default(),
        }
    }

    /// Create a binder with no database. Saves report
    /// [`SaveOutcome::NotUsingDatabase`]; loads fail with [`Error::NotUsingDatabase`].
    pub fn detached(registry: &'a SchemaRegistry) -> Self {
        Self {
            registry,
            db: None,
            config: BinderConfig::default(),
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: BinderConfig) -> Self {
        self.config = config;
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &BinderConfig {
        &self.config
    }

    /// Whether a database is attached.
    pub fn is_using_database(&self) -> bool {
        self.db.is_some()
    }

    fn database(&self) -> Result<&'a Database> {
        self.db.ok_or(Error::NotUsingDatabase)
    }

    fn table(&self, name: &str) -> Result<&'a TableDescriptor> {
        self.registry.ensure_built()?;
        self.registry.require_table(name)
    }

    fn primary_key<'t>(table: &'t TableDescriptor, purpose: &str) -> Result<&'t ColumnDescriptor> {
        table.primary_key().ok_or_else(|| {
            ConfigError::MissingPrimaryKey {
                table: table.name.clone(),
                relation: purpose.to_string(),
            }
            .into()
        })
    }

    // -------------------------------------------------------------------------
    // Loading
    // -------------------------------------------------------------------------

    /// Load one entity by primary key, following its relations.
    pub fn load(&self, table: &str, id: i64) -> Result<Option<Entity>> {
        let db = self.database()?;
        let table = self.table(table)?;
        Self::primary_key(table, "load by id")?;
        self.load_by_id(db, table, id, &mut Vec::new(), 0)
    }

    /// Load every entity matching all conditions, in primary key order.
    pub fn load_where(&self, table: &str, conditions: &[Condition]) -> Result<Vec<Entity>> {
        let db = self.database()?;
        let table = self.table(table)?;
        let builder = QueryBuilder::new(table);
        let statement = match table.primary_key() {
            Some(pk) => builder.select_ordered(&Projection::All, conditions, &pk.name)?,
            None => builder.select(&Projection::All, conditions)?,
        };
        let rows = db.executor().query(&statement)?;
        rows.iter()
            .map(|row| self.bind(db, table, row, &mut Vec::new(), 0))
            .collect()
    }

    /// Load every entity of a table.
    pub fn load_all(&self, table: &str) -> Result<Vec<Entity>> {
        self.load_where(table, &[])
    }

    /// Bind an already fetched row, following relations.
    pub fn bind_row(&self, table: &str, row: &Row) -> Result<Entity> {
        let db = self.database()?;
        let table = self.table(table)?;
        self.bind(db, table, row, &mut Vec::new(), 0)
    }

    /// Number of rows matching all conditions.
    pub fn count(&self, table: &str, conditions: &[Condition]) -> Result<i64> {
        let db = self.database()?;
        let table = self.table(table)?;
        let statement = QueryBuilder::new(table).count(conditions)?;
        Ok(db.executor().query_scalar(&statement)?.unwrap_or(0))
    }

    /// Largest primary key in a table (0 when empty).
    pub fn max_id(&self, table: &str) -> Result<i64> {
        let db = self.database()?;
        let table = self.table(table)?;
        let pk = Self::primary_key(table, "max id")?;
        let statement = QueryBuilder::new(table).max(&pk.name)?;
        Ok(db.executor().query_scalar(&statement)?.unwrap_or(0))
    }

    fn load_by_id(
        &self,
        db: &Database,
        table: &TableDescriptor,
        id: i64,
        path: &mut Vec<(String, i64)>,
        depth: usize,
    ) -> Result<Option<Entity>> {
        let rows = db
            .executor()
            .query(&QueryBuilder::new(table).select_by_id(id)?)?;
        match rows.first() {
            Some(row) => self.bind(db, table, row, path, depth).map(Some),
            None => Ok(None),
        }
    }

    fn bind(
        &self,
        db: &Database,
        table: &TableDescriptor,
        row: &Row,
        path: &mut Vec<(String, i64)>,
        depth: usize,
    ) -> Result<Entity> {
        let mut entity = Entity::new(table.name.clone());
        for column in table.field_columns() {
            let stored = row.get(&column.name).cloned().unwrap_or(Value::Null);
            entity.set(column.name.clone(), column.from_storage(stored)?);
        }
        let Some(pk) = table.primary_key() else {
            return Ok(entity);
        };
        let id = row.get_i64(&pk.name).unwrap_or(0);
        entity.mark_persisted(id);

        let key = (table.name.clone(), id);
        if path.contains(&key) {
            tracing::debug!(table = %table.name, id, "cycle on load path; binding shallow");
            return Ok(entity);
        }
        if depth >= self.config.max_depth {
            tracing::debug!(table = %table.name, id, depth, "depth limit reached; binding shallow");
            return Ok(entity);
        }

        path.push(key);
        let result = self.bind_relations(db, table, row, &mut entity, path, depth);
        path.pop();
        result?;
        Ok(entity)
    }

    fn bind_relations(
        &self,
        db: &Database,
        table: &TableDescriptor,
        row: &Row,
        entity: &mut Entity,
        path: &mut Vec<(String, i64)>,
        depth: usize,
    ) -> Result<()> {
        let id = entity.id();
        for fk in &table.foreign_keys {
            let target = self.registry.require_table(&fk.target_table)?;
            match fk.relation_kind {
                RelationKind::OneToOne => {
                    let loaded = match row.get_i64(&fk.parent_key_name) {
                        Some(target_id) => {
                            let loaded = self.load_by_id(db, target, target_id, path, depth + 1)?;
                            if loaded.is_none() {
                                tracing::warn!(
                                    table = %table.name,
                                    relation = %fk.property,
                                    target = %fk.target_table,
                                    target_id,
                                    "relationship integrity: referenced row is missing"
                                );
                            }
                            loaded
                        }
                        None => None,
                    };
                    entity.set_one(fk.property.clone(), loaded);
                }
                RelationKind::OneToMany | RelationKind::ManyToMany => {
                    let junction = self.registry.junction_for(table, &fk.property)?;
                    let edges = db.executor().query(
                        &QueryBuilder::new(&junction.table).select_ordered(
                            &Projection::columns([fk.target_key_name.as_str()]),
                            &[Condition::eq(fk.parent_key_name.clone(), id)],
                            crate::catalog::JUNCTION_ID,
                        )?,
                    )?;

                    let mut children = Vec::with_capacity(edges.len());
                    for edge in &edges {
                        let Some(target_id) = edge.get_i64(&fk.target_key_name) else {
                            continue;
                        };
                        match self.load_by_id(db, target, target_id, path, depth + 1)? {
                            Some(child) => children.push(child),
                            None => tracing::warn!(
                                junction = %junction.name(),
                                table = %table.name,
                                relation = %fk.property,
                                target_id,
                                "relationship integrity: junction row points at a missing entity"
                            ),
                        }
                    }
                    entity.set_many(fk.property.clone(), children);
                }
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Saving
    // -------------------------------------------------------------------------

    /// Save an entity graph.
    ///
    /// One-to-one targets and collection children are saved first, then the
    /// entity's row is inserted or updated, then junction rows of every
    /// collection slot present on the entity are replaced in one batch.
    pub fn save(&self, entity: &mut Entity) -> Result<SaveOutcome> {
        let Some(db) = self.db else {
            return Ok(SaveOutcome::NotUsingDatabase);
        };
        self.registry.ensure_built()?;
        let outcome = self.save_inner(db, entity)?;
        tracing::debug!(table = %entity.table(), id = entity.id(), ?outcome, "entity saved");
        Ok(outcome)
    }

    fn save_inner(&self, db: &Database, entity: &mut Entity) -> Result<SaveOutcome> {
        let table = self.registry.require_table(entity.table())?;
        let pk = Self::primary_key(table, "save")?;
        let mut related_failed = false;
        let mut keys: Vec<(String, Value)> = Vec::new();

        for fk in &table.foreign_keys {
            let uses_junction = fk.relation_kind.uses_junction();
            match (uses_junction, entity.relation_mut(&fk.property)) {
                (_, None) => {}
                (false, Some(Related::One(Some(child)))) => {
                    if !self.save_inner(db, child)?.is_success() {
                        related_failed = true;
                    }
                    let key = if child.is_persisted() {
                        Value::Integer(child.id())
                    } else {
                        Value::Null
                    };
                    keys.push((fk.parent_key_name.clone(), key));
                }
                (false, Some(Related::One(None))) => {
                    keys.push((fk.parent_key_name.clone(), Value::Null));
                }
                (true, Some(Related::Many(children))) => {
                    for child in children.iter_mut() {
                        if !self.save_inner(db, child)?.is_success() {
                            related_failed = true;
                        }
                    }
                }
                (_, Some(_)) => {
                    return Err(ConfigError::RelationShape {
                        table: table.name.clone(),
                        relation: fk.property.clone(),
                    }
                    .into())
                }
            }
        }

        let mut values: Vec<(String, Value)> = entity
            .fields()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        values.extend(keys);

        if !self.write_primary(db, table, pk, entity, values)? {
            return Ok(SaveOutcome::PrimaryWriteFailed);
        }

        if !self.write_junctions(db, table, entity)? {
            related_failed = true;
        }

        Ok(if related_failed {
            SaveOutcome::RelatedWriteFailed
        } else {
            SaveOutcome::Success
        })
    }

    /// Insert or update the entity's own row. `Ok(false)` on a write failure.
    fn write_primary(
        &self,
        db: &Database,
        table: &TableDescriptor,
        pk: &ColumnDescriptor,
        entity: &mut Entity,
        mut values: Vec<(String, Value)>,
    ) -> Result<bool> {
        let builder = QueryBuilder::new(table);
        let executor = db.executor();

        if entity.is_persisted() {
            let statement = match builder.update_by_id(&values, entity.id()) {
                Ok(statement) => statement,
                Err(Error::EmptyUpdate { .. }) => return Ok(true),
                Err(e) => return absorb(&table.name, e),
            };
            return match executor.execute(&statement) {
                Ok(0) => {
                    tracing::error!(
                        table = %table.name,
                        id = entity.id(),
                        "update matched no row"
                    );
                    Ok(false)
                }
                Ok(_) => Ok(true),
                Err(e) => absorb(&table.name, e),
            };
        }

        values.retain(|(name, _)| name != &pk.name);
        if self.config.id_allocation == IdAllocation::ScanMaxPlusOne {
            let next = match executor.query_scalar(&builder.max(&pk.name)?) {
                Ok(max) => max.unwrap_or(0) + 1,
                Err(e) => return absorb(&table.name, e),
            };
            values.push((pk.name.clone(), Value::Integer(next)));
        }

        let statement = match builder.insert(&values) {
            Ok(statement) => statement,
            Err(e) => return absorb(&table.name, e),
        };
        match executor.insert(&statement) {
            Ok(id) => {
                entity.mark_persisted(id);
                Ok(true)
            }
            Err(e) => absorb(&table.name, e),
        }
    }

    /// Replace junction rows for every collection slot. `Ok(false)` if any batch failed.
    fn write_junctions(
        &self,
        db: &Database,
        table: &TableDescriptor,
        entity: &Entity,
    ) -> Result<bool> {
        let id = entity.id();
        let mut ok = true;

        for fk in table.foreign_keys.iter().filter(|fk| fk.relation_kind.uses_junction()) {
            let Some(Related::Many(children)) = entity.relation(&fk.property) else {
                continue;
            };
            let junction = self.registry.junction_for(table, &fk.property)?;
            let builder = QueryBuilder::new(&junction.table);

            let mut batch = Batch::new();
            batch.push(builder.delete(&[Condition::eq(fk.parent_key_name.clone(), id)])?);
            for child in children.iter().filter(|c| c.is_persisted()) {
                batch.push(builder.insert(&[
                    (fk.parent_key_name.clone(), Value::Integer(id)),
                    (fk.target_key_name.clone(), Value::Integer(child.id())),
                ])?);
            }

            if let Err(e) = db.executor().execute_batch(&batch) {
                absorb(junction.name(), e)?;
                ok = false;
            }
        }
        Ok(ok)
    }

    // -------------------------------------------------------------------------
    // Deleting
    // -------------------------------------------------------------------------

    /// Delete an entity's row by primary key and reset it to unpersisted.
    ///
    /// Related entities and junction rows are left alone. Returns whether a
    /// row was deleted.
    pub fn delete(&self, entity: &mut Entity) -> Result<bool> {
        let Some(db) = self.db else {
            return Ok(false);
        };
        let table = self.table(entity.table())?;
        Self::primary_key(table, "delete")?;
        if !entity.is_persisted() {
            return Ok(false);
        }

        let statement = QueryBuilder::new(table).delete_by_id(entity.id())?;
        match db.executor().execute(&statement) {
            Ok(deleted) => {
                entity.reset();
                Ok(deleted > 0)
            }
            Err(e) => absorb(&table.name, e),
        }
    }

    // -------------------------------------------------------------------------
    // Typed Models
    // -------------------------------------------------------------------------

    fn model_table<M: Model + 'static>(&self) -> Result<&'a TableDescriptor> {
        self.registry.ensure_built()?;
        self.registry
            .table_for::<M>()
            .ok_or_else(|| ConfigError::UnregisteredModel(type_name::<M>()).into())
    }

    fn model_entity<M: Model + 'static>(&self, model: &M) -> Result<Entity> {
        let table = self.model_table::<M>()?;
        let entity = model.to_entity();
        if entity.table() != table.name {
            return Err(ConfigError::ModelHook {
                model: type_name::<M>(),
                reason: format!(
                    "entity targets table {} but the model is registered as {}",
                    entity.table(),
                    table.name
                ),
            }
            .into());
        }
        Ok(entity)
    }

    /// Save a model, storing the assigned id back on it.
    pub fn save_model<M: Model + 'static>(&self, model: &mut M) -> Result<SaveOutcome> {
        let mut entity = self.model_entity(model)?;
        let outcome = self.save(&mut entity)?;
        if entity.is_persisted() {
            model.set_id(entity.id());
        }
        Ok(outcome)
    }

    /// Load a model by id.
    pub fn load_model<M: Model + 'static>(&self, id: i64) -> Result<Option<M>> {
        let table = self.model_table::<M>()?;
        self.load(&table.name, id)?
            .map(|entity| M::from_entity(&entity))
            .transpose()
    }

    /// Load every model of a type.
    pub fn load_all_models<M: Model + 'static>(&self) -> Result<Vec<M>> {
        let table = self.model_table::<M>()?;
        self.load_all(&table.name)?
            .iter()
            .map(M::from_entity)
            .collect()
    }

    /// Delete a model's row, resetting its id to 0.
    pub fn delete_model<M: Model + 'static>(&self, model: &mut M) -> Result<bool> {
        let mut entity = self.model_entity(model)?;
        let deleted = self.delete(&mut entity)?;
        if deleted {
            model.set_id(0);
        }
        Ok(deleted)
    }
}

/// Turn a write failure into `Ok(false)`; pass anything else through.
///
/// Statement failures were already logged by the executor.
fn absorb(table: &str, err: Error) -> Result<bool> {
    match err {
        Error::Query { .. } => Ok(false),
        Error::Open { .. } | Error::Encoding(_) => {
            tracing::error!(table = %table, error = %err, "write failed");
            Ok(false)
        }
        other => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ForeignKeyDescriptor, StorageType};
    use crate::sync::SchemaSynchronizer;

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                TableDescriptor::new("profile")
                    .with_column(ColumnDescriptor::primary_key("id"))
                    .with_column(ColumnDescriptor::new("bio", StorageType::Text)),
            )
            .unwrap();
        registry
            .register(
                TableDescriptor::new("user")
                    .with_column(ColumnDescriptor::primary_key("id"))
                    .with_column(ColumnDescriptor::required("name", StorageType::Text))
                    .with_column(ColumnDescriptor::new("active", StorageType::Boolean))
                    .with_foreign_key(ForeignKeyDescriptor::one_to_one("profile", "profile")),
            )
            .unwrap();
        registry.build_junctions().unwrap();
        registry
    }

    fn synced(name: &str, registry: &SchemaRegistry) -> Database {
        let db = Database::open_in_memory(name).unwrap();
        assert!(SchemaSynchronizer::new(registry, &db)
            .synchronize()
            .unwrap()
            .is_success());
        db
    }

    #[test]
    fn test_detached_binder() {
        let registry = registry();
        let binder = EntityBinder::detached(&registry);
        let mut user = Entity::new("user").with("name", "Jon Doe");

        assert_eq!(binder.save(&mut user).unwrap(), SaveOutcome::NotUsingDatabase);
        assert!(matches!(binder.load("user", 1), Err(Error::NotUsingDatabase)));
        assert!(!binder.delete(&mut user).unwrap());
    }

    #[test]
    fn test_one_to_one_saved_first() {
        let registry = registry();
        let db = synced("binder_one_to_one", &registry);
        let binder = EntityBinder::new(&registry, &db);

        let mut user = Entity::new("user").with("name", "Jon Doe").with("active", true);
        user.set_one("profile", Some(Entity::new("profile").with("bio", "hi")));
        assert_eq!(binder.save(&mut user).unwrap(), SaveOutcome::Success);
        assert!(user.one("profile").unwrap().is_persisted());

        let loaded = binder.load("user", user.id()).unwrap().unwrap();
        assert_eq!(loaded.get("active"), Some(&Value::Bool(true)));
        assert_eq!(loaded.one("profile").and_then(|p| p.get_str("bio")), Some("hi"));
    }

    #[test]
    fn test_update_then_delete() {
        let registry = registry();
        let db = synced("binder_update_delete", &registry);
        let binder = EntityBinder::new(&registry, &db);

        let mut user = Entity::new("user").with("name", "Jon Doe");
        binder.save(&mut user).unwrap();
        let id = user.id();

        user.set("name", "Jane Doe");
        assert!(binder.save(&mut user).unwrap().is_success());
        assert_eq!(user.id(), id);
        assert_eq!(binder.count("user", &[]).unwrap(), 1);

        assert!(binder.delete(&mut user).unwrap());
        assert_eq!(user.id(), 0);
        assert!(!user.is_persisted());
        assert!(binder.load("user", id).unwrap().is_none());
    }

    #[test]
    fn test_update_of_missing_row_is_a_primary_failure() {
        let registry = registry();
        let db = synced("binder_update_missing", &registry);
        let binder = EntityBinder::new(&registry, &db);

        let mut ghost = Entity::new("profile").with_id(42).with("bio", "x");
        assert_eq!(binder.save(&mut ghost).unwrap(), SaveOutcome::PrimaryWriteFailed);
        assert_eq!(binder.count("profile", &[]).unwrap(), 0);

        let mut user = Entity::new("user").with("name", "Jon Doe");
        binder.save(&mut user).unwrap();
        let mut stale = user.clone();
        assert!(binder.delete(&mut user).unwrap());
        stale.set("name", "Jane Doe");
        assert_eq!(binder.save(&mut stale).unwrap(), SaveOutcome::PrimaryWriteFailed);
    }

    #[test]
    fn test_scan_max_plus_one_allocation() {
        let registry = registry();
        let db = synced("binder_scan_max", &registry);
        let binder = EntityBinder::new(&registry, &db)
            .with_config(BinderConfig::default().with_id_allocation(IdAllocation::ScanMaxPlusOne));

        for expected in 1..=3 {
            let mut profile = Entity::new("profile").with("bio", "x");
            binder.save(&mut profile).unwrap();
            assert_eq!(profile.id(), expected);
        }
        assert_eq!(binder.max_id("profile").unwrap(), 3);
    }

    #[test]
    fn test_relation_shape_mismatch() {
        let registry = registry();
        let db = synced("binder_shape", &registry);
        let binder = EntityBinder::new(&registry, &db);

        let mut user = Entity::new("user").with("name", "Jon Doe");
        user.set_many("profile", vec![Entity::new("profile")]);
        let err = binder.save(&mut user).unwrap_err();
        assert!(err.is_config());
    }
}
