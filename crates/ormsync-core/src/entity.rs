//! In-memory entity instances and the typed model hook.

use crate::catalog::TableDescriptor;
use crate::error::Result;
use crate::value::Value;
use std::collections::BTreeMap;

/// A relation slot on an entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    /// One-to-one target, if any.
    One(Option<Box<Entity>>),
    /// One-to-many or many-to-many targets.
    Many(Vec<Entity>),
}

/// One entity instance: scalar fields plus relation slots.
///
/// A fresh entity has id 0 and is not persisted. The binder assigns the id on
/// insert and marks it persisted; deleting resets both.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    table: String,
    id: i64,
    persisted: bool,
    fields: BTreeMap<String, Value>,
    relations: BTreeMap<String, Related>,
}

impl Entity {
    /// Create a fresh entity of a table.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            id: 0,
            persisted: false,
            fields: BTreeMap::new(),
            relations: BTreeMap::new(),
        }
    }

    /// Attach a known id. A non-zero id marks the entity as persisted.
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self.persisted = id != 0;
        self
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Table this entity is stored in.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Primary key value (0 when unassigned).
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Whether the entity has a row in the database.
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub(crate) fn mark_persisted(&mut self, id: i64) {
        self.id = id;
        self.persisted = true;
    }

    pub(crate) fn reset(&mut self) {
        self.id = 0;
        self.persisted = false;
    }

    /// Set a scalar field (native form).
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Get a scalar field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Get a text field.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    /// Get an integer field.
    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(Value::as_i64)
    }

    /// Scalar fields, ordered by name.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Set a one-to-one relation.
    pub fn set_one(&mut self, property: impl Into<String>, target: Option<Entity>) {
        self.relations
            .insert(property.into(), Related::One(target.map(Box::new)));
    }

    /// One-to-one target, if set.
    pub fn one(&self, property: &str) -> Option<&Entity> {
        match self.relations.get(property) {
            Some(Related::One(target)) => target.as_deref(),
            _ => None,
        }
    }

    /// Replace a collection relation.
    pub fn set_many(&mut self, property: impl Into<String>, targets: Vec<Entity>) {
        self.relations.insert(property.into(), Related::Many(targets));
    }

    /// Append to a collection relation, creating it when absent.
    pub fn push_many(&mut self, property: impl Into<String>, target: Entity) {
        let slot = self
            .relations
            .entry(property.into())
            .or_insert_with(|| Related::Many(Vec::new()));
        if let Related::One(_) = slot {
            *slot = Related::Many(Vec::new());
        }
        if let Related::Many(targets) = slot {
            targets.push(target);
        }
    }

    /// Collection targets; empty when unset.
    pub fn many(&self, property: &str) -> &[Entity] {
        match self.relations.get(property) {
            Some(Related::Many(targets)) => targets,
            _ => &[],
        }
    }

    /// Raw relation slot.
    pub fn relation(&self, property: &str) -> Option<&Related> {
        self.relations.get(property)
    }

    pub(crate) fn relation_mut(&mut self, property: &str) -> Option<&mut Related> {
        self.relations.get_mut(property)
    }
}

/// Binds a Rust type to a table.
///
/// `descriptor` is the type-descriptor source used at registration;
/// `to_entity` / `from_entity` move values in and out of the binder.
pub trait Model: Sized {
    /// Table layout for this type.
    fn descriptor() -> TableDescriptor;

    /// Convert to an entity. Persisted values carry their id (see [`Entity::with_id`]).
    fn to_entity(&self) -> Entity;

    /// Rebuild from a loaded entity.
    fn from_entity(entity: &Entity) -> Result<Self>;

    /// Store the id assigned on insert (0 after delete).
    fn set_id(&mut self, id: i64);
}
