//! Schema registry: owns every table and junction descriptor.

use super::junction::JunctionDescriptor;
use super::relation::RelationKind;
use super::table::TableDescriptor;
use crate::entity::Model;
use crate::error::{ConfigError, Error};
use std::any::TypeId;
use std::collections::{HashMap, HashSet};

/// Owns all table and junction descriptors and resolves lookups.
///
/// Build it once at startup: register every table, then call
/// [`SchemaRegistry::build_junctions`] exactly once before synchronizing.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    tables: Vec<TableDescriptor>,
    by_name: HashMap<String, usize>,
    by_type: HashMap<TypeId, usize>,
    junctions: Vec<JunctionDescriptor>,
    junctions_by_name: HashMap<String, usize>,
    junctions_built: bool,
}

/// One junction-bearing relation collected while grouping.
struct JunctionMember {
    owner: String,
    owner_pk: String,
    property: String,
    parent_key: String,
    target: String,
    target_pk: String,
    target_key: String,
}

impl SchemaRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table.
    pub fn register(&mut self, table: TableDescriptor) -> Result<(), ConfigError> {
        if self.junctions_built {
            return Err(ConfigError::JunctionsAlreadyBuilt);
        }
        if self.by_name.contains_key(&table.name) {
            return Err(ConfigError::DuplicateTable(table.name));
        }

        let mut seen = HashSet::new();
        for column in &table.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(ConfigError::DuplicateColumn {
                    table: table.name.clone(),
                    column: column.name.clone(),
                });
            }
        }

        let pks: Vec<&str> = table
            .columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect();
        if pks.len() > 1 {
            return Err(ConfigError::MultiplePrimaryKeys {
                table: table.name.clone(),
                columns: pks.into_iter().map(String::from).collect(),
            });
        }
        if let Some(pk) = table.primary_key() {
            if pk.storage_type != super::StorageType::Integer {
                return Err(ConfigError::NonIntegerPrimaryKey {
                    table: table.name.clone(),
                    column: pk.name.clone(),
                });
            }
        }
        if let Some(fk) = table.foreign_keys.first() {
            if pks.is_empty() {
                return Err(ConfigError::MissingPrimaryKey {
                    table: table.name.clone(),
                    relation: fk.property.clone(),
                });
            }
        }

        let idx = self.tables.len();
        self.by_name.insert(table.name.clone(), idx);
        if let Some(type_id) = table.entity_type {
            self.by_type.insert(type_id, idx);
        }
        self.tables.push(table);
        Ok(())
    }

    /// Register a model type through its descriptor hook.
    pub fn register_model<M: Model + 'static>(&mut self) -> Result<(), ConfigError> {
        self.register(M::descriptor().with_entity_type::<M>())
    }

    /// Synthesize junction tables from every declared relation.
    ///
    /// Groups all one-to-many and many-to-many relations by junction name,
    /// builds one junction per group, and attaches it to every participating
    /// table. One-to-one relations get their target primary key resolved.
    pub fn build_junctions(&mut self) -> Result<(), ConfigError> {
        if self.junctions_built {
            return Err(ConfigError::JunctionsAlreadyBuilt);
        }

        let mut pk_updates: Vec<(usize, String, String)> = Vec::new();
        let mut groups: Vec<(String, Vec<JunctionMember>)> = Vec::new();

        for (idx, table) in self.tables.iter().enumerate() {
            for fk in &table.foreign_keys {
                let target = self
                    .by_name
                    .get(&fk.target_table)
                    .map(|&i| &self.tables[i])
                    .ok_or_else(|| ConfigError::UnknownRelationTarget {
                        table: table.name.clone(),
                        relation: fk.property.clone(),
                        target: fk.target_table.clone(),
                    })?;
                let target_pk = target
                    .primary_key()
                    .ok_or_else(|| ConfigError::MissingPrimaryKey {
                        table: target.name.clone(),
                        relation: format!("{}.{}", table.name, fk.property),
                    })?
                    .name
                    .clone();
                let owner_pk = table
                    .primary_key()
                    .ok_or_else(|| ConfigError::MissingPrimaryKey {
                        table: table.name.clone(),
                        relation: fk.property.clone(),
                    })?
                    .name
                    .clone();

                match (fk.relation_kind, &fk.junction_name) {
                    (RelationKind::OneToOne, _) => {
                        pk_updates.push((idx, fk.property.clone(), target_pk));
                    }
                    (_, Some(junction)) => {
                        let member = JunctionMember {
                            owner: table.name.clone(),
                            owner_pk,
                            property: fk.property.clone(),
                            parent_key: fk.parent_key_name.clone(),
                            target: fk.target_table.clone(),
                            target_pk,
                            target_key: fk.target_key_name.clone(),
                        };
                        match groups.iter_mut().find(|(name, _)| name == junction) {
                            Some((_, members)) => members.push(member),
                            None => groups.push((junction.clone(), vec![member])),
                        }
                    }
                    (_, None) => {
                        return Err(ConfigError::UnknownRelation {
                            table: table.name.clone(),
                            relation: fk.property.clone(),
                        })
                    }
                }
            }
        }

        for (idx, property, pk) in pk_updates {
            if let Some(fk) = self.tables[idx].relation_mut(&property) {
                fk.set_target_primary_key(&pk);
            }
        }

        for (name, members) in groups {
            if self.by_name.contains_key(&name) {
                return Err(ConfigError::JunctionNameCollision(name));
            }

            let mut keys: Vec<(String, String, String)> = Vec::new();
            let mut inconsistent = false;
            for member in &members {
                for (column, table, pk) in [
                    (&member.parent_key, &member.owner, &member.owner_pk),
                    (&member.target_key, &member.target, &member.target_pk),
                ] {
                    match keys.iter().find(|(c, _, _)| c == column) {
                        Some((_, existing, _)) if existing != table => inconsistent = true,
                        Some(_) => {}
                        None => keys.push((column.clone(), table.clone(), pk.clone())),
                    }
                }
            }
            if inconsistent || keys.len() != 2 {
                return Err(ConfigError::InconsistentJunction {
                    junction: name,
                    columns: keys.into_iter().map(|(c, _, _)| c).collect(),
                });
            }

            let mut junction = JunctionDescriptor::new(name.clone(), &keys);
            for member in &members {
                junction
                    .relations
                    .push((member.owner.clone(), member.property.clone()));
                for table in [&member.owner, &member.target] {
                    if let Some(&idx) = self.by_name.get(table) {
                        let attached = &mut self.tables[idx].junctions;
                        if !attached.contains(&name) {
                            attached.push(name.clone());
                        }
                    }
                }
            }

            self.junctions_by_name.insert(name, self.junctions.len());
            self.junctions.push(junction);
        }

        self.junctions_built = true;
        Ok(())
    }

    /// Whether junctions have been built.
    pub fn is_built(&self) -> bool {
        self.junctions_built
    }

    /// Fail unless junctions have been built.
    pub fn ensure_built(&self) -> Result<(), ConfigError> {
        if self.junctions_built {
            Ok(())
        } else {
            Err(ConfigError::JunctionsNotBuilt)
        }
    }

    /// Look up a table by name.
    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        self.by_name.get(name).map(|&idx| &self.tables[idx])
    }

    /// Look up a table by name, failing with [`Error::UnknownTable`].
    pub fn require_table(&self, name: &str) -> Result<&TableDescriptor, Error> {
        self.table(name)
            .ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    /// Look up a table by entity type.
    pub fn table_for_type(&self, type_id: TypeId) -> Option<&TableDescriptor> {
        self.by_type.get(&type_id).map(|&idx| &self.tables[idx])
    }

    /// Look up the table registered for a model type.
    pub fn table_for<M: 'static>(&self) -> Option<&TableDescriptor> {
        self.table_for_type(TypeId::of::<M>())
    }

    /// Look up a junction by name.
    pub fn junction(&self, name: &str) -> Option<&JunctionDescriptor> {
        self.junctions_by_name.get(name).map(|&idx| &self.junctions[idx])
    }

    /// The junction storing a table's collection relation.
    pub fn junction_for(
        &self,
        table: &TableDescriptor,
        property: &str,
    ) -> Result<&JunctionDescriptor, ConfigError> {
        self.ensure_built()?;
        table
            .relation(property)
            .and_then(|fk| fk.junction_name.as_deref())
            .and_then(|name| self.junction(name))
            .ok_or_else(|| ConfigError::UnknownRelation {
                table: table.name.clone(),
                relation: property.to_string(),
            })
    }

    /// All tables, in registration order.
    pub fn tables(&self) -> impl Iterator<Item = &TableDescriptor> {
        self.tables.iter()
    }

    /// All junctions, in build order.
    pub fn junctions(&self) -> impl Iterator<Item = &JunctionDescriptor> {
        self.junctions.iter()
    }

    /// Junctions a table takes part in.
    pub fn junctions_of(&self, table: &str) -> Vec<&JunctionDescriptor> {
        self.table(table)
            .map(|t| t.junctions.iter().filter_map(|j| self.junction(j)).collect())
            .unwrap_or_default()
    }

    /// Tables in creation order: tables without relations first, then
    /// relation owners after the tables their one-to-one keys reference.
    /// Reference cycles fall back to registration order.
    pub fn dependency_order(&self) -> Vec<&TableDescriptor> {
        let mut ordered: Vec<&TableDescriptor> =
            self.tables.iter().filter(|t| !t.has_relations()).collect();
        let mut placed: HashSet<&str> = ordered.iter().map(|t| t.name.as_str()).collect();
        let mut pending: Vec<&TableDescriptor> =
            self.tables.iter().filter(|t| t.has_relations()).collect();

        while !pending.is_empty() {
            let ready = pending.iter().position(|t| {
                t.foreign_keys
                    .iter()
                    .filter(|fk| fk.relation_kind == RelationKind::OneToOne)
                    .all(|fk| {
                        fk.target_table == t.name || placed.contains(fk.target_table.as_str())
                    })
            });
            let next = pending.remove(ready.unwrap_or(0));
            placed.insert(next.name.as_str());
            ordered.push(next);
        }

        ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnDescriptor, ForeignKeyDescriptor, StorageType};

    fn user() -> TableDescriptor {
        TableDescriptor::new("user")
            .with_column(ColumnDescriptor::primary_key("id"))
            .with_column(ColumnDescriptor::required("name", StorageType::Text))
    }

    fn post() -> TableDescriptor {
        TableDescriptor::new("post")
            .with_column(ColumnDescriptor::primary_key("id"))
            .with_column(ColumnDescriptor::required("title", StorageType::Text))
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = SchemaRegistry::new();
        registry.register(user()).unwrap();

        assert!(registry.table("user").is_some());
        assert!(registry.table("post").is_none());
        assert!(matches!(
            registry.require_table("post"),
            Err(Error::UnknownTable(_))
        ));
        assert_eq!(
            registry.register(user()),
            Err(ConfigError::DuplicateTable("user".into()))
        );
    }

    #[test]
    fn test_relation_without_primary_key_is_rejected() {
        let mut registry = SchemaRegistry::new();
        let table = TableDescriptor::new("log")
            .with_column(ColumnDescriptor::new("line", StorageType::Text))
            .with_foreign_key(ForeignKeyDescriptor::one_to_many("tags", "tag"));

        assert!(matches!(
            registry.register(table),
            Err(ConfigError::MissingPrimaryKey { .. })
        ));
    }

    #[test]
    fn test_relation_target_without_primary_key_is_rejected() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(user().with_foreign_key(ForeignKeyDescriptor::one_to_many("notes", "note")))
            .unwrap();
        registry
            .register(
                TableDescriptor::new("note")
                    .with_column(ColumnDescriptor::new("body", StorageType::Text)),
            )
            .unwrap();

        assert!(matches!(
            registry.build_junctions(),
            Err(ConfigError::MissingPrimaryKey { table, .. }) if table == "note"
        ));
    }

    #[test]
    fn test_multiple_primary_keys_rejected() {
        let mut registry = SchemaRegistry::new();
        let table = user().with_column(ColumnDescriptor::primary_key("other_id"));
        assert!(matches!(
            registry.register(table),
            Err(ConfigError::MultiplePrimaryKeys { .. })
        ));
    }

    #[test]
    fn test_build_junctions_back_attaches() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(user().with_foreign_key(ForeignKeyDescriptor::one_to_many("posts", "post")))
            .unwrap();
        registry.register(post()).unwrap();
        registry.build_junctions().unwrap();

        let junction = registry.junction("user_posts").unwrap();
        assert_eq!(junction.key_columns(), vec!["user_id", "post_id"]);
        assert_eq!(registry.junctions_of("user").len(), 1);
        assert_eq!(registry.junctions_of("post").len(), 1);
        assert_eq!(
            registry.build_junctions(),
            Err(ConfigError::JunctionsAlreadyBuilt)
        );
    }

    #[test]
    fn test_shared_junction_for_bidirectional_relation() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(user().with_foreign_key(
                ForeignKeyDescriptor::many_to_many("groups", "group").with_junction("membership"),
            ))
            .unwrap();
        registry
            .register(
                TableDescriptor::new("group")
                    .with_column(ColumnDescriptor::primary_key("id"))
                    .with_foreign_key(
                        ForeignKeyDescriptor::many_to_many("members", "user")
                            .with_junction("membership"),
                    ),
            )
            .unwrap();
        registry.build_junctions().unwrap();

        assert_eq!(registry.junctions().count(), 1);
        let junction = registry.junction("membership").unwrap();
        assert_eq!(junction.relations.len(), 2);
        assert_eq!(junction.key_columns(), vec!["user_id", "group_id"]);
    }

    #[test]
    fn test_self_reference_junction() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                user().with_foreign_key(ForeignKeyDescriptor::many_to_many("friends", "user")),
            )
            .unwrap();
        registry.build_junctions().unwrap();

        let junction = registry.junction("user_friends").unwrap();
        assert_eq!(junction.key_columns(), vec!["user_id_1", "user_id_2"]);
        assert_eq!(junction.participants, vec!["user".to_string()]);
    }

    #[test]
    fn test_unknown_target() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(user().with_foreign_key(ForeignKeyDescriptor::one_to_one("avatar", "image")))
            .unwrap();
        assert!(matches!(
            registry.build_junctions(),
            Err(ConfigError::UnknownRelationTarget { .. })
        ));
    }

    #[test]
    fn test_one_to_one_resolves_target_primary_key() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                TableDescriptor::new("profile")
                    .with_column(ColumnDescriptor::primary_key("profile_pk")),
            )
            .unwrap();
        registry
            .register(
                user().with_foreign_key(ForeignKeyDescriptor::one_to_one("profile", "profile")),
            )
            .unwrap();
        registry.build_junctions().unwrap();

        let fk = registry.table("user").unwrap().relation("profile").unwrap();
        assert_eq!(fk.target_key_name, "profile_pk");
    }

    #[test]
    fn test_dependency_order() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                user().with_foreign_key(ForeignKeyDescriptor::one_to_one("profile", "profile")),
            )
            .unwrap();
        registry
            .register(
                TableDescriptor::new("profile")
                    .with_column(ColumnDescriptor::primary_key("id"))
                    .with_foreign_key(ForeignKeyDescriptor::one_to_one("avatar", "image")),
            )
            .unwrap();
        registry
            .register(
                TableDescriptor::new("image").with_column(ColumnDescriptor::primary_key("id")),
            )
            .unwrap();

        let order: Vec<&str> = registry
            .dependency_order()
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(order, vec!["image", "profile", "user"]);
    }
}
