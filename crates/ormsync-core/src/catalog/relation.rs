//! Foreign key descriptors: relationship edges between tables.

use super::types::StorageType;
use serde::{Deserialize, Serialize};

/// Kind of relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Key column on the owning table pointing at one target row.
    OneToOne,
    /// Junction table mapping one owner to many targets.
    OneToMany,
    /// Junction table mapping many owners to many targets.
    ManyToMany,
}

impl RelationKind {
    /// Whether this relation is stored in a junction table.
    pub fn uses_junction(&self) -> bool {
        !matches!(self, RelationKind::OneToOne)
    }
}

/// One relationship edge declared on an entity type.
///
/// Key names are resolved when the descriptor is attached to its owning table
/// (see [`ForeignKeyDescriptor::resolve`]); the builder methods only record
/// overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyDescriptor {
    /// Relation name on the owning entity.
    pub property: String,
    /// Target table.
    pub target_table: String,
    /// Relationship kind.
    pub relation_kind: RelationKind,
    /// Junction table name (OneToMany/ManyToMany only).
    pub junction_name: Option<String>,
    /// OneToOne: key column on the owning table. Junctions: column holding the owner's id.
    pub parent_key_name: String,
    /// Storage type of the key columns.
    pub parent_key_type: StorageType,
    /// OneToOne: target's primary key. Junctions: column holding the target's id.
    pub target_key_name: String,
    /// Suffix used to tell the target column apart on self references.
    pub disambiguation_suffix: Option<String>,
    owner: Option<String>,
    parent_key_override: Option<String>,
    target_key_override: Option<String>,
}

impl ForeignKeyDescriptor {
    fn new(property: impl Into<String>, target: impl Into<String>, kind: RelationKind) -> Self {
        Self {
            property: property.into(),
            target_table: target.into(),
            relation_kind: kind,
            junction_name: None,
            parent_key_name: String::new(),
            parent_key_type: StorageType::Integer,
            target_key_name: String::new(),
            disambiguation_suffix: None,
            owner: None,
            parent_key_override: None,
            target_key_override: None,
        }
    }

    /// Create a one-to-one relation.
    pub fn one_to_one(property: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(property, target, RelationKind::OneToOne)
    }

    /// Create a one-to-many relation.
    pub fn one_to_many(property: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(property, target, RelationKind::OneToMany)
    }

    /// Create a many-to-many relation.
    pub fn many_to_many(property: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(property, target, RelationKind::ManyToMany)
    }

    /// Create a relation of the given kind.
    pub fn with_kind(
        property: impl Into<String>,
        target: impl Into<String>,
        kind: RelationKind,
    ) -> Self {
        Self::new(property, target, kind)
    }

    /// Use a specific junction table name. Relations that name the same
    /// junction share one physical table.
    pub fn with_junction(mut self, name: impl Into<String>) -> Self {
        self.junction_name = Some(name.into());
        self
    }

    /// Override the owner-side key column name.
    pub fn with_parent_key(mut self, name: impl Into<String>) -> Self {
        self.parent_key_override = Some(name.into());
        self
    }

    /// Override the target-side junction column name.
    pub fn with_target_key(mut self, name: impl Into<String>) -> Self {
        self.target_key_override = Some(name.into());
        self
    }

    /// Set the suffix appended to the target column when both junction
    /// columns would otherwise share a name.
    pub fn with_disambiguation(mut self, suffix: impl Into<String>) -> Self {
        self.disambiguation_suffix = Some(suffix.into());
        self
    }

    /// Owning table, once attached.
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Whether this relation points back at its own table.
    pub fn is_self_reference(&self) -> bool {
        self.owner.as_deref() == Some(self.target_table.as_str())
    }

    /// Resolve key and junction names for the owning table.
    pub fn resolve(&mut self, owner: &str) {
        self.owner = Some(owner.to_string());
        match self.relation_kind {
            RelationKind::OneToOne => {
                self.junction_name = None;
                self.parent_key_name = self
                    .parent_key_override
                    .clone()
                    .unwrap_or_else(|| format!("{}_id", self.property));
                if self.target_key_name.is_empty() {
                    self.target_key_name = "id".to_string();
                }
            }
            RelationKind::OneToMany | RelationKind::ManyToMany => {
                if self.junction_name.is_none() {
                    self.junction_name = Some(format!("{}_{}", owner, self.property));
                }
                let parent = self
                    .parent_key_override
                    .clone()
                    .unwrap_or_else(|| format!("{}_id", owner));
                let target = self
                    .target_key_override
                    .clone()
                    .unwrap_or_else(|| format!("{}_id", self.target_table));

                if parent == target {
                    match &self.disambiguation_suffix {
                        Some(suffix) => {
                            self.target_key_name = format!("{}_{}", target, suffix);
                            self.parent_key_name = parent;
                        }
                        None => {
                            self.parent_key_name = format!("{}_1", parent);
                            self.target_key_name = format!("{}_2", target);
                        }
                    }
                } else {
                    self.parent_key_name = parent;
                    self.target_key_name = target;
                }
            }
        }
    }

    /// Set the target's primary key name for a one-to-one relation.
    pub(crate) fn set_target_primary_key(&mut self, pk: &str) {
        if self.relation_kind == RelationKind::OneToOne {
            self.target_key_name = pk.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_to_one_key_column() {
        let mut fk = ForeignKeyDescriptor::one_to_one("profile", "profile");
        fk.resolve("user");

        assert_eq!(fk.parent_key_name, "profile_id");
        assert_eq!(fk.target_key_name, "id");
        assert!(fk.junction_name.is_none());
        assert!(!fk.relation_kind.uses_junction());
    }

    #[test]
    fn test_one_to_many_defaults() {
        let mut fk = ForeignKeyDescriptor::one_to_many("posts", "post");
        fk.resolve("user");

        assert_eq!(fk.junction_name.as_deref(), Some("user_posts"));
        assert_eq!(fk.parent_key_name, "user_id");
        assert_eq!(fk.target_key_name, "post_id");
        assert!(!fk.is_self_reference());
    }

    #[test]
    fn test_self_reference_collision_gets_numbered() {
        let mut fk = ForeignKeyDescriptor::many_to_many("friends", "user");
        fk.resolve("user");

        assert!(fk.is_self_reference());
        assert_eq!(fk.parent_key_name, "user_id_1");
        assert_eq!(fk.target_key_name, "user_id_2");
    }

    #[test]
    fn test_self_reference_with_suffix() {
        let mut fk = ForeignKeyDescriptor::many_to_many("friends", "user")
            .with_disambiguation("friend");
        fk.resolve("user");

        assert_eq!(fk.parent_key_name, "user_id");
        assert_eq!(fk.target_key_name, "user_id_friend");
    }

    #[test]
    fn test_shared_junction_override() {
        let mut fk = ForeignKeyDescriptor::many_to_many("members", "user")
            .with_junction("user_groups");
        fk.resolve("group");

        assert_eq!(fk.junction_name.as_deref(), Some("user_groups"));
        assert_eq!(fk.parent_key_name, "group_id");
        assert_eq!(fk.target_key_name, "user_id");
    }
}
