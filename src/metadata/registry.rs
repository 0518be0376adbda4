//! In-memory entity registry.
//!
//! Registration fills in everything the naming strategy can derive: table
//! and column names, foreign keys, pivot tables and the inverse side of every
//! relation. Defaults are applied in passes so each pass only reads values
//! the previous one already settled:
//!
//! 1. inheritance (subtypes share the root table and inherit properties)
//! 2. local fields (columns, embeddables, primary keys)
//! 3. owning sides (need the target's primary key columns)
//! 4. inverse sides (copy from the owning side named by `mapped_by`)

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use super::naming::{NamingStrategy, UnderscoreNamingStrategy};
use super::provider::MetadataProvider;
use super::types::{EntityMetadata, EntityProperty, ReferenceKind};
use crate::config::SettingsError;
use crate::error::{QueryError, QueryResult};

/// Entity file layout: a list of `[[entity]]` tables.
#[derive(Debug, Deserialize)]
struct EntityFile {
    #[serde(default, rename = "entity")]
    entities: Vec<EntityMetadata>,
}

/// Entity metadata keyed by entity name.
#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    entities: HashMap<String, EntityMetadata>,
}

impl MetadataRegistry {
    /// Register entities using the underscore naming strategy.
    pub fn new(entities: impl IntoIterator<Item = EntityMetadata>) -> QueryResult<Self> {
        Self::with_naming(entities, &UnderscoreNamingStrategy)
    }

    pub fn with_naming(
        entities: impl IntoIterator<Item = EntityMetadata>,
        naming: &dyn NamingStrategy,
    ) -> QueryResult<Self> {
        let mut map = HashMap::new();
        for entity in entities {
            let name = entity.name.clone();
            if map.insert(name.clone(), entity).is_some() {
                return Err(QueryError::invalid_criteria(format!(
                    "entity {} is registered twice",
                    name
                )));
            }
        }

        let mut registry = Self { entities: map };
        registry.apply_inheritance(naming)?;
        registry.apply_local_defaults(naming);
        registry.apply_owning_sides(naming)?;
        registry.apply_inverse_sides()?;

        debug!(entities = registry.entities.len(), "registered entity metadata");
        Ok(registry)
    }

    /// Load an entity file.
    ///
    /// ```toml
    /// [[entity]]
    /// name = "Author"
    ///
    /// [[entity.properties]]
    /// name = "id"
    /// primary = true
    /// ```
    pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
        let file: EntityFile = toml::from_str(content)?;
        Self::new(file.entities).map_err(|e| SettingsError::InvalidConfig(e.to_string()))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }
        Self::from_toml_str(&fs::read_to_string(path)?)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn lookup<'a>(
        snapshot: &'a HashMap<String, EntityMetadata>,
        name: &str,
    ) -> QueryResult<&'a EntityMetadata> {
        snapshot
            .get(name)
            .ok_or_else(|| QueryError::UnknownEntity(name.to_string()))
    }

    fn target_of<'a>(
        snapshot: &'a HashMap<String, EntityMetadata>,
        owner: &str,
        prop: &EntityProperty,
    ) -> QueryResult<&'a EntityMetadata> {
        let target = prop.target_name().ok_or_else(|| {
            QueryError::invalid_criteria(format!("relation {}.{} has no target", owner, prop.name))
        })?;
        Self::lookup(snapshot, target)
    }

    fn apply_inheritance(&mut self, naming: &dyn NamingStrategy) -> QueryResult<()> {
        for entity in self.entities.values_mut() {
            if entity.extends.is_none() {
                if entity.table.is_empty() {
                    entity.table = naming.class_to_table_name(&entity.name);
                }
                if entity.discriminator_column.is_some() {
                    entity.root = Some(entity.name.clone());
                }
            }
        }

        let snapshot = self.entities.clone();
        for entity in self.entities.values_mut() {
            if entity.extends.is_none() {
                continue;
            }

            // ancestors, nearest first
            let mut chain: Vec<&EntityMetadata> = Vec::new();
            let mut parent = entity.extends.clone();
            while let Some(name) = parent {
                let ancestor = Self::lookup(&snapshot, &name)?;
                if chain.len() > snapshot.len() {
                    return Err(QueryError::invalid_criteria(format!(
                        "inheritance cycle at {}",
                        entity.name
                    )));
                }
                chain.push(ancestor);
                parent = ancestor.extends.clone();
            }

            let Some(root) = chain.last() else {
                continue;
            };
            entity.root = Some(root.name.clone());
            entity.table = root.table.clone();
            entity.schema = root.schema.clone();
            entity.discriminator_column = root.discriminator_column.clone();
            if entity.primary_keys.is_empty() {
                entity.primary_keys = root.primary_keys.clone();
            }

            let mut inherited: Vec<EntityProperty> = Vec::new();
            for ancestor in chain.iter().rev() {
                for prop in &ancestor.properties {
                    let declared = entity.prop(&prop.name).is_some()
                        || inherited.iter().any(|p| p.name == prop.name);
                    if !declared {
                        inherited.push(prop.clone());
                    }
                }
            }
            inherited.append(&mut entity.properties);
            entity.properties = inherited;
        }

        Ok(())
    }

    fn apply_local_defaults(&mut self, naming: &dyn NamingStrategy) {
        for entity in self.entities.values_mut() {
            let flattened: Vec<String> = entity
                .properties
                .iter()
                .filter(|p| p.kind == ReferenceKind::Embedded)
                .flat_map(|p| p.embedded.values().cloned())
                .collect();
            for name in flattened {
                if entity.prop(&name).is_none() {
                    entity.properties.push(EntityProperty::scalar(&name));
                }
            }

            for prop in &mut entity.properties {
                match prop.kind {
                    ReferenceKind::Scalar => {
                        if prop.field_names.is_empty() {
                            prop.field_names = vec![naming.property_to_column_name(&prop.name)];
                        }
                    }
                    ReferenceKind::OneToOne | ReferenceKind::ManyToMany => {
                        if prop.mapped_by.is_none() {
                            prop.owner = true;
                        }
                    }
                    _ => {}
                }
            }

            if entity.primary_keys.is_empty() {
                entity.primary_keys = entity
                    .properties
                    .iter()
                    .filter(|p| p.primary)
                    .map(|p| p.name.clone())
                    .collect();
            }
            if entity.primary_keys.is_empty() && entity.prop("id").is_some() {
                entity.primary_keys = vec!["id".into()];
            }
            let primary_keys = entity.primary_keys.clone();
            for pk in primary_keys {
                if let Some(prop) = entity.prop_mut(&pk) {
                    prop.primary = true;
                }
            }
        }
    }

    fn apply_owning_sides(&mut self, naming: &dyn NamingStrategy) -> QueryResult<()> {
        let snapshot = self.entities.clone();

        for entity in self.entities.values_mut() {
            let owner_pks = entity.pk_columns();
            let owner_name = entity.name.clone();
            let owner_table = entity.table.clone();

            for prop in &mut entity.properties {
                if prop.holds_foreign_key() {
                    let target = Self::target_of(&snapshot, &owner_name, prop)?;
                    if prop.referenced_column_names.is_empty() {
                        prop.referenced_column_names = target.pk_columns();
                    }
                    if prop.join_columns.is_empty() {
                        prop.join_columns = prop
                            .referenced_column_names
                            .iter()
                            .map(|c| naming.join_column_name(&prop.name, c))
                            .collect();
                    }
                    prop.field_names = prop.join_columns.clone();
                } else if prop.kind == ReferenceKind::ManyToMany && prop.owner {
                    let target = Self::target_of(&snapshot, &owner_name, prop)?;
                    let self_reference = target.name == owner_name;

                    if prop.pivot_table.is_none() {
                        prop.pivot_table = Some(naming.join_table_name(&owner_table, &prop.name));
                    }
                    if prop.join_columns.is_empty() {
                        prop.join_columns = owner_pks
                            .iter()
                            .map(|c| match self_reference {
                                true => naming.self_join_key_column_name(&owner_name, c, 1),
                                false => naming.join_key_column_name(&owner_name, c),
                            })
                            .collect();
                    }
                    if prop.inverse_join_columns.is_empty() {
                        prop.inverse_join_columns = target
                            .pk_columns()
                            .iter()
                            .map(|c| match self_reference {
                                true => naming.self_join_key_column_name(&target.name, c, 2),
                                false => naming.join_key_column_name(&target.name, c),
                            })
                            .collect();
                    }
                    prop.referenced_column_names = owner_pks.clone();
                }
            }
        }

        Ok(())
    }

    fn apply_inverse_sides(&mut self) -> QueryResult<()> {
        let snapshot = self.entities.clone();

        for entity in self.entities.values_mut() {
            let owner_pks = entity.pk_columns();
            let owner_name = entity.name.clone();

            for prop in &mut entity.properties {
                let inverse = matches!(prop.kind, ReferenceKind::OneToMany)
                    || prop.is_one_to_one_inverse()
                    || (prop.kind == ReferenceKind::ManyToMany && !prop.owner);
                if !inverse {
                    continue;
                }

                let target = Self::target_of(&snapshot, &owner_name, prop)?;
                let mapped_by = prop.mapped_by.clone().ok_or_else(|| {
                    QueryError::invalid_criteria(format!(
                        "{}.{} requires mapped_by",
                        owner_name, prop.name
                    ))
                })?;
                let owning = target
                    .prop(&mapped_by)
                    .ok_or_else(|| QueryError::unknown_property(&target.name, &mapped_by))?;

                if prop.kind == ReferenceKind::ManyToMany {
                    prop.pivot_table = owning.pivot_table.clone();
                    prop.join_columns = owning.inverse_join_columns.clone();
                    prop.inverse_join_columns = owning.join_columns.clone();
                    prop.referenced_column_names = owner_pks.clone();
                } else {
                    // the foreign key lives on the target; identity matches use its key
                    prop.join_columns = owning.join_columns.clone();
                    prop.referenced_column_names = target.pk_columns();
                }
            }
        }

        Ok(())
    }
}

impl MetadataProvider for MetadataRegistry {
    fn find(&self, entity: &str) -> Option<&EntityMetadata> {
        self.entities.get(entity)
    }

    fn entity_names(&self) -> Vec<&str> {
        self.entities.keys().map(String::as_str).collect()
    }
}
