//! MetadataProvider trait definition.
//!
//! The query builder only needs to look entities up by name. Relations are
//! followed through this lookup at every step, so cyclic entity graphs never
//! need pointer links between metadata values.

use super::naming::{NamingStrategy, UnderscoreNamingStrategy};
use super::types::EntityMetadata;
use crate::error::{QueryError, QueryResult};

/// Read-only entity lookup consumed by the compiler.
///
/// # Example
///
/// ```ignore
/// use criteria_sql::metadata::{MetadataProvider, MetadataRegistry};
///
/// fn table_of(provider: &dyn MetadataProvider, entity: &str) -> QueryResult<String> {
///     Ok(provider.get(entity)?.table.clone())
/// }
/// ```
pub trait MetadataProvider: std::fmt::Debug + Send + Sync {
    /// Find an entity by name.
    fn find(&self, entity: &str) -> Option<&EntityMetadata>;

    /// Find an entity by name, failing with [`QueryError::UnknownEntity`].
    fn get(&self, entity: &str) -> QueryResult<&EntityMetadata> {
        self.find(entity)
            .ok_or_else(|| QueryError::UnknownEntity(entity.to_string()))
    }

    /// Names of all entities, used to walk inheritance hierarchies.
    fn entity_names(&self) -> Vec<&str>;

    /// Naming strategy for table aliases.
    fn naming(&self) -> &dyn NamingStrategy {
        &UnderscoreNamingStrategy
    }
}

/// Derived lookups shared by every provider.
pub trait MetadataProviderExt: MetadataProvider {
    /// Discriminator values of `entity` and all its subtypes.
    fn discriminator_values(&self, entity: &EntityMetadata) -> Vec<String> {
        let mut values: Vec<String> = entity.discriminator_value.iter().cloned().collect();
        let mut names = self.entity_names();
        names.sort_unstable();

        for name in names {
            let Some(candidate) = self.find(name) else {
                continue;
            };
            if candidate.name != entity.name && self.descends_from(candidate, &entity.name) {
                values.extend(candidate.discriminator_value.iter().cloned());
            }
        }

        values
    }

    /// Whether `entity` extends `ancestor`, directly or transitively.
    fn descends_from(&self, entity: &EntityMetadata, ancestor: &str) -> bool {
        let mut current = entity.extends.as_deref();
        // bounded by the number of entities so a malformed cycle terminates
        for _ in 0..self.entity_names().len() {
            match current {
                Some(name) if name == ancestor => return true,
                Some(name) => current = self.find(name).and_then(|e| e.extends.as_deref()),
                None => return false,
            }
        }
        false
    }
}

impl<T: MetadataProvider + ?Sized> MetadataProviderExt for T {}
