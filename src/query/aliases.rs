//! Table alias allocation.

use crate::error::{QueryError, QueryResult};
use crate::metadata::NamingStrategy;

/// A table alias and what it stands for.
#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
    pub name: String,
    /// Entity name, or pivot table name for pivot joins.
    pub entity: String,
    /// Whether the alias names a derived table.
    pub subquery: bool,
}

/// Aliases registered on one builder, in registration order.
#[derive(Debug, Clone, Default)]
pub struct AliasRegistry {
    aliases: Vec<Alias>,
    counter: usize,
}

impl AliasRegistry {
    /// Registry with the root alias reserved; `None` derives it from the entity.
    pub fn with_root(entity: &str, alias: Option<&str>, naming: &dyn NamingStrategy) -> Self {
        let mut registry = Self::default();
        let name = match alias {
            Some(alias) => {
                registry.counter = 1;
                alias.to_string()
            }
            None => registry.next_alias(entity, naming),
        };
        registry.aliases.push(Alias {
            name,
            entity: entity.to_string(),
            subquery: false,
        });
        registry
    }

    /// Next unused alias derived from `name`.
    pub fn next_alias(&mut self, name: &str, naming: &dyn NamingStrategy) -> String {
        loop {
            let candidate = naming.alias_name(name, self.counter);
            self.counter += 1;
            if self.get(&candidate).is_none() {
                return candidate;
            }
        }
    }

    /// Register a new alias.
    pub fn register(&mut self, name: &str, entity: &str, subquery: bool) -> QueryResult<()> {
        if self.get(name).is_some() {
            return Err(QueryError::AliasInUse(name.to_string()));
        }

        self.aliases.push(Alias {
            name: name.to_string(),
            entity: entity.to_string(),
            subquery,
        });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Alias> {
        self.aliases.iter().find(|a| a.name == name)
    }

    /// Look up an alias, failing with the list of known aliases.
    pub fn require(&self, name: &str) -> QueryResult<&Alias> {
        self.get(name).ok_or_else(|| QueryError::UnknownAlias {
            alias: name.to_string(),
            available: self.names(),
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.aliases.iter().map(|a| a.name.clone()).collect()
    }
}
