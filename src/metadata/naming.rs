//! Naming strategy for tables, columns and aliases.
//!
//! Uses the `inflector` crate for case conversion.

use inflector::Inflector;

/// Derives physical names from entity and property names.
pub trait NamingStrategy: std::fmt::Debug + Send + Sync {
    fn class_to_table_name(&self, entity: &str) -> String;

    fn property_to_column_name(&self, property: &str) -> String;

    /// Foreign key column on the owner side of a to-one relation.
    fn join_column_name(&self, property: &str, referenced_column: &str) -> String;

    /// Pivot table for a many-to-many owner.
    fn join_table_name(&self, owner_table: &str, property: &str) -> String;

    /// Pivot column pointing at `entity`.
    fn join_key_column_name(&self, entity: &str, referenced_column: &str) -> String;

    /// Pivot column of a self-referencing many-to-many; `side` is 1 (owner) or 2.
    fn self_join_key_column_name(&self, entity: &str, referenced_column: &str, side: u8) -> String {
        self.join_key_column_name(entity, &format!("{}_{}", side, referenced_column))
    }

    /// Alias for the n-th joined table of `name` (entity or pivot table).
    fn alias_name(&self, name: &str, index: usize) -> String {
        let first = name
            .chars()
            .find(|c| c.is_alphabetic())
            .map(|c| c.to_lowercase().to_string())
            .unwrap_or_else(|| "e".into());
        format!("{}{}", first, index)
    }
}

/// `snake_case` names: `BookTag` becomes `book_tag`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnderscoreNamingStrategy;

impl NamingStrategy for UnderscoreNamingStrategy {
    fn class_to_table_name(&self, entity: &str) -> String {
        entity.to_snake_case()
    }

    fn property_to_column_name(&self, property: &str) -> String {
        property.to_snake_case()
    }

    fn join_column_name(&self, property: &str, referenced_column: &str) -> String {
        format!("{}_{}", property.to_snake_case(), referenced_column)
    }

    fn join_table_name(&self, owner_table: &str, property: &str) -> String {
        format!("{}_{}", owner_table, property.to_snake_case())
    }

    fn join_key_column_name(&self, entity: &str, referenced_column: &str) -> String {
        format!("{}_{}", entity.to_snake_case(), referenced_column)
    }
}
