//! Entity metadata types.
//!
//! These describe the mapped entity model: tables, primary keys, properties
//! and their relations. Relations refer to other entities by name only; the
//! registry resolves them on lookup.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a property relates to its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    #[default]
    Scalar,
    /// Flattened value object.
    Embedded,
    ManyToOne,
    OneToOne,
    OneToMany,
    ManyToMany,
}

impl ReferenceKind {
    /// Whether the property points at another entity.
    pub fn is_relation(self) -> bool {
        !matches!(self, ReferenceKind::Scalar | ReferenceKind::Embedded)
    }

    /// Whether joining the property can multiply owner rows.
    pub fn is_to_many(self) -> bool {
        matches!(self, ReferenceKind::OneToMany | ReferenceKind::ManyToMany)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReferenceKind::Scalar => "scalar",
            ReferenceKind::Embedded => "embedded",
            ReferenceKind::ManyToOne => "m:1",
            ReferenceKind::OneToOne => "1:1",
            ReferenceKind::OneToMany => "1:m",
            ReferenceKind::ManyToMany => "m:n",
        }
    }
}

/// A mapped property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityProperty {
    pub name: String,
    pub kind: ReferenceKind,
    /// Column names backing the property.
    pub field_names: Vec<String>,
    /// Related entity name.
    pub target: Option<String>,
    /// Owning side of a 1:1 or M:N relation.
    pub owner: bool,
    pub mapped_by: Option<String>,
    pub inversed_by: Option<String>,
    pub join_columns: Vec<String>,
    pub inverse_join_columns: Vec<String>,
    pub referenced_column_names: Vec<String>,
    pub pivot_table: Option<String>,
    /// SQL template; `{alias}` is replaced with the owner's alias.
    pub formula: Option<String>,
    /// `false` for virtual properties without a column.
    pub persist: bool,
    pub primary: bool,
    pub version: bool,
    pub autoincrement: bool,
    /// Embeddable sub-property name to flattened property name.
    pub embedded: BTreeMap<String, String>,
    /// Static filter applied whenever the relation is joined.
    pub filter: Option<Value>,
}

impl Default for EntityProperty {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: ReferenceKind::Scalar,
            field_names: Vec::new(),
            target: None,
            owner: false,
            mapped_by: None,
            inversed_by: None,
            join_columns: Vec::new(),
            inverse_join_columns: Vec::new(),
            referenced_column_names: Vec::new(),
            pivot_table: None,
            formula: None,
            persist: true,
            primary: false,
            version: false,
            autoincrement: false,
            embedded: BTreeMap::new(),
            filter: None,
        }
    }
}

impl EntityProperty {
    fn relation(name: &str, kind: ReferenceKind, target: &str) -> Self {
        Self {
            name: name.into(),
            kind,
            target: Some(target.into()),
            ..Default::default()
        }
    }

    pub fn scalar(name: &str) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Autoincrement primary key.
    pub fn primary(name: &str) -> Self {
        Self {
            name: name.into(),
            primary: true,
            autoincrement: true,
            ..Default::default()
        }
    }

    pub fn version(name: &str) -> Self {
        Self {
            name: name.into(),
            version: true,
            ..Default::default()
        }
    }

    pub fn formula(name: &str, template: &str) -> Self {
        Self {
            name: name.into(),
            formula: Some(template.into()),
            persist: false,
            ..Default::default()
        }
    }

    pub fn embedded<'a>(name: &str, fields: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            name: name.into(),
            kind: ReferenceKind::Embedded,
            embedded: fields
                .into_iter()
                .map(|f| (f.to_string(), format!("{}_{}", name, f)))
                .collect(),
            ..Default::default()
        }
    }

    pub fn many_to_one(name: &str, target: &str) -> Self {
        Self::relation(name, ReferenceKind::ManyToOne, target)
    }

    pub fn one_to_many(name: &str, target: &str, mapped_by: &str) -> Self {
        Self {
            mapped_by: Some(mapped_by.into()),
            ..Self::relation(name, ReferenceKind::OneToMany, target)
        }
    }

    /// Owning side of a one-to-one; holds the foreign key.
    pub fn one_to_one_owner(name: &str, target: &str) -> Self {
        Self {
            owner: true,
            ..Self::relation(name, ReferenceKind::OneToOne, target)
        }
    }

    pub fn one_to_one_inverse(name: &str, target: &str, mapped_by: &str) -> Self {
        Self {
            mapped_by: Some(mapped_by.into()),
            ..Self::relation(name, ReferenceKind::OneToOne, target)
        }
    }

    /// Owning side of a many-to-many; defines the pivot table.
    pub fn many_to_many_owner(name: &str, target: &str) -> Self {
        Self {
            owner: true,
            ..Self::relation(name, ReferenceKind::ManyToMany, target)
        }
    }

    pub fn many_to_many_inverse(name: &str, target: &str, mapped_by: &str) -> Self {
        Self {
            mapped_by: Some(mapped_by.into()),
            ..Self::relation(name, ReferenceKind::ManyToMany, target)
        }
    }

    pub fn inversed_by(mut self, prop: &str) -> Self {
        self.inversed_by = Some(prop.into());
        self
    }

    pub fn columns<'a>(mut self, columns: impl IntoIterator<Item = &'a str>) -> Self {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if self.kind.is_relation() {
            self.join_columns = columns;
        } else {
            self.field_names = columns;
        }
        self
    }

    pub fn pivot_table(mut self, table: &str) -> Self {
        self.pivot_table = Some(table.into());
        self
    }

    pub fn with_filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn is_relation(&self) -> bool {
        self.kind.is_relation()
    }

    /// Owning side of a 1:1 (holds the foreign key).
    pub fn is_one_to_one_owner(&self) -> bool {
        self.kind == ReferenceKind::OneToOne && self.owner
    }

    /// Inverse side of a 1:1 (foreign key lives on the target).
    pub fn is_one_to_one_inverse(&self) -> bool {
        self.kind == ReferenceKind::OneToOne && !self.owner
    }

    /// Relations whose foreign key is a column of the owner table.
    pub fn holds_foreign_key(&self) -> bool {
        self.kind == ReferenceKind::ManyToOne || self.is_one_to_one_owner()
    }

    pub fn target_name(&self) -> Option<&str> {
        self.target.as_deref()
    }
}

/// A mapped entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityMetadata {
    pub name: String,
    /// Table name; derived from the entity name when empty.
    pub table: String,
    pub schema: Option<String>,
    /// Primary key property names.
    pub primary_keys: Vec<String>,
    pub properties: Vec<EntityProperty>,
    /// Parent entity in a single-table-inheritance hierarchy.
    pub extends: Option<String>,
    pub discriminator_column: Option<String>,
    pub discriminator_value: Option<String>,
    /// Root of the inheritance hierarchy; set on registration.
    pub root: Option<String>,
}

impl EntityMetadata {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn table(mut self, table: &str) -> Self {
        self.table = table.into();
        self
    }

    pub fn schema(mut self, schema: &str) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn property(mut self, prop: EntityProperty) -> Self {
        self.properties.push(prop);
        self
    }

    pub fn extends(mut self, parent: &str, discriminator_value: &str) -> Self {
        self.extends = Some(parent.into());
        self.discriminator_value = Some(discriminator_value.into());
        self
    }

    pub fn discriminator(mut self, column: &str, value: &str) -> Self {
        self.discriminator_column = Some(column.into());
        self.discriminator_value = Some(value.into());
        self
    }

    pub fn prop(&self, name: &str) -> Option<&EntityProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub(crate) fn prop_mut(&mut self, name: &str) -> Option<&mut EntityProperty> {
        self.properties.iter_mut().find(|p| p.name == name)
    }

    /// Primary key column names, in key order.
    pub fn pk_columns(&self) -> Vec<String> {
        self.primary_keys
            .iter()
            .filter_map(|pk| self.prop(pk))
            .flat_map(|p| p.field_names.iter().cloned())
            .collect()
    }

    /// The single primary key property name, or the first of a composite key.
    pub fn primary_key(&self) -> Option<&str> {
        self.primary_keys.first().map(String::as_str)
    }

    pub fn is_composite_pk(&self) -> bool {
        self.pk_columns().len() > 1
    }

    pub fn version_property(&self) -> Option<&EntityProperty> {
        self.properties.iter().find(|p| p.version)
    }

    /// Whether the entity is a subtype in an inheritance hierarchy.
    pub fn is_sti_child(&self) -> bool {
        self.root.as_deref().is_some_and(|root| root != self.name)
    }

    /// Properties with a formula.
    pub fn formulas(&self) -> impl Iterator<Item = &EntityProperty> {
        self.properties.iter().filter(|p| p.formula.is_some())
    }
}
