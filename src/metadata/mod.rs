//! Entity metadata module.
//!
//! This module describes the mapped entity model the compiler resolves
//! criteria against.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      MetadataProvider                           │
//! │           find(entity) / get(entity) / entity_names()           │
//! └─────────────────────────────────────────────────────────────────┘
//!                           ▲
//!                           │ implements
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      MetadataRegistry                           │
//! │   EntityMetadata by name + NamingStrategy-derived defaults      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use criteria_sql::metadata::{EntityMetadata, EntityProperty, MetadataRegistry};
//!
//! let registry = MetadataRegistry::new(vec![
//!     EntityMetadata::new("Author")
//!         .property(EntityProperty::primary("id"))
//!         .property(EntityProperty::one_to_many("books", "Book", "author")),
//!     EntityMetadata::new("Book")
//!         .property(EntityProperty::primary("id"))
//!         .property(EntityProperty::many_to_one("author", "Author")),
//! ])?;
//! ```

mod naming;
mod provider;
mod registry;
mod types;

pub use naming::{NamingStrategy, UnderscoreNamingStrategy};
pub use provider::{MetadataProvider, MetadataProviderExt};
pub use registry::MetadataRegistry;
pub use types::*;
