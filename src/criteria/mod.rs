//! Criteria trees.
//!
//! JSON criteria are parsed into a [`CriteriaNode`] tree against entity
//! metadata, then processed against a query builder. Processing registers the
//! joins relation criteria need and rewrites every key to the column it
//! compares.
//!
//! ```text
//! {"books": {"title": "Dune"}}  ──create_node──▶  Author ─ books(Book) ─ title
//!                                ──process────▶  {"b1.title": "Dune"} + LEFT JOIN book b1
//! ```

pub mod factory;
pub mod node;
pub mod operators;
mod process;

pub use factory::create_node;
pub use node::{CriteriaNode, Payload};
pub use operators::Operator;
pub use process::ALIAS_PLACEHOLDER;

pub(crate) use process::inline_condition;
