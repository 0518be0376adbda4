//! Alias allocation properties, formulas, relation filters and composite keys.

mod fixtures;

use std::collections::BTreeSet;

use criteria_sql::metadata::{EntityMetadata, EntityProperty, MetadataRegistry};
use criteria_sql::sql::Dialect;
use fixtures::{builder, registry};
use proptest::prelude::*;
use serde_json::{json, Value};

// ============================================================================
// Alias allocation
// ============================================================================

/// Criteria on Author and the join paths each one needs.
fn relation_criteria(choice: usize) -> (Value, &'static [&'static str]) {
    match choice {
        0 => (json!({"books": {"title": "x"}}), &["Author.books"]),
        1 => (
            json!({"books": {"publisher": {"name": "x"}}}),
            &["Author.books", "Author.books.publisher"],
        ),
        2 => (
            json!({"books": {"tags": {"name": "x"}}}),
            &["Author.books", "Author.books.tags", "Author.books.tags[pivot]"],
        ),
        _ => (json!({"profile": {"bio": "x"}}), &["Author.profile"]),
    }
}

proptest! {
    #[test]
    fn aliases_stay_unique_and_paths_are_joined_once(choices in prop::collection::vec(0usize..4, 1..12)) {
        let registry = registry();
        let mut qb = builder(&registry, "Author", Dialect::DuckDb);

        let mut paths = BTreeSet::new();
        for choice in &choices {
            let (criteria, needed) = relation_criteria(*choice);
            qb.and_filter(criteria).unwrap();
            paths.extend(needed.iter().copied());
        }

        let names = qb.alias_names();
        let unique: BTreeSet<&String> = names.iter().collect();
        prop_assert_eq!(unique.len(), names.len());
        prop_assert_eq!(qb.joins().count(), paths.len());

        let join_aliases: BTreeSet<&str> = qb.joins().map(|j| j.alias.as_str()).collect();
        prop_assert_eq!(join_aliases.len(), paths.len());
        prop_assert!(!join_aliases.contains("a0"));
    }

    #[test]
    fn recompiling_never_changes_output(choices in prop::collection::vec(0usize..4, 0..6), limit in 1u64..50) {
        let registry = registry();
        let mut qb = builder(&registry, "Author", Dialect::Postgres);
        for choice in &choices {
            qb.and_filter(relation_criteria(*choice).0).unwrap();
        }
        qb.limit(limit).unwrap();

        let first = qb.compile().unwrap();
        let second = qb.compile().unwrap();
        prop_assert_eq!(first, second);
    }
}

#[test]
fn test_alias_counter_is_shared_across_tables() {
    let registry = registry();
    let mut qb = builder(&registry, "Book", Dialect::DuckDb);
    qb.filter(json!({"author": {"name": "x"}, "publisher": {"name": "y"}})).unwrap();

    assert_eq!(qb.alias_names(), vec!["b0", "a1", "p2"]);
    assert_eq!(qb.alias_for_join_path("Book.publisher").as_deref(), Some("p2"));
}

#[test]
fn test_explicit_alias_cannot_be_reused() {
    let registry = registry();
    let mut qb = builder(&registry, "Author", Dialect::DuckDb);
    qb.left_join("books", "b").unwrap();

    assert_eq!(
        qb.left_join("profile", "b").unwrap_err(),
        criteria_sql::QueryError::AliasInUse("b".into())
    );
}

// ============================================================================
// Formulas, relation filters, schemas and composite keys
// ============================================================================

fn shop_registry() -> MetadataRegistry {
    MetadataRegistry::new(vec![
        EntityMetadata::new("Basket")
            .schema("sales")
            .property(EntityProperty::primary("id"))
            .property(
                EntityProperty::one_to_many("lines", "Line", "basket")
                    .with_filter(json!({"qty": {"$gt": 0}})),
            ),
        EntityMetadata::new("Line")
            .schema("sales")
            .property(EntityProperty::primary("id"))
            .property(EntityProperty::scalar("price"))
            .property(EntityProperty::scalar("qty"))
            .property(EntityProperty::formula("total", "{alias}.price * {alias}.qty"))
            .property(EntityProperty::many_to_one("basket", "Basket")),
    ])
    .unwrap()
}

#[test]
fn test_formula_is_selected_with_star() {
    let registry = shop_registry();
    let mut qb = builder(&registry, "Line", Dialect::DuckDb);

    assert_eq!(
        qb.get_query().unwrap(),
        "SELECT \"l0\".*, l0.price * l0.qty AS \"total\" FROM \"sales\".\"line\" AS \"l0\""
    );
}

#[test]
fn test_formula_in_criteria() {
    let registry = shop_registry();
    let mut qb = builder(&registry, "Line", Dialect::DuckDb);
    qb.select(["id", "total"]).unwrap();
    qb.filter(json!({"total": {"$gt": 100}})).unwrap();

    let compiled = qb.compile().unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT \"l0\".\"id\", l0.price * l0.qty AS \"total\" FROM \"sales\".\"line\" AS \"l0\" WHERE l0.price * l0.qty > ?"
    );
    assert_eq!(compiled.params, vec![json!(100)]);
}

#[test]
fn test_relation_filter_joins_into_on_clause() {
    let registry = shop_registry();
    let mut qb = builder(&registry, "Basket", Dialect::Postgres);
    qb.filter(json!({"lines": {"price": 5}})).unwrap();

    let compiled = qb.compile().unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT \"b0\".* FROM \"sales\".\"basket\" AS \"b0\" LEFT JOIN \"sales\".\"line\" AS \"l1\" ON \"b0\".\"id\" = \"l1\".\"basket_id\" AND \"l1\".\"qty\" > $1 WHERE \"l1\".\"price\" = $2"
    );
    assert_eq!(compiled.params, vec![json!(0), json!(5)]);
}

fn membership_registry() -> MetadataRegistry {
    let mut org = EntityProperty::scalar("org_id");
    org.primary = true;
    let mut user = EntityProperty::scalar("user_id");
    user.primary = true;

    MetadataRegistry::new(vec![EntityMetadata::new("Membership")
        .property(org)
        .property(user)
        .property(EntityProperty::scalar("role"))])
    .unwrap()
}

#[test]
fn test_composite_primary_key_shorthand() {
    let registry = membership_registry();
    let mut qb = builder(&registry, "Membership", Dialect::DuckDb);
    qb.filter(json!([[1, 2], [3, 4]])).unwrap();

    let compiled = qb.compile().unwrap();
    assert!(
        compiled
            .sql
            .ends_with("WHERE (\"m0\".\"org_id\", \"m0\".\"user_id\") IN ((?, ?), (?, ?))"),
        "{}",
        compiled.sql
    );
    assert_eq!(compiled.params, vec![json!(1), json!(2), json!(3), json!(4)]);
}
