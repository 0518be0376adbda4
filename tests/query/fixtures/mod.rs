//! Shared entity model for the query integration tests.
//!
//! ```text
//! Author 1──* Book *──1 Publisher
//!   │1         │*
//!   │1         *
//! Profile     Tag          Person <── Employee <── Manager   (single table)
//! ```

#![allow(dead_code)]

use criteria_sql::metadata::{EntityMetadata, EntityProperty, MetadataRegistry};
use criteria_sql::query::CompilerOptions;
use criteria_sql::sql::Dialect;
use criteria_sql::QueryBuilder;

pub fn registry() -> MetadataRegistry {
    MetadataRegistry::new(vec![
        EntityMetadata::new("Author")
            .property(EntityProperty::primary("id"))
            .property(EntityProperty::scalar("name"))
            .property(EntityProperty::scalar("age"))
            .property(EntityProperty::version("version"))
            .property(EntityProperty::embedded("address", ["city", "street"]))
            .property(EntityProperty::one_to_many("books", "Book", "author"))
            .property(EntityProperty::one_to_one_inverse("profile", "Profile", "author")),
        EntityMetadata::new("Book")
            .property(EntityProperty::primary("id"))
            .property(EntityProperty::scalar("title"))
            .property(EntityProperty::scalar("price"))
            .property(EntityProperty::many_to_one("author", "Author"))
            .property(EntityProperty::many_to_one("publisher", "Publisher"))
            .property(EntityProperty::many_to_many_owner("tags", "Tag")),
        EntityMetadata::new("Tag")
            .property(EntityProperty::primary("id"))
            .property(EntityProperty::scalar("name"))
            .property(EntityProperty::many_to_many_inverse("books", "Book", "tags")),
        EntityMetadata::new("Publisher")
            .property(EntityProperty::primary("id"))
            .property(EntityProperty::scalar("name"))
            .property(EntityProperty::one_to_many("books", "Book", "publisher")),
        EntityMetadata::new("Profile")
            .property(EntityProperty::primary("id"))
            .property(EntityProperty::scalar("bio"))
            .property(EntityProperty::one_to_one_owner("author", "Author")),
        EntityMetadata::new("Person")
            .discriminator("type", "person")
            .property(EntityProperty::primary("id"))
            .property(EntityProperty::scalar("name")),
        EntityMetadata::new("Employee")
            .extends("Person", "employee")
            .property(EntityProperty::scalar("salary")),
        EntityMetadata::new("Manager")
            .extends("Employee", "manager")
            .property(EntityProperty::scalar("reports")),
    ])
    .expect("fixture metadata registers")
}

/// Builder on `entity` for `dialect` with default options.
pub fn builder<'m>(registry: &'m MetadataRegistry, entity: &str, dialect: Dialect) -> QueryBuilder<'m> {
    QueryBuilder::with_options(registry, entity, None, CompilerOptions::for_dialect(dialect))
        .expect("fixture entity exists")
}

/// Assert that `sql` parses in `dialect`.
pub fn assert_valid_sql(sql: &str, dialect: Dialect) {
    use sqlparser::dialect::{
        DuckDbDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect, RedshiftSqlDialect,
        SnowflakeDialect,
    };
    use sqlparser::parser::Parser;

    let parser_dialect: Box<dyn sqlparser::dialect::Dialect> = match dialect {
        Dialect::Postgres => Box::new(PostgreSqlDialect {}),
        Dialect::DuckDb => Box::new(DuckDbDialect {}),
        Dialect::MySql => Box::new(MySqlDialect {}),
        Dialect::TSql => Box::new(MsSqlDialect {}),
        Dialect::Snowflake => Box::new(SnowflakeDialect {}),
        Dialect::Redshift => Box::new(RedshiftSqlDialect {}),
    };

    if let Err(e) = Parser::parse_sql(&*parser_dialect, sql) {
        panic!("invalid SQL for {}: {}\nSQL: {}", dialect, e, sql);
    }
}
