//! DDL for the entity and closure tables described by a [`ClosureTableConfig`].

use sea_orm::sea_query::{
    Alias, ColumnDef, ForeignKey, ForeignKeyAction, Index, IndexCreateStatement, Table,
    TableCreateStatement, TableDropStatement,
};
use sea_orm::{ConnectionTrait, DbBackend};
use tracing::debug;

use crate::config::ClosureTableConfig;
use crate::error::Result;
use crate::model::{EdgeColumn, NodeColumn};

/// Entity table: `parent_id` references `id` with `ON DELETE SET NULL`.
pub fn entity_table(config: &ClosureTableConfig, backend: DbBackend) -> TableCreateStatement {
    let table = Alias::new(config.entity_table());
    let mut statement = Table::create();
    statement
        .table(table.clone())
        .if_not_exists()
        .col(
            ColumnDef::new(NodeColumn::Id)
                .integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(ColumnDef::new(NodeColumn::ParentId).integer().null())
        .col(
            ColumnDef::new(NodeColumn::Position)
                .integer()
                .not_null()
                .default(0),
        )
        .col(
            ColumnDef::new(NodeColumn::DeletedAt)
                .timestamp_with_time_zone()
                .null(),
        )
        .col(ColumnDef::new(NodeColumn::Payload).text().not_null())
        .foreign_key(
            ForeignKey::create()
                .name(format!("fk_{}_parent_id", config.entity_table()))
                .from(table.clone(), NodeColumn::ParentId)
                .to(table, NodeColumn::Id)
                .on_delete(ForeignKeyAction::SetNull),
        );
    apply_storage_options(&mut statement, config, backend);
    statement
}

/// Closure table: both endpoints reference the entity table with
/// `ON DELETE CASCADE`.
pub fn closure_table(config: &ClosureTableConfig, backend: DbBackend) -> TableCreateStatement {
    let table = Alias::new(config.closure_table());
    let entity = Alias::new(config.entity_table());
    let mut statement = Table::create();
    statement
        .table(table.clone())
        .if_not_exists()
        .col(
            ColumnDef::new(EdgeColumn::ClosureId)
                .integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(ColumnDef::new(EdgeColumn::Ancestor).integer().not_null())
        .col(ColumnDef::new(EdgeColumn::Descendant).integer().not_null())
        .col(
            ColumnDef::new(EdgeColumn::Depth)
                .integer()
                .not_null()
                .default(0),
        )
        .foreign_key(
            ForeignKey::create()
                .name(format!("fk_{}_ancestor", config.closure_table()))
                .from(table.clone(), EdgeColumn::Ancestor)
                .to(entity.clone(), NodeColumn::Id)
                .on_delete(ForeignKeyAction::Cascade),
        )
        .foreign_key(
            ForeignKey::create()
                .name(format!("fk_{}_descendant", config.closure_table()))
                .from(table, EdgeColumn::Descendant)
                .to(entity, NodeColumn::Id)
                .on_delete(ForeignKeyAction::Cascade),
        );
    apply_storage_options(&mut statement, config, backend);
    statement
}

/// One unique pair index for edge lookups and one for ancestor listings.
pub fn closure_indexes(config: &ClosureTableConfig) -> Vec<IndexCreateStatement> {
    let name = config.closure_table();
    vec![
        Index::create()
            .name(format!("{name}_ancestor_descendant_unique"))
            .table(Alias::new(name))
            .col(EdgeColumn::Ancestor)
            .col(EdgeColumn::Descendant)
            .unique()
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name(format!("{name}_descendant_depth_index"))
            .table(Alias::new(name))
            .col(EdgeColumn::Descendant)
            .col(EdgeColumn::Depth)
            .if_not_exists()
            .to_owned(),
    ]
}

/// Drop statements, closure table first.
pub fn drop_tables(config: &ClosureTableConfig) -> [TableDropStatement; 2] {
    [
        Table::drop()
            .table(Alias::new(config.closure_table()))
            .if_exists()
            .to_owned(),
        Table::drop()
            .table(Alias::new(config.entity_table()))
            .if_exists()
            .to_owned(),
    ]
}

fn apply_storage_options(
    statement: &mut TableCreateStatement,
    config: &ClosureTableConfig,
    backend: DbBackend,
) {
    // Engine and charset are MySQL table options.
    if config.use_extra_storage_options() && backend == DbBackend::MySql {
        statement
            .engine("InnoDB")
            .character_set("utf8mb4")
            .collate("utf8mb4_unicode_ci");
    }
}

/// Create both tables and the closure indexes if they do not exist yet.
pub async fn create_tables<C: ConnectionTrait>(
    conn: &C,
    config: &ClosureTableConfig,
) -> Result<()> {
    let backend = conn.get_database_backend();
    conn.execute(backend.build(&entity_table(config, backend)))
        .await?;
    conn.execute(backend.build(&closure_table(config, backend)))
        .await?;
    for index in closure_indexes(config) {
        conn.execute(backend.build(&index)).await?;
    }
    debug!(
        entity = config.entity_table(),
        closure = config.closure_table(),
        "created closure-table schema"
    );
    Ok(())
}

pub async fn drop_all<C: ConnectionTrait>(conn: &C, config: &ClosureTableConfig) -> Result<()> {
    let backend = conn.get_database_backend();
    for statement in drop_tables(config) {
        conn.execute(backend.build(&statement)).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use sea_orm::sea_query::{MysqlQueryBuilder, PostgresQueryBuilder, SqliteQueryBuilder};

    use super::*;
    use crate::config::ClosureTableOptions;

    fn config() -> ClosureTableConfig {
        ClosureTableConfig::new("Category", "categories")
    }

    #[test]
    fn entity_table_nulls_parent_on_delete() {
        let sql = entity_table(&config(), DbBackend::Postgres).to_string(PostgresQueryBuilder);

        assert!(sql.starts_with(r#"CREATE TABLE IF NOT EXISTS "categories""#));
        for column in ["id", "parent_id", "position", "deleted_at", "payload"] {
            assert!(sql.contains(&format!(r#""{column}""#)), "missing {column}: {sql}");
        }
        assert!(sql.contains("ON DELETE SET NULL"));
        assert!(!sql.contains("CASCADE"));
    }

    #[test]
    fn closure_table_cascades_both_endpoints() {
        let sql = closure_table(&config(), DbBackend::Sqlite).to_string(SqliteQueryBuilder);

        assert!(sql.contains(r#""categories_closure""#));
        assert!(sql.contains(r#""closure_id""#));
        assert!(sql.contains(r#""depth""#));
        assert_eq!(sql.matches("ON DELETE CASCADE").count(), 2, "{sql}");
    }

    #[test]
    fn closure_indexes_are_named_after_the_table() {
        let sql: Vec<String> = closure_indexes(&config())
            .iter()
            .map(|index| index.to_string(PostgresQueryBuilder))
            .collect();

        assert!(sql[0].contains("UNIQUE"));
        assert!(sql[0].contains("categories_closure_ancestor_descendant_unique"));
        assert!(sql[1].contains("categories_closure_descendant_depth_index"));
    }

    #[test]
    fn storage_options_only_apply_when_enabled() {
        let plain = entity_table(&config(), DbBackend::MySql).to_string(MysqlQueryBuilder);
        assert!(!plain.contains("InnoDB"));

        let extra = ClosureTableOptions::default()
            .use_extra_storage_options(true)
            .apply(config());
        let mysql = entity_table(&extra, DbBackend::MySql).to_string(MysqlQueryBuilder);
        assert!(mysql.contains("InnoDB"));
        assert!(mysql.contains("utf8mb4"));

        let postgres = entity_table(&extra, DbBackend::Postgres).to_string(PostgresQueryBuilder);
        assert!(!postgres.contains("InnoDB"));
    }

    #[test]
    fn drops_closure_before_entity() {
        let [closure, entity] = drop_tables(&config());
        assert!(closure
            .to_string(PostgresQueryBuilder)
            .contains(r#""categories_closure""#));
        assert_eq!(
            entity.to_string(PostgresQueryBuilder),
            r#"DROP TABLE IF EXISTS "categories""#
        );
    }
}
