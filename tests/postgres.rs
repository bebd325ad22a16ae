use closure_table::prelude::*;
use closure_table::schema;
use sea_orm::{Database, DatabaseConnection};
use serde_json::json;

fn config() -> ClosureTableConfig {
    ClosureTableConfig::new("PgNode", "pg_nodes")
}

async fn setup_database() -> Result<Option<DatabaseConnection>, ClosureTableError> {
    let Ok(url) = std::env::var("CLOSURE_TABLE_TEST_DATABASE_URL") else {
        eprintln!("CLOSURE_TABLE_TEST_DATABASE_URL not set, skipping PostgreSQL test");
        return Ok(None);
    };

    let db = Database::connect(url).await?;
    schema::drop_all(&db, &config()).await?;
    schema::create_tables(&db, &config()).await?;
    Ok(Some(db))
}

#[tokio::test]
async fn move_subtree_keeps_closure_consistent() -> Result<(), Box<dyn std::error::Error>> {
    let Some(db) = setup_database().await? else {
        return Ok(());
    };

    let store = TreeStore::new(config());
    let index = store.index();

    let root = store.create_node(&db, None, 0, json!({ "name": "R" })).await?;
    let c1 = store.create_node(&db, Some(root.id), 0, json!({ "name": "C1" })).await?;
    let c2 = store.create_node(&db, Some(root.id), 1, json!({ "name": "C2" })).await?;
    let grandchild = store.create_node(&db, Some(c1.id), 0, json!({ "name": "G" })).await?;

    store.move_subtree(&db, c1.id, Some(c2.id), 0).await?;

    let chain: Vec<i32> = index
        .ancestors(&db, grandchild.id, false)
        .await?
        .into_iter()
        .map(|node| node.id)
        .collect();
    assert_eq!(chain, vec![c1.id, c2.id, root.id]);
    assert_eq!(index.depth(&db, root.id, grandchild.id).await?, 3);

    store.delete_node(&db, c1.id, true).await?;
    assert!(index.with_deleted().node(&db, c1.id).await?.is_deleted());
    store.restore_node(&db, c1.id).await?;

    store.verify_closure(&db).await?;
    Ok(())
}
