use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Alias, Expr, Order, Query, SelectStatement, SimpleExpr};
use sea_orm::{ConnectionTrait, DbBackend};

use crate::config::ClosureTableConfig;
use crate::error::{ClosureTableError, Result};
use crate::model::{Node, NodeColumn};
use crate::traits::NodeRepository;

/// Ids bound per `IN (...)` lookup, well below the bind limits of both
/// backends.
const LOOKUP_CHUNK: usize = 1000;

/// [`NodeRepository`] over an entity table addressed by name.
#[derive(Clone, Debug)]
pub struct NodeTable {
    table: Alias,
}

impl NodeTable {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: Alias::new(table.into()),
        }
    }

    pub fn from_config(config: &ClosureTableConfig) -> Self {
        Self::new(config.entity_table())
    }

    fn select(&self, include_deleted: bool) -> SelectStatement {
        let mut query = Query::select();
        query.columns(NodeColumn::ALL).from(self.table.clone());
        if !include_deleted {
            query.and_where(Expr::col(NodeColumn::DeletedAt).is_null());
        }
        query
    }

    async fn fetch<C: ConnectionTrait>(conn: &C, query: &SelectStatement) -> Result<Vec<Node>> {
        let rows = conn
            .query_all(conn.get_database_backend().build(query))
            .await?;
        rows.iter().map(Node::from_row).collect()
    }
}

fn parent_filter(parent_id: Option<i32>) -> SimpleExpr {
    match parent_id {
        Some(parent_id) => Expr::col(NodeColumn::ParentId).eq(parent_id),
        None => Expr::col(NodeColumn::ParentId).is_null(),
    }
}

#[async_trait]
impl NodeRepository for NodeTable {
    async fn insert<C: ConnectionTrait>(
        &self,
        conn: &C,
        parent_id: Option<i32>,
        position: i32,
        payload: &serde_json::Value,
    ) -> Result<Node> {
        let encoded = serde_json::to_string(payload)?;
        let mut insert = Query::insert();
        insert
            .into_table(self.table.clone())
            .columns([
                NodeColumn::ParentId,
                NodeColumn::Position,
                NodeColumn::Payload,
            ])
            .values([parent_id.into(), position.into(), encoded.into()])
            .map_err(|err| ClosureTableError::invariant(err.to_string()))?;

        let backend = conn.get_database_backend();
        let id = match backend {
            DbBackend::Postgres => {
                insert.returning_col(NodeColumn::Id);
                let row = conn
                    .query_one(backend.build(&insert))
                    .await?
                    .ok_or_else(|| ClosureTableError::invariant("insert returned no id"))?;
                row.try_get::<i32>("", "id")?
            }
            _ => {
                let result = conn.execute(backend.build(&insert)).await?;
                i32::try_from(result.last_insert_id()).map_err(|_| {
                    ClosureTableError::invariant("inserted id does not fit in i32")
                })?
            }
        };

        Ok(Node {
            id,
            parent_id,
            position,
            deleted_at: None,
            payload: payload.clone(),
        })
    }

    async fn find<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i32,
        include_deleted: bool,
    ) -> Result<Option<Node>> {
        let mut query = self.select(include_deleted);
        query.and_where(Expr::col(NodeColumn::Id).eq(id));
        Ok(Self::fetch(conn, &query).await?.into_iter().next())
    }

    async fn find_many<C: ConnectionTrait>(
        &self,
        conn: &C,
        ids: &[i32],
        include_deleted: bool,
    ) -> Result<Vec<Node>> {
        let mut nodes = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(LOOKUP_CHUNK) {
            let mut query = self.select(include_deleted);
            query.and_where(Expr::col(NodeColumn::Id).is_in(chunk.iter().copied()));
            nodes.extend(Self::fetch(conn, &query).await?);
        }
        Ok(nodes)
    }

    async fn children_of<C: ConnectionTrait>(
        &self,
        conn: &C,
        parent_id: Option<i32>,
        include_deleted: bool,
    ) -> Result<Vec<Node>> {
        let mut query = self.select(include_deleted);
        query
            .and_where(parent_filter(parent_id))
            .order_by(NodeColumn::Position, Order::Asc)
            .order_by(NodeColumn::Id, Order::Asc);
        Self::fetch(conn, &query).await
    }

    fn id_query(&self) -> SelectStatement {
        Query::select()
            .column(NodeColumn::Id)
            .from(self.table.clone())
            .to_owned()
    }

    async fn all<C: ConnectionTrait>(&self, conn: &C) -> Result<Vec<Node>> {
        let mut query = self.select(true);
        query.order_by(NodeColumn::Id, Order::Asc);
        Self::fetch(conn, &query).await
    }

    async fn update_placement<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i32,
        parent_id: Option<i32>,
        position: i32,
    ) -> Result<()> {
        let update = Query::update()
            .table(self.table.clone())
            .value(NodeColumn::ParentId, parent_id)
            .value(NodeColumn::Position, position)
            .and_where(Expr::col(NodeColumn::Id).eq(id))
            .to_owned();
        conn.execute(conn.get_database_backend().build(&update)).await?;
        Ok(())
    }

    async fn shift_positions<C: ConnectionTrait>(
        &self,
        conn: &C,
        parent_id: Option<i32>,
        from: i32,
        exclude: Option<i32>,
    ) -> Result<()> {
        let mut update = Query::update();
        update
            .table(self.table.clone())
            .value(
                NodeColumn::Position,
                Expr::col(NodeColumn::Position).add(1),
            )
            .and_where(parent_filter(parent_id))
            .and_where(Expr::col(NodeColumn::Position).gte(from));
        if let Some(exclude) = exclude {
            update.and_where(Expr::col(NodeColumn::Id).ne(exclude));
        }
        conn.execute(conn.get_database_backend().build(&update)).await?;
        Ok(())
    }

    async fn set_deleted_at<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i32,
        deleted_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let update = Query::update()
            .table(self.table.clone())
            .value(NodeColumn::DeletedAt, deleted_at)
            .and_where(Expr::col(NodeColumn::Id).eq(id))
            .to_owned();
        conn.execute(conn.get_database_backend().build(&update)).await?;
        Ok(())
    }

    async fn delete<C: ConnectionTrait>(&self, conn: &C, id: i32) -> Result<u64> {
        let delete = Query::delete()
            .from_table(self.table.clone())
            .and_where(Expr::col(NodeColumn::Id).eq(id))
            .to_owned();
        let result = conn
            .execute(conn.get_database_backend().build(&delete))
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_selected<C: ConnectionTrait>(
        &self,
        conn: &C,
        ids: SelectStatement,
    ) -> Result<u64> {
        let delete = Query::delete()
            .from_table(self.table.clone())
            .and_where(Expr::col(NodeColumn::Id).in_subquery(ids))
            .to_owned();
        let result = conn
            .execute(conn.get_database_backend().build(&delete))
            .await?;
        Ok(result.rows_affected())
    }
}
