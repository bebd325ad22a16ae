use async_trait::async_trait;
use sea_orm::sea_query::{Alias, Condition, Expr, Order, Query, SelectStatement};
use sea_orm::{ConnectionTrait, FromQueryResult};

use crate::config::ClosureTableConfig;
use crate::error::{ClosureTableError, Result};
use crate::model::{Edge, EdgeColumn, NewEdge};
use crate::traits::EdgeRepository;

/// Rows per multi-row INSERT, well below the bind limits of both backends.
const INSERT_CHUNK: usize = 1000;

/// [`EdgeRepository`] over a closure table addressed by name.
#[derive(Clone, Debug)]
pub struct EdgeTable {
    table: Alias,
}

impl EdgeTable {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: Alias::new(table.into()),
        }
    }

    pub fn from_config(config: &ClosureTableConfig) -> Self {
        Self::new(config.closure_table())
    }

    fn select(&self) -> SelectStatement {
        Query::select()
            .columns([
                EdgeColumn::ClosureId,
                EdgeColumn::Ancestor,
                EdgeColumn::Descendant,
                EdgeColumn::Depth,
            ])
            .from(self.table.clone())
            .to_owned()
    }

    async fn fetch<C: ConnectionTrait>(conn: &C, query: &SelectStatement) -> Result<Vec<Edge>> {
        let rows = conn
            .query_all(conn.get_database_backend().build(query))
            .await?;
        let mut edges = Vec::with_capacity(rows.len());
        for row in rows {
            edges.push(Edge::from_query_result(&row, "")?);
        }
        Ok(edges)
    }

    /// Ancestors of `node_id`, itself only when `include_self` is set.
    fn lineage_query(&self, node_id: i32, include_self: bool) -> SelectStatement {
        let mut query = Query::select();
        query
            .column(EdgeColumn::Ancestor)
            .from(self.table.clone())
            .and_where(Expr::col(EdgeColumn::Descendant).eq(node_id));
        if !include_self {
            query.and_where(Expr::col(EdgeColumn::Depth).gt(0));
        }
        query
    }

    async fn delete_where<C: ConnectionTrait>(
        &self,
        conn: &C,
        condition: Condition,
    ) -> Result<u64> {
        let delete = Query::delete()
            .from_table(self.table.clone())
            .cond_where(condition)
            .to_owned();
        let result = conn
            .execute(conn.get_database_backend().build(&delete))
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl EdgeRepository for EdgeTable {
    async fn insert_many<C: ConnectionTrait>(&self, conn: &C, edges: &[NewEdge]) -> Result<()> {
        for chunk in edges.chunks(INSERT_CHUNK) {
            let mut insert = Query::insert();
            insert.into_table(self.table.clone()).columns([
                EdgeColumn::Ancestor,
                EdgeColumn::Descendant,
                EdgeColumn::Depth,
            ]);
            for edge in chunk {
                insert
                    .values([
                        edge.ancestor.into(),
                        edge.descendant.into(),
                        edge.depth.into(),
                    ])
                    .map_err(|err| ClosureTableError::invariant(err.to_string()))?;
            }
            conn.execute(conn.get_database_backend().build(&insert)).await?;
        }
        Ok(())
    }

    async fn ancestors_of<C: ConnectionTrait>(
        &self,
        conn: &C,
        descendant: i32,
        include_self: bool,
    ) -> Result<Vec<Edge>> {
        let mut query = self.select();
        query.and_where(Expr::col(EdgeColumn::Descendant).eq(descendant));
        if !include_self {
            query.and_where(Expr::col(EdgeColumn::Depth).gt(0));
        }
        query.order_by(EdgeColumn::Depth, Order::Asc);
        Self::fetch(conn, &query).await
    }

    async fn descendants_of<C: ConnectionTrait>(
        &self,
        conn: &C,
        ancestor: i32,
        include_self: bool,
        max_depth: Option<i32>,
    ) -> Result<Vec<Edge>> {
        let mut query = self.select();
        query.and_where(Expr::col(EdgeColumn::Ancestor).eq(ancestor));
        if !include_self {
            query.and_where(Expr::col(EdgeColumn::Depth).gt(0));
        }
        if let Some(max_depth) = max_depth {
            query.and_where(Expr::col(EdgeColumn::Depth).lte(max_depth));
        }
        query
            .order_by(EdgeColumn::Depth, Order::Asc)
            .order_by(EdgeColumn::Descendant, Order::Asc);
        Self::fetch(conn, &query).await
    }

    async fn find<C: ConnectionTrait>(
        &self,
        conn: &C,
        ancestor: i32,
        descendant: i32,
    ) -> Result<Option<Edge>> {
        let mut query = self.select();
        query
            .and_where(Expr::col(EdgeColumn::Ancestor).eq(ancestor))
            .and_where(Expr::col(EdgeColumn::Descendant).eq(descendant));
        Ok(Self::fetch(conn, &query).await?.into_iter().next())
    }

    fn subtree_query(&self, node_id: i32) -> SelectStatement {
        Query::select()
            .column(EdgeColumn::Descendant)
            .from(self.table.clone())
            .and_where(Expr::col(EdgeColumn::Ancestor).eq(node_id))
            .to_owned()
    }

    async fn detach_subtree<C: ConnectionTrait>(
        &self,
        conn: &C,
        node_id: i32,
        include_self: bool,
    ) -> Result<u64> {
        self.delete_where(
            conn,
            Condition::all()
                .add(
                    Expr::col(EdgeColumn::Ancestor)
                        .in_subquery(self.lineage_query(node_id, include_self)),
                )
                .add(Expr::col(EdgeColumn::Descendant).in_subquery(self.subtree_query(node_id))),
        )
        .await
    }

    async fn attach_subtree<C: ConnectionTrait>(
        &self,
        conn: &C,
        node_id: i32,
        parent_id: i32,
    ) -> Result<u64> {
        let above = Alias::new("above");
        let below = Alias::new("below");
        let pairs = Query::select()
            .expr(Expr::col((above.clone(), EdgeColumn::Ancestor)))
            .expr(Expr::col((below.clone(), EdgeColumn::Descendant)))
            .expr(
                Expr::col((above.clone(), EdgeColumn::Depth))
                    .add(Expr::col((below.clone(), EdgeColumn::Depth)))
                    .add(1),
            )
            .from_as(self.table.clone(), above.clone())
            .from_as(self.table.clone(), below.clone())
            .and_where(Expr::col((above, EdgeColumn::Descendant)).eq(parent_id))
            .and_where(Expr::col((below, EdgeColumn::Ancestor)).eq(node_id))
            .to_owned();

        let mut insert = Query::insert();
        insert
            .into_table(self.table.clone())
            .columns([EdgeColumn::Ancestor, EdgeColumn::Descendant, EdgeColumn::Depth])
            .select_from(pairs)
            .map_err(|err| ClosureTableError::invariant(err.to_string()))?;
        let result = conn
            .execute(conn.get_database_backend().build(&insert))
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_dangling<C: ConnectionTrait>(
        &self,
        conn: &C,
        node_ids: SelectStatement,
    ) -> Result<u64> {
        self.delete_where(
            conn,
            Condition::any()
                .add(Expr::col(EdgeColumn::Ancestor).not_in_subquery(node_ids.clone()))
                .add(Expr::col(EdgeColumn::Descendant).not_in_subquery(node_ids)),
        )
        .await
    }

    async fn all<C: ConnectionTrait>(&self, conn: &C) -> Result<Vec<Edge>> {
        let mut query = self.select();
        query
            .order_by(EdgeColumn::Ancestor, Order::Asc)
            .order_by(EdgeColumn::Descendant, Order::Asc);
        Self::fetch(conn, &query).await
    }

    async fn clear<C: ConnectionTrait>(&self, conn: &C) -> Result<u64> {
        self.delete_where(conn, Condition::all()).await
    }
}
