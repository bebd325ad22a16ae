use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::SelectStatement;
use sea_orm::ConnectionTrait;

use crate::config::ClosureTableConfig;
use crate::error::Result;
use crate::model::{Edge, NewEdge, Node};

/// Trait implemented by types bound to a closure-table hierarchy.
///
/// Implementations are normally provided by the `#[derive(ClosureTableModel)]` macro.
pub trait ClosureTableModel {
    fn closure_table_config() -> &'static ClosureTableConfig;
}

/// Row access to the entity table.
///
/// Lookups skip soft-deleted rows unless `include_deleted` is set. Sibling
/// listings are ordered by `position`, then `id`.
#[async_trait]
pub trait NodeRepository: Clone + Send + Sync {
    async fn insert<C: ConnectionTrait>(
        &self,
        conn: &C,
        parent_id: Option<i32>,
        position: i32,
        payload: &serde_json::Value,
    ) -> Result<Node>;

    async fn find<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i32,
        include_deleted: bool,
    ) -> Result<Option<Node>>;

    /// Rows whose id is in `ids`, in no particular order.
    async fn find_many<C: ConnectionTrait>(
        &self,
        conn: &C,
        ids: &[i32],
        include_deleted: bool,
    ) -> Result<Vec<Node>>;

    /// Rows with the given `parent_id`; `None` lists the roots.
    async fn children_of<C: ConnectionTrait>(
        &self,
        conn: &C,
        parent_id: Option<i32>,
        include_deleted: bool,
    ) -> Result<Vec<Node>>;

    /// `SELECT id` over every row.
    fn id_query(&self) -> SelectStatement;

    /// Every row, soft-deleted ones included.
    async fn all<C: ConnectionTrait>(&self, conn: &C) -> Result<Vec<Node>>;

    async fn update_placement<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i32,
        parent_id: Option<i32>,
        position: i32,
    ) -> Result<()>;

    /// Add one to the position of every sibling under `parent_id` at or
    /// after `from`, skipping `exclude`.
    async fn shift_positions<C: ConnectionTrait>(
        &self,
        conn: &C,
        parent_id: Option<i32>,
        from: i32,
        exclude: Option<i32>,
    ) -> Result<()>;

    async fn set_deleted_at<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i32,
        deleted_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    async fn delete<C: ConnectionTrait>(&self, conn: &C, id: i32) -> Result<u64>;

    /// Delete the rows whose id is returned by `ids`.
    async fn delete_selected<C: ConnectionTrait>(
        &self,
        conn: &C,
        ids: SelectStatement,
    ) -> Result<u64>;
}

/// Row access to the closure table.
///
/// Edge listings are ordered by `depth` ascending.
#[async_trait]
pub trait EdgeRepository: Clone + Send + Sync {
    async fn insert_many<C: ConnectionTrait>(&self, conn: &C, edges: &[NewEdge]) -> Result<()>;

    /// Edges ending at `descendant`.
    async fn ancestors_of<C: ConnectionTrait>(
        &self,
        conn: &C,
        descendant: i32,
        include_self: bool,
    ) -> Result<Vec<Edge>>;

    /// Edges starting at `ancestor`, optionally bounded by `max_depth`.
    async fn descendants_of<C: ConnectionTrait>(
        &self,
        conn: &C,
        ancestor: i32,
        include_self: bool,
        max_depth: Option<i32>,
    ) -> Result<Vec<Edge>>;

    async fn find<C: ConnectionTrait>(
        &self,
        conn: &C,
        ancestor: i32,
        descendant: i32,
    ) -> Result<Option<Edge>>;

    /// `SELECT descendant` over the subtree rooted at `node_id`, itself
    /// included.
    fn subtree_query(&self, node_id: i32) -> SelectStatement;

    /// Delete the edges from the ancestors of `node_id` into its subtree.
    /// With `include_self` the edges from `node_id` itself go too.
    async fn detach_subtree<C: ConnectionTrait>(
        &self,
        conn: &C,
        node_id: i32,
        include_self: bool,
    ) -> Result<u64>;

    /// Link the subtree of `node_id` under `parent_id` and every ancestor of
    /// `parent_id`.
    async fn attach_subtree<C: ConnectionTrait>(
        &self,
        conn: &C,
        node_id: i32,
        parent_id: i32,
    ) -> Result<u64>;

    /// Delete every edge with an endpoint outside `node_ids`.
    async fn delete_dangling<C: ConnectionTrait>(
        &self,
        conn: &C,
        node_ids: SelectStatement,
    ) -> Result<u64>;

    async fn all<C: ConnectionTrait>(&self, conn: &C) -> Result<Vec<Edge>>;

    async fn clear<C: ConnectionTrait>(&self, conn: &C) -> Result<u64>;
}
