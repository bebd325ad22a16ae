use std::collections::HashMap;

use sea_orm::ConnectionTrait;

use crate::config::ClosureTableConfig;
use crate::edge_table::EdgeTable;
use crate::error::{ClosureTableError, Result};
use crate::model::{Edge, Node};
use crate::node_table::NodeTable;
use crate::store::ensure_supported;
use crate::traits::{ClosureTableModel, EdgeRepository, NodeRepository};

/// Read-only queries answered from the closure table.
///
/// Soft-deleted nodes are hidden unless the index comes from
/// [`PathIndex::with_deleted`]; asking about a hidden node is
/// [`ClosureTableError::NotFound`].
#[derive(Clone, Debug)]
pub struct PathIndex<N = NodeTable, E = EdgeTable> {
    nodes: N,
    edges: E,
    include_deleted: bool,
}

impl PathIndex {
    pub fn new(config: &ClosureTableConfig) -> Self {
        Self::from_repositories(NodeTable::from_config(config), EdgeTable::from_config(config))
    }

    pub fn for_model<M: ClosureTableModel>() -> Self {
        Self::new(M::closure_table_config())
    }
}

impl<N, E> PathIndex<N, E>
where
    N: NodeRepository,
    E: EdgeRepository,
{
    pub fn from_repositories(nodes: N, edges: E) -> Self {
        Self {
            nodes,
            edges,
            include_deleted: false,
        }
    }

    /// The same index, with soft-deleted nodes visible.
    pub fn with_deleted(&self) -> Self {
        Self {
            include_deleted: true,
            ..self.clone()
        }
    }

    pub fn includes_deleted(&self) -> bool {
        self.include_deleted
    }

    pub async fn node<C: ConnectionTrait>(&self, conn: &C, id: i32) -> Result<Node> {
        ensure_supported(conn)?;
        self.nodes
            .find(conn, id, self.include_deleted)
            .await?
            .ok_or(ClosureTableError::NotFound(id))
    }

    /// `None` for a root or when the parent is hidden.
    pub async fn parent<C: ConnectionTrait>(&self, conn: &C, id: i32) -> Result<Option<Node>> {
        let node = self.node(conn, id).await?;
        match node.parent_id {
            Some(parent_id) => self.nodes.find(conn, parent_id, self.include_deleted).await,
            None => Ok(None),
        }
    }

    pub async fn roots<C: ConnectionTrait>(&self, conn: &C) -> Result<Vec<Node>> {
        ensure_supported(conn)?;
        self.nodes
            .children_of(conn, None, self.include_deleted)
            .await
    }

    /// Ancestors of `id`, closest first.
    pub async fn ancestors<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i32,
        include_self: bool,
    ) -> Result<Vec<Node>> {
        self.node(conn, id).await?;
        let edges = self.edges.ancestors_of(conn, id, include_self).await?;
        let mut resolved = self.resolve(conn, &edges, |edge| edge.ancestor).await?;
        resolved.sort_by_key(|(depth, _)| *depth);
        Ok(resolved.into_iter().map(|(_, node)| node).collect())
    }

    /// Descendants of `id` down to `max_depth` links, ordered by depth, then
    /// position.
    pub async fn descendants<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i32,
        include_self: bool,
        max_depth: Option<i32>,
    ) -> Result<Vec<Node>> {
        self.node(conn, id).await?;
        let edges = self
            .edges
            .descendants_of(conn, id, include_self, max_depth)
            .await?;
        let mut resolved = self.resolve(conn, &edges, |edge| edge.descendant).await?;
        resolved.sort_by_key(|(depth, node)| (*depth, node.position, node.id));
        Ok(resolved.into_iter().map(|(_, node)| node).collect())
    }

    /// Direct children of `id`, ordered by position.
    pub async fn children<C: ConnectionTrait>(&self, conn: &C, id: i32) -> Result<Vec<Node>> {
        self.descendants(conn, id, false, Some(1)).await
    }

    /// Nodes sharing the parent of `id`, ordered by position. Siblings of a
    /// root are the other roots.
    pub async fn siblings<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i32,
        include_self: bool,
    ) -> Result<Vec<Node>> {
        let node = self.node(conn, id).await?;
        let siblings = self
            .nodes
            .children_of(conn, node.parent_id, self.include_deleted)
            .await?;
        Ok(siblings
            .into_iter()
            .filter(|sibling| include_self || sibling.id != id)
            .collect())
    }

    /// Number of parent links from `ancestor` down to `descendant`.
    pub async fn depth<C: ConnectionTrait>(
        &self,
        conn: &C,
        ancestor: i32,
        descendant: i32,
    ) -> Result<i32> {
        self.node(conn, ancestor).await?;
        self.node(conn, descendant).await?;
        self.edges
            .find(conn, ancestor, descendant)
            .await?
            .map(|edge| edge.depth)
            .ok_or(ClosureTableError::PathNotFound {
                ancestor,
                descendant,
            })
    }

    /// Whether `a` sits strictly below `b`.
    pub async fn is_descendant_of<C: ConnectionTrait>(
        &self,
        conn: &C,
        a: i32,
        b: i32,
    ) -> Result<bool> {
        self.node(conn, a).await?;
        self.node(conn, b).await?;
        Ok(self
            .edges
            .find(conn, b, a)
            .await?
            .is_some_and(|edge| edge.depth > 0))
    }

    /// Pair each edge's depth with the visible node `endpoint` picks out.
    async fn resolve<C, F>(
        &self,
        conn: &C,
        edges: &[Edge],
        endpoint: F,
    ) -> Result<Vec<(i32, Node)>>
    where
        C: ConnectionTrait,
        F: Fn(&Edge) -> i32,
    {
        let ids: Vec<i32> = edges.iter().map(&endpoint).collect();
        let mut nodes: HashMap<i32, Node> = self
            .nodes
            .find_many(conn, &ids, self.include_deleted)
            .await?
            .into_iter()
            .map(|node| (node.id, node))
            .collect();

        Ok(edges
            .iter()
            .filter_map(|edge| nodes.remove(&endpoint(edge)).map(|node| (edge.depth, node)))
            .collect())
    }
}
