use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend};
use tracing::debug;

use crate::config::{ClosureTableConfig, DependentBehavior, PositionPolicy};
use crate::edge_table::EdgeTable;
use crate::error::{ClosureTableError, Result};
use crate::lock::LockedTransaction;
use crate::model::{NewEdge, Node};
use crate::node_table::NodeTable;
use crate::path_index::PathIndex;
use crate::traits::{ClosureTableModel, EdgeRepository, NodeRepository};

pub(crate) fn ensure_supported(conn: &impl ConnectionTrait) -> Result<()> {
    match conn.get_database_backend() {
        DbBackend::Postgres | DbBackend::Sqlite => Ok(()),
        _ => Err(ClosureTableError::UnsupportedBackend),
    }
}

fn to_position(index: usize) -> Result<i32> {
    i32::try_from(index).map_err(|_| ClosureTableError::invariant("sibling count exceeds i32"))
}

/// Structural mutations over one closure-table hierarchy.
///
/// Every mutation runs in its own [`LockedTransaction`]: it either commits
/// all of its row and edge changes or none of them.
#[derive(Clone, Debug)]
pub struct TreeStore<N = NodeTable, E = EdgeTable> {
    config: ClosureTableConfig,
    nodes: N,
    edges: E,
}

impl TreeStore {
    pub fn new(config: ClosureTableConfig) -> Self {
        let nodes = NodeTable::from_config(&config);
        let edges = EdgeTable::from_config(&config);
        Self::with_repositories(config, nodes, edges)
    }

    pub fn for_model<M: ClosureTableModel>() -> Self {
        Self::new(M::closure_table_config().clone())
    }
}

impl<N, E> TreeStore<N, E>
where
    N: NodeRepository,
    E: EdgeRepository,
{
    pub fn with_repositories(config: ClosureTableConfig, nodes: N, edges: E) -> Self {
        Self {
            config,
            nodes,
            edges,
        }
    }

    pub fn config(&self) -> &ClosureTableConfig {
        &self.config
    }

    /// Query surface over the same tables, hiding soft-deleted nodes.
    pub fn index(&self) -> PathIndex<N, E> {
        PathIndex::from_repositories(self.nodes.clone(), self.edges.clone())
    }

    async fn begin(&self, db: &DatabaseConnection) -> Result<LockedTransaction> {
        ensure_supported(db)?;
        LockedTransaction::acquire(self.config.advisory_lock_strategy(), db).await
    }

    /// Insert a node under `parent_id` (a root when `None`) at `position`
    /// among its siblings.
    pub async fn create_node(
        &self,
        db: &DatabaseConnection,
        parent_id: Option<i32>,
        position: i32,
        payload: serde_json::Value,
    ) -> Result<Node> {
        let guard = self.begin(db).await?;
        let result = self
            .create_node_on(guard.connection(), parent_id, position, &payload)
            .await;
        guard.finish(result).await
    }

    /// Re-attach `node_id` and its whole subtree under `new_parent_id`.
    pub async fn move_subtree(
        &self,
        db: &DatabaseConnection,
        node_id: i32,
        new_parent_id: Option<i32>,
        position: i32,
    ) -> Result<()> {
        let guard = self.begin(db).await?;
        let result = self
            .move_subtree_on(guard.connection(), node_id, new_parent_id, position)
            .await;
        guard.finish(result).await
    }

    /// Soft delete marks the node; hard delete purges it according to the
    /// configured [`DependentBehavior`].
    pub async fn delete_node(
        &self,
        db: &DatabaseConnection,
        node_id: i32,
        soft: bool,
    ) -> Result<()> {
        let guard = self.begin(db).await?;
        let result = if soft {
            self.soft_delete_on(guard.connection(), node_id).await
        } else {
            self.hard_delete_on(guard.connection(), node_id).await
        };
        guard.finish(result).await
    }

    pub async fn restore_node(&self, db: &DatabaseConnection, node_id: i32) -> Result<()> {
        let guard = self.begin(db).await?;
        let result = self.restore_node_on(guard.connection(), node_id).await;
        guard.finish(result).await
    }

    /// Compare the stored edges with the closure implied by the parent links.
    pub async fn verify_closure<C: ConnectionTrait>(&self, conn: &C) -> Result<()> {
        ensure_supported(conn)?;
        let nodes = self.nodes.all(conn).await?;
        let expected = expected_closure(&nodes)?;

        let mut stored = HashMap::with_capacity(expected.len());
        for edge in self.edges.all(conn).await? {
            let key = (edge.ancestor, edge.descendant);
            if stored.insert(key, edge.depth).is_some() {
                return Err(ClosureTableError::invariant(format!(
                    "duplicate edge {} -> {}",
                    edge.ancestor, edge.descendant
                )));
            }
            match expected.get(&key) {
                Some(&depth) if depth == edge.depth => {}
                Some(&depth) => {
                    return Err(ClosureTableError::invariant(format!(
                        "edge {} -> {} has depth {}, expected {depth}",
                        edge.ancestor, edge.descendant, edge.depth
                    )))
                }
                None => {
                    return Err(ClosureTableError::invariant(format!(
                        "edge {} -> {} has no parent chain",
                        edge.ancestor, edge.descendant
                    )))
                }
            }
        }

        if let Some((ancestor, descendant)) = expected.keys().find(|key| !stored.contains_key(*key))
        {
            return Err(ClosureTableError::invariant(format!(
                "missing edge {ancestor} -> {descendant}"
            )));
        }
        Ok(())
    }

    /// Rewrite the closure table from the parent links. Returns the number
    /// of edges written.
    pub async fn rebuild_closure(&self, db: &DatabaseConnection) -> Result<usize> {
        let guard = self.begin(db).await?;
        let result = self.rebuild_closure_on(guard.connection()).await;
        guard.finish(result).await
    }

    async fn create_node_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        parent_id: Option<i32>,
        position: i32,
        payload: &serde_json::Value,
    ) -> Result<Node> {
        if let Some(parent_id) = parent_id {
            self.live_node(conn, parent_id).await?;
        }

        let position = self.claim_position(conn, parent_id, position, None).await?;
        let node = self.nodes.insert(conn, parent_id, position, payload).await?;

        let mut rows = vec![NewEdge::self_edge(node.id)];
        if let Some(parent_id) = parent_id {
            for ancestor in self.edges.ancestors_of(conn, parent_id, true).await? {
                rows.push(NewEdge::new(ancestor.ancestor, node.id, ancestor.depth + 1));
            }
        }
        self.edges.insert_many(conn, &rows).await?;

        debug!(
            node = node.id,
            parent = ?parent_id,
            position,
            edges = rows.len(),
            "created node"
        );
        Ok(node)
    }

    async fn move_subtree_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        node_id: i32,
        new_parent_id: Option<i32>,
        position: i32,
    ) -> Result<()> {
        let node = self.live_node(conn, node_id).await?;

        if let Some(parent_id) = new_parent_id {
            if parent_id == node_id || self.edges.find(conn, node_id, parent_id).await?.is_some() {
                return Err(ClosureTableError::Cycle {
                    node: node_id,
                    parent: parent_id,
                });
            }
            self.live_node(conn, parent_id).await?;
        }

        let old_parent_id = node.parent_id;
        self.compact_positions(conn, old_parent_id, Some(node_id)).await?;
        let position = self
            .claim_position(conn, new_parent_id, position, Some(node_id))
            .await?;
        self.nodes.update_placement(conn, node_id, new_parent_id, position).await?;

        if old_parent_id == new_parent_id {
            debug!(node = node_id, position, "reordered node");
            return Ok(());
        }

        // Only edges crossing the subtree boundary change; edges inside the
        // subtree keep their depth.
        let removed = self.edges.detach_subtree(conn, node_id, false).await?;
        let inserted = match new_parent_id {
            Some(parent_id) => self.edges.attach_subtree(conn, node_id, parent_id).await?,
            None => 0,
        };

        debug!(
            node = node_id,
            from = ?old_parent_id,
            to = ?new_parent_id,
            position,
            removed,
            inserted,
            "moved subtree"
        );
        Ok(())
    }

    async fn soft_delete_on<C: ConnectionTrait>(&self, conn: &C, node_id: i32) -> Result<()> {
        self.live_node(conn, node_id).await?;
        self.nodes.set_deleted_at(conn, node_id, Some(Utc::now())).await?;
        debug!(node = node_id, "soft-deleted node");
        Ok(())
    }

    async fn hard_delete_on<C: ConnectionTrait>(&self, conn: &C, node_id: i32) -> Result<()> {
        let node = self
            .nodes
            .find(conn, node_id, true)
            .await?
            .ok_or(ClosureTableError::NotFound(node_id))?;

        match self.config.dependent_behavior() {
            DependentBehavior::Nullify => {
                // Paths from the node and everything above it into the
                // subtree disappear; paths inside each child's subtree stay.
                let removed = self.edges.detach_subtree(conn, node_id, true).await?;

                let children = self.nodes.children_of(conn, Some(node_id), true).await?;
                let roots = self.nodes.children_of(conn, None, true).await?;
                let mut next = to_position(roots.len())?;
                for child in &children {
                    self.nodes.update_placement(conn, child.id, None, next).await?;
                    next += 1;
                }

                self.nodes.delete(conn, node_id).await?;
                debug!(
                    node = node_id,
                    orphaned = children.len(),
                    removed,
                    "deleted node"
                );
            }
            DependentBehavior::Destroy => {
                let purged = self
                    .nodes
                    .delete_selected(conn, self.edges.subtree_query(node_id))
                    .await?;
                let removed = self
                    .edges
                    .delete_dangling(conn, self.nodes.id_query())
                    .await?;
                debug!(node = node_id, purged, removed, "deleted subtree");
            }
        }

        self.compact_positions(conn, node.parent_id, None).await
    }

    async fn restore_node_on<C: ConnectionTrait>(&self, conn: &C, node_id: i32) -> Result<()> {
        let node = self
            .nodes
            .find(conn, node_id, true)
            .await?
            .ok_or(ClosureTableError::NotFound(node_id))?;
        if node.is_deleted() {
            self.nodes.set_deleted_at(conn, node_id, None).await?;
            debug!(node = node_id, "restored node");
        }
        Ok(())
    }

    async fn rebuild_closure_on<C: ConnectionTrait>(&self, conn: &C) -> Result<usize> {
        let nodes = self.nodes.all(conn).await?;
        let rows: Vec<NewEdge> = expected_closure(&nodes)?
            .into_iter()
            .map(|((ancestor, descendant), depth)| NewEdge::new(ancestor, descendant, depth))
            .collect();

        let removed = self.edges.clear(conn).await?;
        self.edges.insert_many(conn, &rows).await?;
        debug!(removed, inserted = rows.len(), "rebuilt closure");
        Ok(rows.len())
    }

    async fn live_node<C: ConnectionTrait>(&self, conn: &C, id: i32) -> Result<Node> {
        self.nodes
            .find(conn, id, false)
            .await?
            .ok_or(ClosureTableError::NotFound(id))
    }

    /// Resolve the slot `requested` under `parent_id`, making room for it.
    /// `moving` is left out of the sibling set.
    async fn claim_position<C: ConnectionTrait>(
        &self,
        conn: &C,
        parent_id: Option<i32>,
        requested: i32,
        moving: Option<i32>,
    ) -> Result<i32> {
        let siblings: Vec<Node> = self
            .nodes
            .children_of(conn, parent_id, true)
            .await?
            .into_iter()
            .filter(|sibling| Some(sibling.id) != moving)
            .collect();

        let position = requested.clamp(0, to_position(siblings.len())?);
        if siblings.iter().any(|sibling| sibling.position == position) {
            match self.config.position_policy() {
                PositionPolicy::AutoShift => {
                    self.nodes
                        .shift_positions(conn, parent_id, position, moving)
                        .await?;
                }
                PositionPolicy::Reject => {
                    return Err(ClosureTableError::Conflict {
                        parent: parent_id,
                        position,
                    })
                }
            }
        }
        Ok(position)
    }

    /// Renumber the rows under `parent_id` as `0..n`, skipping `exclude`.
    async fn compact_positions<C: ConnectionTrait>(
        &self,
        conn: &C,
        parent_id: Option<i32>,
        exclude: Option<i32>,
    ) -> Result<()> {
        let siblings = self.nodes.children_of(conn, parent_id, true).await?;
        for (index, sibling) in siblings
            .iter()
            .filter(|sibling| Some(sibling.id) != exclude)
            .enumerate()
        {
            let position = to_position(index)?;
            if sibling.position != position {
                self.nodes
                    .update_placement(conn, sibling.id, parent_id, position)
                    .await?;
            }
        }
        Ok(())
    }
}

/// Every `(ancestor, descendant) -> depth` pair implied by the parent links.
fn expected_closure(nodes: &[Node]) -> Result<BTreeMap<(i32, i32), i32>> {
    let parents: HashMap<i32, Option<i32>> =
        nodes.iter().map(|node| (node.id, node.parent_id)).collect();

    let mut closure = BTreeMap::new();
    for node in nodes {
        closure.insert((node.id, node.id), 0);
        let mut depth = 0;
        let mut current = node.parent_id;
        while let Some(ancestor) = current {
            if !parents.contains_key(&ancestor) {
                break;
            }
            depth += 1;
            if depth > nodes.len() {
                return Err(ClosureTableError::invariant(format!(
                    "parent links of node {} form a cycle",
                    node.id
                )));
            }
            closure.insert((ancestor, node.id), to_position(depth)?);
            current = parents.get(&ancestor).copied().flatten();
        }
    }
    Ok(closure)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: i32, parent_id: Option<i32>) -> Node {
        Node {
            id,
            parent_id,
            position: 0,
            deleted_at: None,
            payload: serde_json::Value::Null,
        }
    }

    #[test]
    fn expected_closure_follows_parent_chain() {
        let nodes = [node(1, None), node(2, Some(1)), node(3, Some(2)), node(4, None)];
        let closure = expected_closure(&nodes).unwrap();

        assert_eq!(closure.len(), 4 + 3);
        assert_eq!(closure[&(1, 3)], 2);
        assert_eq!(closure[&(2, 3)], 1);
        assert_eq!(closure[&(4, 4)], 0);
        assert!(!closure.contains_key(&(1, 4)));
    }

    #[test]
    fn expected_closure_rejects_cycles() {
        let nodes = [node(1, Some(2)), node(2, Some(1))];
        assert!(matches!(
            expected_closure(&nodes),
            Err(ClosureTableError::Invariant(_))
        ));
    }
}
