use chrono::{DateTime, Utc};
use sea_orm::{DeriveIden, FromQueryResult, QueryResult};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Columns of the entity table.
#[derive(Copy, Clone, Debug, DeriveIden)]
pub enum NodeColumn {
    Id,
    ParentId,
    Position,
    DeletedAt,
    Payload,
}

impl NodeColumn {
    pub(crate) const ALL: [NodeColumn; 5] = [
        NodeColumn::Id,
        NodeColumn::ParentId,
        NodeColumn::Position,
        NodeColumn::DeletedAt,
        NodeColumn::Payload,
    ];
}

/// Columns of the closure table.
#[derive(Copy, Clone, Debug, DeriveIden)]
pub enum EdgeColumn {
    ClosureId,
    Ancestor,
    Descendant,
    Depth,
}

/// A row of the entity table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: i32,
    /// `None` for a root.
    pub parent_id: Option<i32>,
    /// Order among the rows sharing `parent_id`.
    pub position: i32,
    /// Set while the node is soft-deleted.
    pub deleted_at: Option<DateTime<Utc>>,
    pub payload: serde_json::Value,
}

impl Node {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub(crate) fn from_row(row: &QueryResult) -> Result<Self> {
        let payload: String = row.try_get("", "payload")?;
        Ok(Self {
            id: row.try_get("", "id")?,
            parent_id: row.try_get("", "parent_id")?,
            position: row.try_get("", "position")?,
            deleted_at: row.try_get("", "deleted_at")?,
            payload: serde_json::from_str(&payload)?,
        })
    }
}

/// A row of the closure table: `descendant` is reachable from `ancestor`
/// through `depth` parent links.
#[derive(Clone, Debug, PartialEq, Eq, FromQueryResult, Serialize, Deserialize)]
pub struct Edge {
    pub closure_id: i32,
    pub ancestor: i32,
    pub descendant: i32,
    pub depth: i32,
}

impl Edge {
    pub fn is_self_reference(&self) -> bool {
        self.ancestor == self.descendant && self.depth == 0
    }

    pub fn is_direct_relationship(&self) -> bool {
        self.depth == 1
    }
}

/// An edge to be inserted; the closure id is assigned by the database.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NewEdge {
    pub ancestor: i32,
    pub descendant: i32,
    pub depth: i32,
}

impl NewEdge {
    pub fn new(ancestor: i32, descendant: i32, depth: i32) -> Self {
        Self {
            ancestor,
            descendant,
            depth,
        }
    }

    pub fn self_edge(id: i32) -> Self {
        Self::new(id, id, 0)
    }
}
