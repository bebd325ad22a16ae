//! Closure-table hierarchies on top of SeaORM.
//!
//! A tree lives in two tables: the entity table (one row per node, with its
//! parent, sibling position and soft-delete marker) and the closure table
//! (one row per ancestor/descendant pair, with the number of links between
//! them). [`TreeStore`] keeps the closure complete across inserts, moves and
//! deletes; [`PathIndex`] answers ancestor, descendant and sibling queries
//! from it without recursive traversal. PostgreSQL and SQLite are supported.

pub mod config;
pub mod edge_table;
pub mod error;
pub mod lock;
pub mod model;
pub mod node_table;
pub mod path_index;
pub mod schema;
pub mod store;
pub mod traits;

pub mod prelude {
    //! Convenient re-exports for consumers.
    pub use crate::config::{
        AdvisoryLockStrategy, ClosureTableConfig, ClosureTableOptions, DependentBehavior,
        PositionPolicy,
    };
    pub use crate::error::ClosureTableError;
    pub use crate::model::{Edge, Node};
    pub use crate::path_index::PathIndex;
    pub use crate::store::TreeStore;
    pub use crate::traits::{ClosureTableModel, EdgeRepository, NodeRepository};
}

#[doc(hidden)]
pub mod __private {
    pub use once_cell::sync::Lazy;
}

pub use closure_table_macros::ClosureTableModel as ClosureTableModelDerive;
#[doc(hidden)]
pub use closure_table_macros::ClosureTableModel;
pub use config::{
    AdvisoryLockKey, AdvisoryLockStrategy, ClosureTableConfig, ClosureTableOptions,
    DependentBehavior, PositionPolicy,
};
pub use edge_table::EdgeTable;
pub use error::ClosureTableError;
pub use model::{Edge, NewEdge, Node};
pub use node_table::NodeTable;
pub use path_index::PathIndex;
pub use store::TreeStore;
pub use traits::{ClosureTableModel, EdgeRepository, NodeRepository};
