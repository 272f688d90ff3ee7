//! Document hierarchy: node model, arena tree, chunk merge, repair and
//! duplicate resolution.

pub mod annex;
pub mod dedup;
pub mod merge;
pub mod node;
pub mod repair;
pub mod tree;

pub use annex::{Annex, Table, TableRow, collect_annexes, take_tables};
pub use dedup::DuplicateResolver;
pub use merge::{Anchor, MergeStats, merge_chunk};
pub use node::{Canonicalizer, NodeKind, StructureNode, canonical_node_number};
pub use repair::{RankMap, RepairOptions, RepairReport, TreeRepairEngine};
pub use tree::{NodeData, NodeId, StructureTree};
