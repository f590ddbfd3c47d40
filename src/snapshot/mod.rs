mod model;
mod parse;
mod source;

pub use model::{Snapshot, SnapshotEdge, SnapshotNode, palette_slot};
pub use source::{SearchRequest, SnapshotSource};
