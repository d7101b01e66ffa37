pub mod checkpoint;
pub mod snapshot;

pub use snapshot::{SnapshotStore, WidgetSnapshotV1};
