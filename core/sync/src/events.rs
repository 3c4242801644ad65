//! Local store change notifications.

use tracesync_common::{Point, PointRecord};

/// A change the sync engine made to the local store.
///
/// Delivered over a broadcast channel; observers (map markers, lists)
/// subscribe through `SyncEngine::subscribe`.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// A record was inserted or replaced.
    Saved(PointRecord),
    /// A record was deleted because the remote no longer has it.
    Removed(Point),
}
