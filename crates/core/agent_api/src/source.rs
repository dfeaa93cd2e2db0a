use crate::Snapshot;
use crate::SourceError;
use crate::SourceKind;
use async_trait::async_trait;

/// A transport delivering the snapshots of one device
///
/// Pull and push transports implement this trait,
/// so the reconciliation of a device doesn't depend on how its capabilities are received.
#[async_trait]
pub trait SnapshotSource: Send {
    fn kind(&self) -> SourceKind;

    /// Wait for the next snapshot of the device
    ///
    /// Return `None` when the source is closed and will deliver nothing more.
    async fn next_snapshot(&mut self) -> Option<Result<Snapshot, SourceError>>;

    /// Release the resources held by this source
    ///
    /// Must be safe to call even if the source has only been partially set up.
    async fn close(&mut self) {}
}
