//! Mode change observer trait

use async_trait::async_trait;
use nightcast_common::Mode;

/// Reacts to accepted mode transitions
///
/// Observers are invoked in registration order, one at a time, while the
/// coordinator still holds its transition lock. An observer must therefore
/// never call back into [`ModeCoordinator::set_mode`](super::ModeCoordinator::set_mode)
/// or [`force_mode`](super::ModeCoordinator::force_mode); reading mode info
/// and updating mode state are fine.
///
/// A returned error (or a panic) is logged by the coordinator and does not
/// stop later observers from running.
#[async_trait]
pub trait ModeObserver: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Called after `old` → `new` has been committed
    async fn on_mode_change(&self, old: Mode, new: Mode, reason: &str) -> anyhow::Result<()>;
}
