//! Git status snapshots for the Tiller daemon.
//!
//! Derives a compact [`GitStatusSnapshot`](tiller_domain::GitStatusSnapshot)
//! (branch, ahead/behind, added/deleted counts) per location path, and
//! runs an optional polling task per watched path. Pollers share no
//! locks with thread supervisors; cancelling a watch aborts only that
//! path's task.
//!
//! Mutating git operations (stage/commit/push/pull) are external
//! collaborators; after performing one, callers re-derive the snapshot
//! with [`get_status_snapshot`].

mod error;
mod poller;
mod status;

pub use error::{GitOpsError, GitOpsResult};
pub use poller::StatusPoller;
pub use status::get_status_snapshot;
