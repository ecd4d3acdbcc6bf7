//! Execution contexts for the Tiller daemon.
//!
//! A [`RepoLocation`](tiller_domain::RepoLocation) resolves to an
//! [`ExecutionContext`]: a stateless capability to run a command
//! against a local path, an SSH host, or a WSL distribution. The
//! supervisor and command runner never branch on connection type
//! themselves; everything goes through the context.
//!
//! Contexts carry only connection parameters and can be recreated
//! freely. Spawned children are placed in their own process group so
//! that [`ExecHandle::terminate`] can take down the whole tree,
//! including ssh/wsl proxy children that would otherwise leak remote
//! sessions.

mod context;
mod error;
mod handle;
mod probe;

pub use context::ExecutionContext;
pub use error::{ExecError, ExecResult};
pub use handle::ExecHandle;
pub use probe::{list_wsl_distros, ConnectivityReport};
