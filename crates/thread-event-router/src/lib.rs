//! Ordered per-thread event fan-out.
//!
//! The router owns one broadcast channel per thread. The supervisor's
//! event pump is the single producer for a thread, sequence numbers
//! are assigned under the channel entry, and publishing never blocks
//! on slow consumers: the channel buffers, and a lagging subscriber
//! observes a lag error rather than stalling the subprocess pipe.

mod frame;
mod router;
mod usage;

pub use frame::{ThreadEvent, ThreadFrame};
pub use router::EventRouter;
pub use usage::UsageTracker;
