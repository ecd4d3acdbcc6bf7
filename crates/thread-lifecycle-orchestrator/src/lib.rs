//! Thread supervision and lifecycle orchestration.
//!
//! The orchestrator is the engine behind the thread command surface:
//! it owns the supervisor registry (at most one running supervisor per
//! thread), resolves execution contexts, spawns assistant processes,
//! runs one event pump task per running thread, and drives the plan
//! approval and clarification-question protocol.
//!
//! ```text
//! IPC handler ──► ThreadOrchestrator::start()
//!                      │ reserve registry slot (AlreadyRunning guard)
//!                      │ resolve ExecutionContext, gate on test()
//!                      │ spawn AgentProcess (active session resume)
//!                      ▼
//!                 event pump task ──► store / EventRouter / ApprovalFlow
//!                      │ terminal event
//!                      ▼
//!                 single authoritative status transition
//! ```
//!
//! The stop-vs-natural-exit race resolves inside the pump: whichever
//! terminal event arrives first wins, the status transition happens
//! exactly once via compare-and-set against `Running`, and cleanup is
//! idempotent.

mod orchestrator;
mod pump;
mod registry;

pub use orchestrator::{SendOptions, ThreadOrchestrator};
pub use registry::SupervisorRegistry;
