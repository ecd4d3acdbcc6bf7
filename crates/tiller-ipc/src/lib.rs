//! IPC layer for the Tiller daemon.
//!
//! A JSON-RPC-like protocol over a Unix domain socket, NDJSON framed.
//! Supports request/response calls and per-thread streaming
//! subscriptions: after `thread.subscribe` the connection switches to
//! push mode and receives the thread's event frames in production
//! order.

mod error;
mod protocol;
mod server;

pub use error::{IpcError, IpcResult};
pub use protocol::{error_codes, ErrorInfo, Event, Method, Request, Response};
pub use server::{IpcClient, IpcServer, SubscribeFn};
