//! # otg-core
//!
//! Core crate of the trade gateway session layer, providing:
//!
//! - **Channel** (`channel`): MPMC FIFO with a bounded-wait pop
//! - **Types** (`types`): enums, trading records and the `User` aggregate
//! - **Dirty tracking** (`dirty`): the `Dirtyable` capability
//! - **Diff** (`diff`): change-filtered serialization of a `User`
//! - **Configuration** (`config`): JSON config deserialization
//! - **Error types** (`error`): domain-specific `GatewayError` via thiserror
//! - **CPU affinity** (`cpu_affinity`): worker-to-core pinning
//! - **Time utilities** (`time_util`): epoch timestamps
//! - **Logging** (`logging`): tracing-based structured logging

pub mod channel;
pub mod config;
pub mod cpu_affinity;
pub mod diff;
pub mod dirty;
pub mod error;
pub mod logging;
pub mod time_util;
pub mod types;

// Re-export types at crate root for convenience.
pub use channel::Channel;
pub use dirty::Dirtyable;
pub use error::GatewayError;
pub use types::*;
