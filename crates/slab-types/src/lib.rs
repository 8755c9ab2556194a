//! Shared domain types for the dot-office runtime.
//!
//! Every other crate in the workspace depends on this one for the error
//! type, the tagged entities that cross the KV store / HTTP boundary, and
//! the named configuration constants from the specification.

pub mod config;
mod error;
mod frame;
mod gpu;
mod session;
mod task;

pub use error::RuntimeError;
pub use frame::StreamFrame;
pub use gpu::{GpuModelKind, GpuState};
pub use session::{ChatTurn, Role, SessionContext};
pub use task::{TaskKind, TaskRecord, TaskStatus};
