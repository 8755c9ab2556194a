pub mod trace;

pub use trace::{TraceLayer, X_TRACE_ID};
