//! Core types for area-detector acquisition.
//!
//! - [`signal`]: typed points on a control-system backend
//! - [`status`]: single-shot completion handles for in-flight operations
//! - [`sim`]: in-memory backend for tests and simulated hardware
//! - [`device`]: capability traits and the readable partition
//! - [`document`]: stream resource / stream datum documents
//! - [`error`]: the shared error type

pub mod device;
pub mod document;
pub mod error;
pub mod signal;
pub mod sim;
pub mod status;

pub use error::{DaqError, DaqResult};
pub use signal::{SignalR, SignalRW, DEFAULT_TIMEOUT};
pub use status::Status;
