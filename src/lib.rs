//! Area-detector streaming acquisition.
//!
//! This library sequences area-detector hardware through a session
//! (stage, kickoff or trigger, collect, complete, unstage) and turns the
//! writer's growing frame count into stream documents for an external
//! orchestrator. It is used by the `ad-flyscan` binary and the integration
//! tests.
//!
//! Shared building blocks (signals, statuses, documents, device traits) live
//! in the `daq-core` crate, re-exported here.

pub mod areadetector;
pub mod config;
pub mod fly;

pub use daq_core;
pub use daq_core::{DaqError, DaqResult};
