//! Area detectors: hardware facades, the streaming lifecycle and its
//! step-scan variant.
//!
//! - [`driver`] / [`writer`] / [`plugins`]: typed control points
//! - [`tracker`]: committed-frame count to stream documents, stall detection
//! - [`streamer`]: [`HdfStreamerDet`], the stage/kickoff/collect/unstage state machine
//! - [`single_trigger`]: [`SingleTriggerDet`], one frame per trigger
//! - [`directory`]: output directory providers
//! - [`sim`]: simulated hardware for tests and demos

pub mod directory;
pub mod driver;
pub mod plugins;
pub mod sim;
pub mod single_trigger;
pub mod streamer;
pub mod tracker;
pub mod writer;

pub use directory::{DirectoryProvider, StaticDirectoryProvider, TmpDirectoryProvider};
pub use driver::{AdDriver, ImageMode};
pub use plugins::{NdPlugin, NdPluginStats, PluginSet};
pub use sim::{SimDetector, SimHardware};
pub use single_trigger::SingleTriggerDet;
pub use streamer::{HdfStreamerDet, LifecycleState};
pub use tracker::{ChunkEvent, ChunkTracker, DEFAULT_STALL_TIMEOUT};
pub use writer::{FileWriteMode, NdFileHdf};
