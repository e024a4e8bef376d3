//! HDF5 file writer facade.
//!
//! Control points of the plugin that persists frames to the artifact. The
//! committed-frame counter `num_captured` is the source of truth for how much
//! data exists; `full_file_name` only becomes valid once the writer has opened
//! the file.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use daq_core::device::Device;
use daq_core::signal::{ad_r, ad_rw, epics_rw, AnySignal, BackendFactory, SignalValue};
use daq_core::sim::SimBackendFactory;
use daq_core::{DaqResult, SignalR, SignalRW};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};

/// How the writer batches frames into files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FileWriteMode {
    /// One frame per file.
    #[default]
    Single,
    /// Buffer `num_capture` frames in memory, then write.
    Capture,
    /// Append frames to one open file as they arrive.
    Stream,
}

impl SignalValue for FileWriteMode {
    fn dtype() -> &'static str {
        "string"
    }
}

/// NDFileHDF5 plugin.
#[derive(Debug, Clone)]
pub struct NdFileHdf {
    name: String,
    /// Output directory.
    pub file_path: SignalRW<String>,
    /// Base file name.
    pub file_name: SignalRW<String>,
    /// printf-style template combining path and name.
    pub file_template: SignalRW<String>,
    /// Resolved path of the open file.
    pub full_file_name: SignalR<String>,
    /// Single / Capture / Stream.
    pub file_write_mode: SignalRW<FileWriteMode>,
    /// Frames to capture; 0 means unbounded.
    pub num_capture: SignalRW<i64>,
    /// Frames committed to the file.
    pub num_captured: SignalR<i64>,
    /// Single-writer/multiple-reader mode, readable while still growing.
    pub swmr_mode: SignalRW<bool>,
    /// Open the file on the first frame rather than on capture start.
    pub lazy_open: SignalRW<bool>,
    /// Arm (true) / disarm (false) the writer.
    pub capture: SignalRW<bool>,
    /// Flush buffered frames to disk.
    pub flush_now: SignalRW<bool>,
    /// Frame dimension 0.
    pub array_size0: SignalR<i64>,
    /// Frame dimension 1.
    pub array_size1: SignalR<i64>,
}

impl NdFileHdf {
    /// Build the writer facade at PV `prefix`.
    pub fn new<F: BackendFactory>(factory: &F, prefix: &str, name: &str) -> Self {
        let signal = |attr: &str| format!("{name}-{attr}");
        let pv = |suffix: &str| format!("{prefix}{suffix}");
        Self {
            name: name.to_string(),
            file_path: ad_rw(factory, signal("file_path"), &pv("FilePath")),
            file_name: ad_rw(factory, signal("file_name"), &pv("FileName")),
            file_template: ad_rw(factory, signal("file_template"), &pv("FileTemplate")),
            full_file_name: ad_r(factory, signal("full_file_name"), &pv("FullFileName")),
            file_write_mode: ad_rw(factory, signal("file_write_mode"), &pv("FileWriteMode")),
            num_capture: ad_rw(factory, signal("num_capture"), &pv("NumCapture")),
            num_captured: ad_r(factory, signal("num_captured"), &pv("NumCaptured")),
            swmr_mode: ad_rw(factory, signal("swmr_mode"), &pv("SWMRMode")),
            lazy_open: ad_rw(factory, signal("lazy_open"), &pv("LazyOpen")),
            capture: ad_rw(factory, signal("capture"), &pv("Capture")),
            flush_now: epics_rw(factory, signal("flush_now"), &pv("FlushNow")),
            array_size0: ad_r(factory, signal("array_size0"), &pv("ArraySize0")),
            array_size1: ad_r(factory, signal("array_size1"), &pv("ArraySize1")),
        }
    }

    /// Writer backed by simulated signals.
    pub fn sim(prefix: &str, name: &str) -> Self {
        Self::new(&SimBackendFactory, prefix, name)
    }

    fn signals(&self) -> Vec<Arc<dyn AnySignal>> {
        vec![
            self.file_path.erased(),
            self.file_name.erased(),
            self.file_template.erased(),
            self.full_file_name.erased(),
            self.file_write_mode.erased(),
            self.num_capture.erased(),
            self.num_captured.erased(),
            self.swmr_mode.erased(),
            self.lazy_open.erased(),
            self.capture.erased(),
            self.flush_now.erased(),
            self.array_size0.erased(),
            self.array_size1.erased(),
        ]
    }
}

#[async_trait]
impl Device for NdFileHdf {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self, timeout: Duration) -> DaqResult<()> {
        try_join_all(self.signals().iter().map(|s| s.connect(timeout))).await?;
        Ok(())
    }
}

/// Expand a writer file template the way the writer does: each `%s` takes
/// the next of `path`, `name` in turn.
pub fn expand_file_template(template: &str, path: &str, name: &str) -> String {
    let mut args = [path, name].into_iter();
    let mut out = String::with_capacity(template.len() + path.len() + name.len());
    let mut rest = template;
    while let Some(pos) = rest.find("%s") {
        out.push_str(&rest[..pos]);
        out.push_str(args.next().unwrap_or_default());
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sources_follow_rbv_convention() {
        let hdf = NdFileHdf::sim("PREFIX1:HDF", "deta-hdf");
        assert_eq!(hdf.full_file_name.source(), "sim://PREFIX1:HDFFullFileName_RBV");
        assert_eq!(hdf.flush_now.source(), "sim://PREFIX1:HDFFlushNow");
        assert_eq!(hdf.num_captured.name(), "deta-hdf-num_captured");
    }

    #[test]
    fn test_expand_file_template() {
        assert_eq!(
            expand_file_template("%s/%s.h5", "/tmp/123456", "deta-1"),
            "/tmp/123456/deta-1.h5"
        );
        assert_eq!(expand_file_template("%s%s", "/data/", "x"), "/data/x");
        assert_eq!(expand_file_template("fixed.h5", "/a", "b"), "fixed.h5");
    }

    #[tokio::test]
    async fn test_write_mode_set() {
        let hdf = NdFileHdf::sim("P:", "hdf");
        hdf.file_write_mode.set(FileWriteMode::Stream, None).await.unwrap();
        assert_eq!(hdf.file_write_mode.get_value().await.unwrap(), FileWriteMode::Stream);
    }
}
