//! Detector driver facade.
//!
//! Typed points for the frame-producing device: acquisition start/stop,
//! exposure, frame count, image mode, frame counter and sensor size. Every
//! operation is a single request against the signal backend; nothing here
//! retries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use daq_core::device::Device;
use daq_core::signal::{ad_r, ad_rw, epics_rw, AnySignal, BackendFactory, SignalValue};
use daq_core::sim::SimBackendFactory;
use daq_core::{DaqError, DaqResult, SignalR, SignalRW};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};

/// How many frames one `acquire` produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageMode {
    /// One frame, then stop.
    #[default]
    Single,
    /// `num_images` frames, then stop.
    Multiple,
    /// Until `acquire` is cleared.
    Continuous,
}

impl SignalValue for ImageMode {
    fn dtype() -> &'static str {
        "string"
    }
}

/// Driver (cam) plugin of an area detector.
#[derive(Debug, Clone)]
pub struct AdDriver {
    name: String,
    /// Start (true) / stop (false) acquisition; a waited put completes when
    /// acquisition finishes.
    pub acquire: SignalRW<bool>,
    /// Exposure time in seconds.
    pub acquire_time: SignalRW<f64>,
    /// Frames per acquisition in `Multiple` mode.
    pub num_images: SignalRW<i64>,
    /// Single / Multiple / Continuous.
    pub image_mode: SignalRW<ImageMode>,
    /// Frames produced so far.
    pub array_counter: SignalRW<i64>,
    /// Frame width.
    pub array_size_x: SignalR<i64>,
    /// Frame height.
    pub array_size_y: SignalR<i64>,
    /// Block each frame until downstream plugins have consumed it.
    pub wait_for_plugins: SignalRW<bool>,
}

impl AdDriver {
    /// Build the driver facade at PV `prefix` (e.g. `"BL01:DET:"`).
    pub fn new<F: BackendFactory>(factory: &F, prefix: &str, name: &str) -> Self {
        let signal = |attr: &str| format!("{name}-{attr}");
        let pv = |suffix: &str| format!("{prefix}{suffix}");
        Self {
            name: name.to_string(),
            acquire: ad_rw(factory, signal("acquire"), &pv("Acquire")),
            acquire_time: ad_rw(factory, signal("acquire_time"), &pv("AcquireTime")),
            num_images: ad_rw(factory, signal("num_images"), &pv("NumImages")),
            image_mode: ad_rw(factory, signal("image_mode"), &pv("ImageMode")),
            array_counter: ad_rw(factory, signal("array_counter"), &pv("ArrayCounter")),
            array_size_x: ad_r(factory, signal("array_size_x"), &pv("ArraySizeX")),
            array_size_y: ad_r(factory, signal("array_size_y"), &pv("ArraySizeY")),
            // There is no _RBV for this one
            wait_for_plugins: epics_rw(factory, signal("wait_for_plugins"), &pv("WaitForPlugins")),
        }
    }

    /// Driver backed by simulated signals.
    pub fn sim(prefix: &str, name: &str) -> Self {
        Self::new(&SimBackendFactory, prefix, name)
    }

    /// Timeout for one frame: `base` plus the current exposure time.
    pub async fn frame_timeout(&self, base: Duration) -> DaqResult<Duration> {
        let exposure = self.acquire_time.get_value().await?;
        let exposure = Duration::try_from_secs_f64(exposure).map_err(|_| {
            DaqError::Signal(format!(
                "{}: invalid exposure time {}",
                self.acquire_time.name(),
                exposure
            ))
        })?;
        Ok(base + exposure)
    }

    fn signals(&self) -> Vec<Arc<dyn AnySignal>> {
        vec![
            self.acquire.erased(),
            self.acquire_time.erased(),
            self.num_images.erased(),
            self.image_mode.erased(),
            self.array_counter.erased(),
            self.array_size_x.erased(),
            self.array_size_y.erased(),
            self.wait_for_plugins.erased(),
        ]
    }
}

#[async_trait]
impl Device for AdDriver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self, timeout: Duration) -> DaqResult<()> {
        try_join_all(self.signals().iter().map(|s| s.connect(timeout))).await?;
        Ok(())
    }
}
