//! Simulated area detector hardware.
//!
//! Gives a sim-backed [`AdDriver`] / [`NdFileHdf`] pair the behaviour of a
//! real IOC: writing `acquire = true` produces frames every `acquire_time`
//! seconds, and the writer counts them while `capture` is armed.
//!
//! ```rust,ignore
//! let drv = AdDriver::sim("SIM:DRV:", "det-drv");
//! let hdf = NdFileHdf::sim("SIM:HDF:", "det-hdf");
//! let _hardware = SimDetector::new(1024, 768).attach(&drv, &hdf)?;
//! drv.acquire.set(true, None).await?; // resolves after the last frame
//! ```

use std::time::Duration;

use daq_core::sim::{set_sim_put_handler, set_sim_value};
use daq_core::{DaqError, DaqResult};
use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::driver::{AdDriver, ImageMode};
use super::writer::{expand_file_template, NdFileHdf};

/// Shortest simulated exposure.
const MIN_FRAME_PERIOD: Duration = Duration::from_millis(1);

/// Sensor geometry of a simulated detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimDetector {
    /// Frame width in pixels.
    pub width: i64,
    /// Frame height in pixels.
    pub height: i64,
}

impl Default for SimDetector {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
        }
    }
}

/// Running simulated hardware. Frame production stops when this is dropped.
#[derive(Debug)]
pub struct SimHardware {
    task: JoinHandle<()>,
}

impl Drop for SimHardware {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl SimDetector {
    /// Detector with a `width` x `height` sensor.
    pub fn new(width: i64, height: i64) -> Self {
        Self { width, height }
    }

    /// Install the hardware behaviour on sim-backed facades and start it.
    ///
    /// Fails if either facade is not backed by simulated signals.
    pub fn attach(&self, drv: &AdDriver, hdf: &NdFileHdf) -> DaqResult<SimHardware> {
        set_sim_value(&drv.array_size_x, self.width)?;
        set_sim_value(&drv.array_size_y, self.height)?;
        set_sim_value(&hdf.array_size0, self.height)?;
        set_sim_value(&hdf.array_size1, self.width)?;

        // A waited put of `true` completes when the readback drops back to false
        let acquire = drv.acquire.subscribe();
        set_sim_put_handler(&drv.acquire, move |value: bool| {
            until_cleared(value, acquire.clone()).boxed()
        })?;

        // Arming the writer starts a new file
        let capture = hdf.capture.subscribe();
        let num_captured = hdf.num_captured.clone();
        set_sim_put_handler(&hdf.capture, move |value: bool| {
            let reset = if value {
                set_sim_value(&num_captured, 0_i64)
            } else {
                Ok(())
            };
            let cleared = until_cleared(value, capture.clone());
            async move {
                reset?;
                cleared.await
            }
            .boxed()
        })?;

        let frames = FrameLoop {
            drv: drv.clone(),
            hdf: hdf.clone(),
        };
        Ok(SimHardware {
            task: tokio::spawn(frames.run()),
        })
    }
}

async fn until_cleared(value: bool, mut readback: watch::Receiver<bool>) -> DaqResult<()> {
    if value {
        readback
            .wait_for(|v| !*v)
            .await
            .map(|_| ())
            .map_err(|_| DaqError::Signal("readback closed".into()))?;
    }
    Ok(())
}

struct FrameLoop {
    drv: AdDriver,
    hdf: NdFileHdf,
}

impl FrameLoop {
    async fn run(self) {
        let mut acquire = self.drv.acquire.subscribe();
        loop {
            let started = acquire.wait_for(|running| *running).await.is_ok();
            if !started {
                return;
            }
            if let Err(e) = self.acquisition().await {
                tracing::warn!(detector = %self.drv.acquire.name(), error = %e, "simulated acquisition failed");
            }
            if set_sim_value(&self.drv.acquire, false).is_err() {
                return;
            }
        }
    }

    async fn acquisition(&self) -> DaqResult<()> {
        let frames = match self.drv.image_mode.get_value().await? {
            ImageMode::Single => Some(1),
            ImageMode::Multiple => Some(self.drv.num_images.get_value().await?.max(0)),
            ImageMode::Continuous => None,
        };
        let exposure = self.drv.acquire_time.get_value().await?;
        let period = Duration::try_from_secs_f64(exposure)
            .unwrap_or_default()
            .max(MIN_FRAME_PERIOD);
        tracing::debug!(?frames, ?period, "simulated acquisition started");

        let mut produced = 0_i64;
        while frames.map_or(true, |n| produced < n) {
            tokio::time::sleep(period).await;
            if !self.drv.acquire.get_value().await? {
                break;
            }
            produced += 1;
            let counter = self.drv.array_counter.get_value().await?;
            set_sim_value(&self.drv.array_counter, counter + 1)?;
            self.write_frame().await?;
        }
        Ok(())
    }

    async fn write_frame(&self) -> DaqResult<()> {
        if !self.hdf.capture.get_value().await? {
            return Ok(());
        }

        let captured = self.hdf.num_captured.get_value().await? + 1;
        if captured == 1 {
            let path = expand_file_template(
                &self.hdf.file_template.get_value().await?,
                &self.hdf.file_path.get_value().await?,
                &self.hdf.file_name.get_value().await?,
            );
            set_sim_value(&self.hdf.full_file_name, path)?;
        }
        set_sim_value(&self.hdf.num_captured, captured)?;

        let limit = self.hdf.num_capture.get_value().await?;
        if limit > 0 && captured >= limit {
            set_sim_value(&self.hdf.capture, false)?;
        }
        Ok(())
    }
}
