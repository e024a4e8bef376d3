//! Step-scan detector: one frame per trigger, no file tracking.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use daq_core::device::{
    Configurable, DataKeys, Device, Readable, Readings, Stageable, StandardReadable, Triggerable,
};
use daq_core::signal::AnySignal;
use daq_core::{DaqError, DaqResult};
use tracing::{debug, info};

use super::driver::{AdDriver, ImageMode};
use super::plugins::{NdPlugin, PluginSet};
use crate::config::DetectorConfig;

/// Detector read out through its frame counter and plugin signals.
///
/// The frame counter is read uncached: a monitor update can arrive after the
/// acquire put-completion, so a cached value may lag one frame behind.
#[derive(Debug)]
pub struct SingleTriggerDet {
    name: String,
    /// Driver facade.
    pub drv: AdDriver,
    plugins: PluginSet,
    readable: StandardReadable,
    config: DetectorConfig,
    staged: bool,
}

impl SingleTriggerDet {
    /// Detector reading `array_counter`, configured by `acquire_time`.
    pub fn new(name: impl Into<String>, drv: AdDriver, config: DetectorConfig) -> Self {
        let readable = StandardReadable::new()
            .with_read_uncached(drv.array_counter.erased())
            .with_config(drv.acquire_time.erased());
        Self {
            name: name.into(),
            drv,
            plugins: PluginSet::new(),
            readable,
            config,
            staged: false,
        }
    }

    /// Attach a plugin under `key`. Its signals are not read unless also
    /// passed to [`with_read_uncached`](Self::with_read_uncached).
    pub fn with_plugin(mut self, key: impl Into<String>, plugin: Arc<dyn NdPlugin>) -> Self {
        self.plugins.insert(key, plugin);
        self
    }

    /// Read an extra signal alongside the frame counter.
    pub fn with_read_uncached(mut self, signal: Arc<dyn AnySignal>) -> Self {
        self.readable = self.readable.with_read_uncached(signal);
        self
    }

    /// Attached plugins.
    pub fn plugins(&self) -> &PluginSet {
        &self.plugins
    }
}

#[async_trait]
impl Device for SingleTriggerDet {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self, timeout: Duration) -> DaqResult<()> {
        tokio::try_join!(
            self.drv.connect(timeout),
            self.plugins.connect(timeout),
            self.readable.connect(timeout),
        )?;
        Ok(())
    }
}

#[async_trait]
impl Stageable for SingleTriggerDet {
    async fn stage(&mut self) -> DaqResult<()> {
        let timeout = Some(self.config.default_timeout());
        tokio::try_join!(
            self.drv.image_mode.set(ImageMode::Single, timeout),
            self.drv.wait_for_plugins.set(true, timeout),
        )?;
        self.staged = true;
        info!(detector = %self.name, "staged");
        Ok(())
    }

    async fn unstage(&mut self) -> DaqResult<()> {
        if !self.staged {
            return Err(DaqError::precondition("Stage not run"));
        }
        self.staged = false;
        info!(detector = %self.name, "unstaged");
        Ok(())
    }
}

#[async_trait]
impl Triggerable for SingleTriggerDet {
    async fn trigger(&mut self) -> DaqResult<()> {
        if !self.staged {
            return Err(DaqError::precondition("Stage not run"));
        }
        let frame_timeout = self.drv.frame_timeout(self.config.default_timeout()).await?;
        debug!(detector = %self.name, ?frame_timeout, "trigger");
        self.drv.acquire.set(true, Some(frame_timeout)).await
    }
}

#[async_trait]
impl Readable for SingleTriggerDet {
    async fn read(&self) -> DaqResult<Readings> {
        self.readable.read().await
    }

    async fn describe(&self) -> DaqResult<DataKeys> {
        Ok(self.readable.describe())
    }
}

#[async_trait]
impl Configurable for SingleTriggerDet {
    async fn read_configuration(&self) -> DaqResult<Readings> {
        self.readable.read_configuration().await
    }

    async fn describe_configuration(&self) -> DaqResult<DataKeys> {
        Ok(self.readable.describe_configuration())
    }
}
