//! Streaming HDF5 detector.
//!
//! Drives an [`AdDriver`] and an [`NdFileHdf`] writer through one session per
//! stage/unstage cycle:
//!
//! ```text
//!        stage            kickoff          complete          unstage
//! Idle ─────────► Staged ─────────► Running ─────────► Completed ─────────► Idle
//!                   │  ▲                                    │
//!                   │  └──────────── kickoff ◄──────────────┘
//!                   └── trigger (step scans, stays Staged)
//! ```
//!
//! While staged the writer streams every frame into one file. Progress is
//! exposed through [`Collectable::collect_asset_docs`], which hands the
//! writer's committed-frame count to a [`ChunkTracker`] and returns the
//! resulting stream documents.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use daq_core::device::{
    Collectable, Configurable, DataKeys, Device, Flyable, Readable, Readings, Stageable,
    StandardReadable, Triggerable,
};
use daq_core::document::{new_uid, Asset, DataKey};
use daq_core::signal::set_and_wait_for_value;
use daq_core::{DaqError, DaqResult, Status};
use tracing::{debug, info};

use super::directory::DirectoryProvider;
use super::driver::{AdDriver, ImageMode};
use super::tracker::ChunkTracker;
use super::writer::{FileWriteMode, NdFileHdf};
use crate::config::DetectorConfig;

/// Where a streaming detector is in its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No session.
    Idle,
    /// Writer armed, no acquisition running.
    Staged,
    /// Free-running acquisition started by `kickoff`.
    Running,
    /// Completion handed out; may be kicked off again or unstaged.
    Completed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Staged => "staged",
            LifecycleState::Running => "running",
            LifecycleState::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// State that exists only between stage and unstage.
#[derive(Debug)]
struct Session {
    file_name: String,
    capture_status: Status,
    start_status: Option<Status>,
    tracker: ChunkTracker,
}

/// Area detector streaming frames into a single SWMR HDF5 file.
pub struct HdfStreamerDet {
    name: String,
    /// Driver facade.
    pub drv: AdDriver,
    /// Writer facade.
    pub hdf: NdFileHdf,
    directory_provider: Arc<dyn DirectoryProvider>,
    config: DetectorConfig,
    readable: StandardReadable,
    state: LifecycleState,
    session: Option<Session>,
}

impl fmt::Debug for HdfStreamerDet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HdfStreamerDet")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("session", &self.session)
            .finish()
    }
}

impl HdfStreamerDet {
    /// Assemble a detector from its facades.
    pub fn new(
        name: impl Into<String>,
        drv: AdDriver,
        hdf: NdFileHdf,
        directory_provider: Arc<dyn DirectoryProvider>,
        config: DetectorConfig,
    ) -> Self {
        let readable = StandardReadable::new().with_config(drv.acquire_time.erased());
        Self {
            name: name.into(),
            drv,
            hdf,
            directory_provider,
            config,
            readable,
            state: LifecycleState::Idle,
            session: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Base file name of the current session.
    pub fn file_name(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.file_name.as_str())
    }

    /// Timing configuration in use.
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    fn timeout(&self) -> Option<Duration> {
        Some(self.config.default_timeout())
    }

    fn session_mut(&mut self) -> DaqResult<&mut Session> {
        self.session
            .as_mut()
            .ok_or_else(|| DaqError::precondition("Stage not run"))
    }
}

#[async_trait]
impl Device for HdfStreamerDet {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self, timeout: Duration) -> DaqResult<()> {
        tokio::try_join!(self.drv.connect(timeout), self.hdf.connect(timeout))?;
        Ok(())
    }
}

#[async_trait]
impl Stageable for HdfStreamerDet {
    async fn stage(&mut self) -> DaqResult<()> {
        if self.state != LifecycleState::Idle {
            return Err(DaqError::precondition(format!(
                "{}: cannot stage while {}",
                self.name, self.state
            )));
        }

        let directory = self.directory_provider.get_directory().await?;
        let file_name = format!("{}-{}", self.name, new_uid());
        let timeout = self.timeout();
        tokio::try_join!(
            self.drv.wait_for_plugins.set(true, timeout),
            self.hdf.lazy_open.set(true, timeout),
            self.hdf.swmr_mode.set(true, timeout),
            self.hdf
                .file_path
                .set(directory.to_string_lossy().into_owned(), timeout),
            self.hdf.file_name.set(file_name.clone(), timeout),
            self.hdf
                .file_template
                .set(self.config.file_template.clone(), timeout),
            // Unbounded: capture until disarmed
            self.hdf.num_capture.set(0, timeout),
            self.hdf.file_write_mode.set(FileWriteMode::Stream, timeout),
        )?;

        let capture_status =
            set_and_wait_for_value(&self.hdf.capture, true, self.config.default_timeout()).await?;
        let tracker = ChunkTracker::new(
            self.name.clone(),
            self.hdf.full_file_name.clone(),
            self.config.stall_timeout(),
        );

        info!(
            detector = %self.name,
            directory = %directory.display(),
            file_name = %file_name,
            "staged"
        );
        self.session = Some(Session {
            file_name,
            capture_status,
            start_status: None,
            tracker,
        });
        self.state = LifecycleState::Staged;
        Ok(())
    }

    async fn unstage(&mut self) -> DaqResult<()> {
        let session = self
            .session
            .take()
            .ok_or_else(|| DaqError::precondition("Stage not run"))?;

        // The armed capture put is still outstanding, so this one must not wait
        if let Err(e) = self.hdf.capture.set_no_wait(false).await {
            self.session = Some(session);
            return Err(e);
        }
        self.state = LifecycleState::Idle;
        let emitted = session.tracker.last_emitted();
        session.capture_status.await?;

        info!(detector = %self.name, frames = emitted, "unstaged");
        Ok(())
    }
}

#[async_trait]
impl Triggerable for HdfStreamerDet {
    async fn trigger(&mut self) -> DaqResult<()> {
        match self.state {
            LifecycleState::Idle => return Err(DaqError::precondition("Stage not run")),
            LifecycleState::Running => {
                return Err(DaqError::precondition(format!(
                    "{}: cannot trigger while running",
                    self.name
                )))
            }
            LifecycleState::Staged | LifecycleState::Completed => {}
        }
        self.session_mut()?.tracker.restart_stall_clock();

        self.drv
            .image_mode
            .set(ImageMode::Single, self.timeout())
            .await?;
        let frame_timeout = self.drv.frame_timeout(self.config.default_timeout()).await?;
        debug!(detector = %self.name, ?frame_timeout, "trigger");
        self.drv.acquire.set(true, Some(frame_timeout)).await
    }
}

#[async_trait]
impl Flyable for HdfStreamerDet {
    async fn kickoff(&mut self) -> DaqResult<()> {
        match self.state {
            LifecycleState::Staged | LifecycleState::Completed => {}
            LifecycleState::Idle => return Err(DaqError::precondition("Stage not run")),
            LifecycleState::Running => {
                return Err(DaqError::precondition(format!(
                    "{}: kickoff already run",
                    self.name
                )))
            }
        }

        self.drv
            .image_mode
            .set(ImageMode::Multiple, self.timeout())
            .await?;
        let start_status =
            set_and_wait_for_value(&self.drv.acquire, true, self.config.default_timeout()).await?;
        let session = self.session_mut()?;
        session.start_status = Some(start_status);
        // Frames can only be expected from here on
        session.tracker.restart_stall_clock();
        self.state = LifecycleState::Running;

        info!(detector = %self.name, "kicked off");
        Ok(())
    }

    fn complete_status(&mut self) -> DaqResult<Status> {
        let status = self
            .session
            .as_mut()
            .and_then(|s| s.start_status.take())
            .ok_or_else(|| DaqError::precondition("Kickoff not run"))?;
        self.state = LifecycleState::Completed;
        Ok(status)
    }
}

#[async_trait]
impl Readable for HdfStreamerDet {
    async fn read(&self) -> DaqResult<Readings> {
        self.readable.read().await
    }

    async fn describe(&self) -> DaqResult<DataKeys> {
        let (size_y, size_x) = tokio::try_join!(
            self.drv.array_size_y.get_value(),
            self.drv.array_size_x.get_value()
        )?;

        let mut keys = self.readable.describe();
        // Frames themselves never appear in read(); only stream documents point at them
        keys.insert(
            self.name.clone(),
            DataKey::external_array(&self.hdf.full_file_name.source(), vec![size_y, size_x], "STREAM:"),
        );
        Ok(keys)
    }
}

#[async_trait]
impl Configurable for HdfStreamerDet {
    async fn read_configuration(&self) -> DaqResult<Readings> {
        self.readable.read_configuration().await
    }

    async fn describe_configuration(&self) -> DaqResult<DataKeys> {
        Ok(self.readable.describe_configuration())
    }
}

#[async_trait]
impl Collectable for HdfStreamerDet {
    async fn describe_collect(&self) -> DaqResult<DataKeys> {
        self.describe().await
    }

    async fn collect_asset_docs(&mut self) -> DaqResult<Vec<Asset>> {
        let num_captured = self.hdf.num_captured.get_value().await?;
        let observed = u64::try_from(num_captured).unwrap_or(0);

        let session = self
            .session
            .as_mut()
            .ok_or_else(|| DaqError::precondition("Stage not run"))?;
        let Some(event) = session.tracker.poll(observed).await? else {
            return Ok(Vec::new());
        };

        // Make the announced frames visible to readers before announcing them.
        // A failed flush leaves the event uncommitted for the next collect.
        self.hdf
            .flush_now
            .set(true, Some(self.config.default_timeout()))
            .await?;
        session.tracker.commit(&event);
        Ok(event.into_assets())
    }
}
