//! Streaming chunk tracker.
//!
//! Turns a monotonically growing committed-frame count into stream documents:
//! one [`StreamResource`] at the first frame of a session, then one
//! [`StreamDatum`] per poll that observed progress, covering exactly the frames
//! committed since the previous one. When the count stops growing for longer
//! than the stall budget the next poll fails with [`DaqError::Stalled`].
//!
//! A poll only proposes the next event. The watermark moves when the event is
//! [committed](ChunkTracker::commit), so an event that never reached the
//! consumer is proposed again, widened to the latest count.
//!
//! ```text
//! poll(0)            -> None
//! poll(3)  + commit  -> resource + datum[0, 3)   (block 0)
//! poll(3)            -> None                     (stall clock keeps running)
//! poll(5)  + commit  -> datum[3, 5)              (block 1)
//! ```

use std::time::Duration;

use daq_core::document::{Asset, StreamDatum, StreamRange, StreamResource, AD_HDF5_SWMR_SLICE};
use daq_core::{DaqError, DaqResult, SignalR};
use tokio::time::Instant;

/// Default time without new frames before a session is declared stalled.
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(120);

/// Documents produced by one poll that observed progress.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkEvent {
    /// Present until the session's resource has been committed once.
    pub resource: Option<StreamResource>,
    /// The newly committed range.
    pub datum: StreamDatum,
}

impl ChunkEvent {
    /// Resource (if any) followed by the datum, in emission order.
    pub fn into_assets(self) -> Vec<Asset> {
        let mut assets = Vec::with_capacity(2);
        if let Some(resource) = self.resource {
            assets.push(Asset::StreamResource(resource));
        }
        assets.push(Asset::StreamDatum(self.datum));
        assets
    }
}

/// Per-session watermark over the writer's committed-frame count.
#[derive(Debug)]
pub struct ChunkTracker {
    name: String,
    full_file_name: SignalR<String>,
    stall_timeout: Duration,
    resource: Option<StreamResource>,
    announced: bool,
    last_emitted: u64,
    next_block: u64,
    last_progress: Instant,
}

impl ChunkTracker {
    /// Start tracking a session. The stall clock starts now.
    pub fn new(name: impl Into<String>, full_file_name: SignalR<String>, stall_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            full_file_name,
            stall_timeout,
            resource: None,
            announced: false,
            last_emitted: 0,
            next_block: 0,
            last_progress: Instant::now(),
        }
    }

    /// Frames already covered by committed datums.
    pub fn last_emitted(&self) -> u64 {
        self.last_emitted
    }

    /// The session's resource, once the first frame has been seen.
    pub fn resource(&self) -> Option<&StreamResource> {
        self.resource.as_ref()
    }

    /// Start a fresh stall budget, e.g. when an acquisition begins.
    pub fn restart_stall_clock(&mut self) {
        self.last_progress = Instant::now();
    }

    /// Compare `observed` with the watermark and propose the next event.
    ///
    /// Never waits for new data. Counts that go backwards are treated as no
    /// progress. Nothing advances until [`commit`](Self::commit) is called.
    pub async fn poll(&mut self, observed: u64) -> DaqResult<Option<ChunkEvent>> {
        if observed <= self.last_emitted {
            let elapsed = self.last_progress.elapsed();
            if elapsed > self.stall_timeout {
                tracing::warn!(
                    detector = %self.name,
                    frame = observed,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "no new frames within stall budget"
                );
                return Err(DaqError::Stalled {
                    name: self.name.clone(),
                    frame: observed,
                });
            }
            return Ok(None);
        }

        let resource = match self.resource.take() {
            Some(resource) => resource,
            None => {
                // Only valid once the writer has opened the file
                let path = self.full_file_name.get_value().await?;
                let resource = StreamResource::new(AD_HDF5_SWMR_SLICE, "/", &path);
                tracing::info!(detector = %self.name, path = %path, uid = %resource.uid, "stream resource opened");
                resource
            }
        };

        let indices = StreamRange {
            start: self.last_emitted,
            stop: observed,
        };
        let event = ChunkEvent {
            resource: (!self.announced).then(|| resource.clone()),
            datum: resource.compose_datum(self.next_block, vec![self.name.clone()], indices),
        };
        self.resource = Some(resource);
        Ok(Some(event))
    }

    /// Record that `event`, returned by the last [`poll`](Self::poll), reached
    /// the consumer.
    pub fn commit(&mut self, event: &ChunkEvent) {
        let indices = event.datum.indices;
        tracing::debug!(
            detector = %self.name,
            block = event.datum.block_idx,
            start = indices.start,
            stop = indices.stop,
            "chunk committed"
        );
        self.announced = true;
        self.next_block = event.datum.block_idx + 1;
        self.last_emitted = indices.stop;
        self.last_progress = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daq_core::signal::ad_r;
    use daq_core::sim::{set_sim_value, SimBackendFactory};
    use tracing_test::traced_test;

    fn tracker(stall: Duration) -> (SignalR<String>, ChunkTracker) {
        let full_file_name: SignalR<String> =
            ad_r(&SimBackendFactory, "deta-hdf-full_file_name", "D:HDF:FullFileName");
        set_sim_value(&full_file_name, "/tmp/123456/deta.h5".to_string()).unwrap();
        let tracker = ChunkTracker::new("deta", full_file_name.clone(), stall);
        (full_file_name, tracker)
    }

    async fn poll_and_commit(tracker: &mut ChunkTracker, observed: u64) -> Option<ChunkEvent> {
        let event = tracker.poll(observed).await.unwrap()?;
        tracker.commit(&event);
        Some(event)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_progress_emits_resource_and_datum() {
        let (_, mut tracker) = tracker(DEFAULT_STALL_TIMEOUT);
        assert!(tracker.poll(0).await.unwrap().is_none());

        let event = poll_and_commit(&mut tracker, 3).await.unwrap();
        let resource = event.resource.clone().unwrap();
        assert_eq!(resource.spec, AD_HDF5_SWMR_SLICE);
        assert_eq!(resource.root, "/");
        assert_eq!(resource.resource_path, "/tmp/123456/deta.h5");
        assert_eq!(event.datum.block_idx, 0);
        assert_eq!(event.datum.indices, StreamRange { start: 0, stop: 3 });
        assert_eq!(event.datum.seq_nums, event.datum.indices);
        assert_eq!(event.datum.stream_resource, resource.uid);
        assert_eq!(event.datum.data_keys, vec!["deta".to_string()]);
        assert_eq!(event.into_assets().len(), 2);

        assert!(tracker.poll(3).await.unwrap().is_none());
        assert_eq!(tracker.last_emitted(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ranges_are_contiguous_and_resource_emitted_once() {
        let (full_file_name, mut tracker) = tracker(DEFAULT_STALL_TIMEOUT);
        let first = poll_and_commit(&mut tracker, 2).await.unwrap();

        // A later path change does not produce a second resource
        set_sim_value(&full_file_name, "/elsewhere.h5".to_string()).unwrap();
        let second = poll_and_commit(&mut tracker, 7).await.unwrap();
        assert!(second.resource.is_none());
        assert_eq!(second.datum.block_idx, 1);
        assert_eq!(second.datum.indices, StreamRange { start: 2, stop: 7 });
        assert_eq!(second.datum.uid, format!("{}/1", first.datum.stream_resource));
        assert_eq!(tracker.resource().unwrap().resource_path, "/tmp/123456/deta.h5");
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncommitted_event_is_proposed_again() {
        let (_, mut tracker) = tracker(DEFAULT_STALL_TIMEOUT);
        let dropped = tracker.poll(3).await.unwrap().unwrap();
        assert_eq!(tracker.last_emitted(), 0);

        let retried = poll_and_commit(&mut tracker, 5).await.unwrap();
        let resource = retried.resource.unwrap();
        assert_eq!(Some(&resource), dropped.resource.as_ref());
        assert_eq!(retried.datum.block_idx, 0);
        assert_eq!(retried.datum.indices, StreamRange { start: 0, stop: 5 });
        assert_eq!(retried.datum.stream_resource, resource.uid);

        let next = poll_and_commit(&mut tracker, 6).await.unwrap();
        assert!(next.resource.is_none());
        assert_eq!(next.datum.block_idx, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_after_budget() {
        let (_, mut tracker) = tracker(Duration::from_millis(100));
        poll_and_commit(&mut tracker, 1).await.unwrap();

        tokio::time::advance(Duration::from_millis(50)).await;
        assert!(tracker.poll(1).await.unwrap().is_none());

        tokio::time::advance(Duration::from_millis(60)).await;
        let err = tracker.poll(1).await.unwrap_err();
        assert!(err.is_stall());
        assert_eq!(err.to_string(), "deta: writing stalled on frame 1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_stall_clock_grants_fresh_budget() {
        let (_, mut tracker) = tracker(Duration::from_millis(100));
        tokio::time::advance(Duration::from_millis(150)).await;
        tracker.restart_stall_clock();
        assert!(tracker.poll(0).await.unwrap().is_none());

        tokio::time::advance(Duration::from_millis(150)).await;
        let err = tracker.poll(0).await.unwrap_err();
        assert!(matches!(err, DaqError::Stalled { frame: 0, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_resets_stall_clock() {
        let (_, mut tracker) = tracker(Duration::from_millis(100));
        tokio::time::advance(Duration::from_millis(90)).await;
        poll_and_commit(&mut tracker, 1).await.unwrap();
        tokio::time::advance(Duration::from_millis(90)).await;
        assert!(tracker.poll(1).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_stall_is_logged() {
        let (_, mut tracker) = tracker(Duration::from_millis(100));
        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(tracker.poll(0).await.is_err());
        assert!(logs_contain("no new frames within stall budget"));
    }
}
