//! Fly-scan driver.
//!
//! Runs a streaming detector through kickoff/complete while collecting stream
//! documents on a fixed interval:
//!
//! ```text
//! kickoff ── complete_status ── collect ─┬─ sleep ── collect ─┬─ ... ── collect (final)
//!                                        └── status resolved ─┘
//! ```
//!
//! A collect that fails (a stall, or a lost signal) aborts the scan; the
//! detector stays staged and the caller is expected to unstage it.

use std::time::Duration;

use daq_core::device::{Collectable, Device, Flyable};
use daq_core::document::Asset;
use daq_core::DaqResult;
use futures::future::try_join_all;
use tracing::info;

use crate::areadetector::HdfStreamerDet;

/// Collect from `det` until the acquisition started by its last kickoff
/// finishes. The first collect happens immediately.
pub async fn collect_until_complete<D>(det: &mut D, poll_interval: Duration) -> DaqResult<Vec<Asset>>
where
    D: Flyable + Collectable + ?Sized,
{
    let mut status = det.complete_status()?;
    let mut assets = det.collect_asset_docs().await?;
    loop {
        tokio::select! {
            result = &mut status => {
                result?;
                break;
            }
            _ = tokio::time::sleep(poll_interval) => {
                assets.extend(det.collect_asset_docs().await?);
            }
        }
    }
    assets.extend(det.collect_asset_docs().await?);
    Ok(assets)
}

/// Acquire `num_images` frames on a staged detector and return every stream
/// document emitted while doing so.
pub async fn fly(
    det: &mut HdfStreamerDet,
    num_images: i64,
    poll_interval: Duration,
) -> DaqResult<Vec<Asset>> {
    let timeout = det.config().default_timeout();
    det.drv.num_images.set(num_images, Some(timeout)).await?;
    det.kickoff().await?;

    let assets = collect_until_complete(det, poll_interval).await?;
    info!(
        detector = %det.name(),
        num_images,
        documents = assets.len(),
        "fly scan complete"
    );
    Ok(assets)
}

/// [`fly`] several detectors in parallel. Fails as soon as any of them fails.
pub async fn fly_many(
    dets: &mut [HdfStreamerDet],
    num_images: i64,
    poll_interval: Duration,
) -> DaqResult<Vec<Vec<Asset>>> {
    try_join_all(
        dets.iter_mut()
            .map(|det| fly(det, num_images, poll_interval)),
    )
    .await
}
