//! End-to-end fly scans against simulated detector hardware.

mod common;

use std::sync::Arc;
use std::time::Duration;

use areadetector_daq::areadetector::{
    AdDriver, HdfStreamerDet, NdFileHdf, SimDetector, SimHardware, TmpDirectoryProvider,
};
use areadetector_daq::config::DetectorConfig;
use areadetector_daq::fly::fly;
use common::{datums, kinds, resources};
use daq_core::device::{Collectable, Stageable, Triggerable};
use daq_core::document::StreamRange;
use daq_core::sim::set_sim_value;

fn sim_streamer(exposure: f64) -> (HdfStreamerDet, Arc<TmpDirectoryProvider>, SimHardware) {
    let drv = AdDriver::sim("SIM:DRV:", "sim-drv");
    let hdf = NdFileHdf::sim("SIM:HDF:", "sim-hdf");
    let hardware = SimDetector::new(640, 480).attach(&drv, &hdf).unwrap();
    set_sim_value(&drv.acquire_time, exposure).unwrap();

    let provider = Arc::new(TmpDirectoryProvider::new().unwrap());
    let det = HdfStreamerDet::new("sim", drv, hdf, provider.clone(), DetectorConfig::default());
    (det, provider, hardware)
}

#[tokio::test(start_paused = true)]
async fn test_fly_scan_streams_every_frame() {
    let (mut det, provider, _hardware) = sim_streamer(0.05);
    det.stage().await.unwrap();
    let file_name = det.file_name().unwrap().to_string();

    let assets = fly(&mut det, 10, Duration::from_millis(120)).await.unwrap();

    assert_eq!(kinds(&assets)[0], "stream_resource");
    assert_eq!(resources(&assets).len(), 1);
    let expected_path = format!("{}/{}.h5", provider.path().display(), file_name);
    assert_eq!(resources(&assets)[0].resource_path, expected_path);

    // Contiguous, gap-free coverage of every frame
    let datums = datums(&assets);
    assert!(datums.len() > 1);
    let mut next = 0;
    for (block, datum) in datums.iter().enumerate() {
        assert_eq!(datum.block_idx, block as u64);
        assert_eq!(datum.indices.start, next);
        assert!(!datum.indices.is_empty());
        next = datum.indices.stop;
    }
    assert_eq!(next, 10);

    assert_eq!(det.hdf.num_captured.get_value().await.unwrap(), 10);
    assert!(!det.drv.acquire.get_value().await.unwrap());
    det.unstage().await.unwrap();
    assert!(!det.hdf.capture.get_value().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_trigger_takes_one_frame() {
    let (mut det, _provider, _hardware) = sim_streamer(0.2);
    det.stage().await.unwrap();
    det.trigger().await.unwrap();

    assert_eq!(det.drv.array_counter.get_value().await.unwrap(), 1);
    let assets = det.collect_asset_docs().await.unwrap();
    assert_eq!(datums(&assets)[0].indices, StreamRange { start: 0, stop: 1 });

    let keys = det.describe_collect().await.unwrap();
    assert_eq!(keys["sim"].shape, vec![480, 640]);
    det.unstage().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_second_session_restarts_ranges() {
    let (mut det, _provider, _hardware) = sim_streamer(0.01);

    det.stage().await.unwrap();
    let first = fly(&mut det, 3, Duration::from_millis(100)).await.unwrap();
    det.unstage().await.unwrap();

    // Re-arming the writer starts a new file and restarts its counter
    det.stage().await.unwrap();
    assert_eq!(det.hdf.num_captured.get_value().await.unwrap(), 0);
    let second = fly(&mut det, 2, Duration::from_millis(100)).await.unwrap();
    det.unstage().await.unwrap();

    assert_ne!(resources(&first)[0].uid, resources(&second)[0].uid);
    assert_ne!(
        resources(&first)[0].resource_path,
        resources(&second)[0].resource_path
    );
    assert_eq!(datums(&second)[0].indices.start, 0);
    assert_eq!(datums(&second).last().unwrap().indices.stop, 2);
}
