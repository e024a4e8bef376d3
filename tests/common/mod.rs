//! Common test utilities for areadetector-daq integration tests
//!
//! - Simulated detector fixtures mirroring a pair of IOCs left in
//!   non-default states
//! - Document accessors and elapsed-time assertions

#![allow(dead_code)] // Not every test binary uses every helper

use std::sync::Arc;
use std::time::Duration;

use areadetector_daq::areadetector::{
    AdDriver, DirectoryProvider, HdfStreamerDet, ImageMode, NdFileHdf, StaticDirectoryProvider,
};
use areadetector_daq::config::DetectorConfig;
use daq_core::document::{Asset, StreamDatum, StreamResource};
use daq_core::sim::set_sim_value;

/// Directory every fixture detector writes into.
pub const DATA_DIR: &str = "/tmp/123456";

/// A streaming detector whose simulated backend reports `acquire_time =
/// 0.8 + index`, a `(1024 + index) x (768 + index)` sensor, one frame already
/// captured and a valid file name.
pub fn streamer(name: &str, index: i64, config: DetectorConfig) -> HdfStreamerDet {
    let provider: Arc<dyn DirectoryProvider> = Arc::new(StaticDirectoryProvider::new(DATA_DIR));
    let drv = AdDriver::sim("PREFIX1:DET", &format!("{name}-drv"));
    let hdf = NdFileHdf::sim("PREFIX1:HDF", &format!("{name}-hdf"));

    set_sim_value(&drv.acquire_time, 0.8 + index as f64).unwrap();
    set_sim_value(&drv.image_mode, ImageMode::Continuous).unwrap();
    set_sim_value(&hdf.num_capture, 1000_i64).unwrap();
    set_sim_value(&hdf.num_captured, 1_i64).unwrap();
    set_sim_value(&hdf.full_file_name, format!("{DATA_DIR}/{name}.h5")).unwrap();
    set_sim_value(&drv.array_size_x, 1024 + index).unwrap();
    set_sim_value(&drv.array_size_y, 768 + index).unwrap();

    HdfStreamerDet::new(name, drv, hdf, provider, config)
}

/// The usual pair: `deta` and `detb` with default timing.
pub fn streamer_pair() -> Vec<HdfStreamerDet> {
    vec![
        streamer("deta", 0, DetectorConfig::default()),
        streamer("detb", 1, DetectorConfig::default()),
    ]
}

/// Document kinds in order.
pub fn kinds(assets: &[Asset]) -> Vec<&'static str> {
    assets.iter().map(Asset::kind).collect()
}

/// Every stream resource in `assets`.
pub fn resources(assets: &[Asset]) -> Vec<&StreamResource> {
    assets
        .iter()
        .filter_map(|a| match a {
            Asset::StreamResource(r) => Some(r),
            Asset::StreamDatum(_) => None,
        })
        .collect()
}

/// Every stream datum in `assets`.
pub fn datums(assets: &[Asset]) -> Vec<&StreamDatum> {
    assets
        .iter()
        .filter_map(|a| match a {
            Asset::StreamDatum(d) => Some(d),
            Asset::StreamResource(_) => None,
        })
        .collect()
}

/// Assert `min <= actual < max`.
pub fn assert_elapsed_within(actual: Duration, min: Duration, max: Duration, context: &str) {
    assert!(
        actual >= min && actual < max,
        "{context}: elapsed {actual:?} outside [{min:?}, {max:?})"
    );
}
