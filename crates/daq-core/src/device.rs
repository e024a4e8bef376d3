//! Device capabilities
//!
//! Devices implement the small capability traits they actually support
//! instead of one monolithic detector trait:
//!
//! - a step-scan detector: `Stageable + Triggerable + Readable + Configurable`
//! - a streaming detector additionally: `Flyable + Collectable`
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Returns `DaqResult`
//!
//! Lifecycle methods take `&mut self`: one device runs one session, and a
//! second concurrent `collect_asset_docs` on the same device cannot be
//! expressed.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{join_all, try_join_all};

use crate::document::{Asset, DataKey, Reading};
use crate::error::DaqResult;
use crate::signal::AnySignal;
use crate::status::Status;

/// Readings keyed by signal name.
pub type Readings = BTreeMap<String, Reading>;

/// Data keys keyed by field name.
pub type DataKeys = BTreeMap<String, DataKey>;

/// Base of every device: a name and a connection step.
#[async_trait]
pub trait Device: Send + Sync {
    /// Device name (prefix of every child signal name).
    fn name(&self) -> &str;

    /// Connect every signal of the device, failing fast on missing points.
    async fn connect(&self, timeout: Duration) -> DaqResult<()>;
}

/// Capability: prepare for and release after a run.
#[async_trait]
pub trait Stageable: Device {
    /// Configure hardware for a session.
    async fn stage(&mut self) -> DaqResult<()>;

    /// Tear the session down.
    async fn unstage(&mut self) -> DaqResult<()>;
}

/// Capability: acquire one reading on demand.
#[async_trait]
pub trait Triggerable: Device {
    /// Take a single acquisition and wait for it.
    async fn trigger(&mut self) -> DaqResult<()>;
}

/// Capability: free-running acquisition.
#[async_trait]
pub trait Flyable: Device {
    /// Start acquisition; returns once the hardware confirms it is running.
    async fn kickoff(&mut self) -> DaqResult<()>;

    /// Hand out the status that resolves when the acquisition finishes.
    fn complete_status(&mut self) -> DaqResult<Status>;

    /// Wait for the acquisition started by `kickoff` to finish.
    async fn complete(&mut self) -> DaqResult<()> {
        self.complete_status()?.await
    }
}

/// Capability: expose readings and their schema.
#[async_trait]
pub trait Readable: Device {
    /// Current readings.
    async fn read(&self) -> DaqResult<Readings>;

    /// Schema of `read()` (and of externally stored data).
    async fn describe(&self) -> DaqResult<DataKeys>;
}

/// Capability: expose configuration readings.
#[async_trait]
pub trait Configurable: Device {
    /// Configuration values.
    async fn read_configuration(&self) -> DaqResult<Readings>;

    /// Schema of the configuration values.
    async fn describe_configuration(&self) -> DaqResult<DataKeys>;
}

/// Capability: stream references to externally written data.
#[async_trait]
pub trait Collectable: Device {
    /// Schema of collected data.
    async fn describe_collect(&self) -> DaqResult<DataKeys>;

    /// Documents for data written since the previous call. Never waits for
    /// new data; an empty result means "nothing new yet".
    async fn collect_asset_docs(&mut self) -> DaqResult<Vec<Asset>>;
}

// =============================================================================
// StandardReadable
// =============================================================================

/// Which part of a device's output a signal contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadPhase {
    /// Read from the last published readback.
    Read,
    /// Read with a fresh get on every `read()`.
    ReadUncached,
    /// Reported in configuration, not in events.
    Config,
}

/// Statically assembled partition of a device's signals into read phases.
///
/// ```rust,ignore
/// let readable = StandardReadable::new()
///     .with_read_uncached(drv.array_counter.erased())
///     .with_config(drv.acquire_time.erased());
/// ```
#[derive(Clone, Default)]
pub struct StandardReadable {
    signals: Vec<(ReadPhase, Arc<dyn AnySignal>)>,
}

impl std::fmt::Debug for StandardReadable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<(ReadPhase, &str)> =
            self.signals.iter().map(|(p, s)| (*p, s.name())).collect();
        f.debug_struct("StandardReadable")
            .field("signals", &names)
            .finish()
    }
}

impl StandardReadable {
    /// Empty partition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a signal to a phase.
    pub fn with(mut self, phase: ReadPhase, signal: Arc<dyn AnySignal>) -> Self {
        self.signals.push((phase, signal));
        self
    }

    /// Add a cached read signal.
    pub fn with_read(self, signal: Arc<dyn AnySignal>) -> Self {
        self.with(ReadPhase::Read, signal)
    }

    /// Add an uncached read signal.
    pub fn with_read_uncached(self, signal: Arc<dyn AnySignal>) -> Self {
        self.with(ReadPhase::ReadUncached, signal)
    }

    /// Add a configuration signal.
    pub fn with_config(self, signal: Arc<dyn AnySignal>) -> Self {
        self.with(ReadPhase::Config, signal)
    }

    /// Signals grouped by phase, phases in order, signals in insertion order.
    pub fn partition(&self) -> Vec<(ReadPhase, Vec<Arc<dyn AnySignal>>)> {
        let mut groups: BTreeMap<ReadPhase, Vec<Arc<dyn AnySignal>>> = BTreeMap::new();
        for (phase, signal) in &self.signals {
            groups.entry(*phase).or_default().push(Arc::clone(signal));
        }
        groups.into_iter().collect()
    }

    fn in_phases<'a>(
        &'a self,
        phases: &'a [ReadPhase],
    ) -> impl Iterator<Item = &'a (ReadPhase, Arc<dyn AnySignal>)> + 'a {
        self.signals.iter().filter(move |(p, _)| phases.contains(p))
    }

    /// Connect every signal concurrently.
    pub async fn connect(&self, timeout: Duration) -> DaqResult<()> {
        try_join_all(self.signals.iter().map(|(_, s)| s.connect(timeout))).await?;
        Ok(())
    }

    /// Read the event signals.
    pub async fn read(&self) -> DaqResult<Readings> {
        let signals: Vec<_> = self
            .in_phases(&[ReadPhase::Read, ReadPhase::ReadUncached])
            .collect();
        let results = join_all(signals.iter().map(|(phase, signal)| async move {
            match phase {
                ReadPhase::Read => signal.read_cached(),
                _ => signal.read().await,
            }
        }))
        .await;

        let mut readings = Readings::new();
        for ((_, signal), reading) in signals.iter().zip(results) {
            readings.insert(signal.name().to_string(), reading?);
        }
        Ok(readings)
    }

    /// Describe the event signals.
    pub fn describe(&self) -> DataKeys {
        self.in_phases(&[ReadPhase::Read, ReadPhase::ReadUncached])
            .map(|(_, s)| (s.name().to_string(), s.describe()))
            .collect()
    }

    /// Read the configuration signals.
    pub async fn read_configuration(&self) -> DaqResult<Readings> {
        let signals: Vec<_> = self.in_phases(&[ReadPhase::Config]).collect();
        let results = try_join_all(signals.iter().map(|(_, s)| s.read())).await?;
        Ok(signals
            .iter()
            .map(|(_, s)| s.name().to_string())
            .zip(results)
            .collect())
    }

    /// Describe the configuration signals.
    pub fn describe_configuration(&self) -> DataKeys {
        self.in_phases(&[ReadPhase::Config])
            .map(|(_, s)| (s.name().to_string(), s.describe()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{ad_r, ad_rw, SignalR, SignalRW};
    use crate::sim::{set_sim_value, SimBackendFactory};

    fn readable() -> (SignalR<i64>, SignalRW<f64>, StandardReadable) {
        let counter: SignalR<i64> = ad_r(&SimBackendFactory, "det-drv-array_counter", "D:ArrayCounter");
        let exposure: SignalRW<f64> = ad_rw(&SimBackendFactory, "det-drv-acquire_time", "D:AcquireTime");
        let readable = StandardReadable::new()
            .with_config(exposure.erased())
            .with_read_uncached(counter.erased());
        (counter, exposure, readable)
    }

    #[test]
    fn test_partition_orders_phases() {
        let (_, _, readable) = readable();
        let partition = readable.partition();
        let phases: Vec<ReadPhase> = partition.iter().map(|(p, _)| *p).collect();
        assert_eq!(phases, vec![ReadPhase::ReadUncached, ReadPhase::Config]);
        assert_eq!(partition[0].1[0].name(), "det-drv-array_counter");
    }

    #[tokio::test]
    async fn test_read_and_configuration_are_disjoint() {
        let (counter, exposure, readable) = readable();
        set_sim_value(&counter, 1_i64).unwrap();
        set_sim_value(&exposure, 0.5).unwrap();

        let readings = readable.read().await.unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings["det-drv-array_counter"].value, serde_json::json!(1));

        let config = readable.read_configuration().await.unwrap();
        assert_eq!(config["det-drv-acquire_time"].value, serde_json::json!(0.5));

        let keys = readable.describe();
        assert_eq!(keys["det-drv-array_counter"].source, "sim://D:ArrayCounter_RBV");
        assert!(readable
            .describe_configuration()
            .contains_key("det-drv-acquire_time"));
    }
}
