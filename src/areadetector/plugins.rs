//! Downstream processing plugins attached to a detector.
//!
//! A detector holds its plugins in a [`PluginSet`], keyed by name, so extra
//! readable signals (e.g. the unique id of the last frame a stats plugin saw)
//! can be folded into the detector's readings without the detector knowing
//! the concrete plugin types.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use daq_core::device::Device;
use daq_core::signal::{ad_r, AnySignal, BackendFactory};
use daq_core::sim::SimBackendFactory;
use daq_core::{DaqResult, SignalR};
use futures::future::try_join_all;

/// A plugin in the detector's processing chain.
pub trait NdPlugin: Device {
    /// Signals this plugin contributes to the detector's uncached readings.
    fn signals(&self) -> Vec<Arc<dyn AnySignal>>;

    /// Concrete plugin access for typed lookups.
    fn as_any(&self) -> &dyn Any;
}

/// NDPluginStats: per-frame statistics.
#[derive(Debug, Clone)]
pub struct NdPluginStats {
    name: String,
    /// Unique id of the last processed frame.
    pub unique_id: SignalR<i64>,
}

impl NdPluginStats {
    /// Build the plugin at PV `prefix`.
    pub fn new<F: BackendFactory>(factory: &F, prefix: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            unique_id: ad_r(factory, format!("{name}-unique_id"), &format!("{prefix}UniqueId")),
        }
    }

    /// Plugin backed by simulated signals.
    pub fn sim(prefix: &str, name: &str) -> Self {
        Self::new(&SimBackendFactory, prefix, name)
    }
}

#[async_trait]
impl Device for NdPluginStats {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self, timeout: Duration) -> DaqResult<()> {
        self.unique_id.connect(timeout).await
    }
}

impl NdPlugin for NdPluginStats {
    fn signals(&self) -> Vec<Arc<dyn AnySignal>> {
        vec![self.unique_id.erased()]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Plugins keyed by name, iterated in name order.
#[derive(Clone, Default)]
pub struct PluginSet {
    plugins: BTreeMap<String, Arc<dyn NdPlugin>>,
}

impl std::fmt::Debug for PluginSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.plugins.keys()).finish()
    }
}

impl PluginSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a plugin under `key`.
    pub fn insert(&mut self, key: impl Into<String>, plugin: Arc<dyn NdPlugin>) {
        self.plugins.insert(key.into(), plugin);
    }

    /// Plugin stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Arc<dyn NdPlugin>> {
        self.plugins.get(key)
    }

    /// Plugin stored under `key`, if it is a `P`.
    pub fn get_typed<P: NdPlugin + 'static>(&self, key: &str) -> Option<&P> {
        self.plugins.get(key)?.as_any().downcast_ref::<P>()
    }

    /// `(key, plugin)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn NdPlugin>)> {
        self.plugins.iter().map(|(k, p)| (k.as_str(), p))
    }

    /// Number of plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// True when no plugin is attached.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Signals of every plugin, in key order.
    pub fn signals(&self) -> Vec<Arc<dyn AnySignal>> {
        self.plugins.values().flat_map(|p| p.signals()).collect()
    }

    /// Connect every plugin concurrently.
    pub async fn connect(&self, timeout: Duration) -> DaqResult<()> {
        try_join_all(self.plugins.values().map(|p| p.connect(timeout))).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_lookup() {
        let mut plugins = PluginSet::new();
        plugins.insert("stats", Arc::new(NdPluginStats::sim("DET:STATS:", "det-stats")));

        let stats = plugins.get_typed::<NdPluginStats>("stats").unwrap();
        assert_eq!(stats.unique_id.source(), "sim://DET:STATS:UniqueId_RBV");
        assert!(plugins.get("roi").is_none());
        assert_eq!(plugins.len(), 1);
    }

    #[test]
    fn test_signals_in_key_order() {
        let mut plugins = PluginSet::new();
        plugins.insert("stats2", Arc::new(NdPluginStats::sim("B:", "b")));
        plugins.insert("stats1", Arc::new(NdPluginStats::sim("A:", "a")));

        let names: Vec<String> = plugins.signals().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["a-unique_id", "b-unique_id"]);
    }

    #[tokio::test]
    async fn test_connect_all() {
        let mut plugins = PluginSet::new();
        plugins.insert("stats", Arc::new(NdPluginStats::sim("A:", "a")));
        plugins.connect(Duration::from_secs(1)).await.unwrap();
    }
}
