//! Typed signals: named points on a control-system backend.
//!
//! A signal is a typed handle to one hardware variable. The transport behind
//! it is a [`SignalBackend`]; the rest of the system only talks to
//! [`SignalR`] (read-only) and [`SignalRW`] (read/write) handles.
//!
//! # Architecture
//!
//! ```text
//! SignalRW<T>
//!   └─ SignalR<T>
//!        ├─ name: String                       (device-qualified, e.g. "det-drv-acquire")
//!        └─ backend: Arc<dyn SignalBackend<T>>  (sim://, or a real transport)
//! ```
//!
//! Readback values are published through a `tokio::sync::watch` channel so
//! that "wait until the hardware reports X" is a subscription, not a poll.

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;

use crate::document::{now_secs, DataKey, Reading};
use crate::error::{DaqError, DaqResult};
use crate::status::Status;

/// Timeout applied to connection and confirmation waits unless overridden.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Value types that can travel over a signal.
pub trait SignalValue:
    Clone + Send + Sync + PartialEq + Debug + Serialize + Default + 'static
{
    /// Data type name used in data keys ("number", "integer", "string", ...).
    fn dtype() -> &'static str;
}

impl SignalValue for bool {
    fn dtype() -> &'static str {
        "boolean"
    }
}

impl SignalValue for i64 {
    fn dtype() -> &'static str {
        "integer"
    }
}

impl SignalValue for f64 {
    fn dtype() -> &'static str {
        "number"
    }
}

impl SignalValue for String {
    fn dtype() -> &'static str {
        "string"
    }
}

/// Transport for a single typed point.
///
/// # Contract
/// - `put(value, wait = true)` resolves when the backend acknowledges the
///   write as complete (for an acquire flag: when acquisition finishes).
/// - `put(value, wait = false)` resolves once the write has been issued.
/// - `subscribe()` publishes every readback change.
#[async_trait]
pub trait SignalBackend<T: SignalValue>: Send + Sync {
    /// Human-readable address of the point, e.g. `sim://DET:Acquire_RBV`.
    fn source(&self) -> String;

    /// Establish the connection, failing if the point does not exist.
    async fn connect(&self, timeout: Duration) -> DaqResult<()>;

    /// Write a value.
    async fn put(&self, value: T, wait: bool) -> DaqResult<()>;

    /// Read the current readback value.
    async fn get_value(&self) -> DaqResult<T>;

    /// Subscribe to readback changes.
    fn subscribe(&self) -> watch::Receiver<T>;

    /// Access the concrete backend for downcasting (used by simulation helpers).
    fn as_any(&self) -> &dyn Any;
}

/// Creates backends for a given pair of read and write addresses.
pub trait BackendFactory {
    /// Build a backend reading from `read_pv` and, if given, writing to `write_pv`.
    fn backend<T: SignalValue>(
        &self,
        read_pv: &str,
        write_pv: Option<&str>,
    ) -> Arc<dyn SignalBackend<T>>;
}

// =============================================================================
// SignalR
// =============================================================================

/// Read-only handle to a typed point.
pub struct SignalR<T: SignalValue> {
    name: String,
    backend: Arc<dyn SignalBackend<T>>,
}

impl<T: SignalValue> Clone for SignalR<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<T: SignalValue> Debug for SignalR<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalR")
            .field("name", &self.name)
            .field("source", &self.backend.source())
            .finish()
    }
}

impl<T: SignalValue> SignalR<T> {
    /// Wrap a backend under a device-qualified name.
    pub fn new(name: impl Into<String>, backend: Arc<dyn SignalBackend<T>>) -> Self {
        Self {
            name: name.into(),
            backend,
        }
    }

    /// Device-qualified signal name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backend address.
    pub fn source(&self) -> String {
        self.backend.source()
    }

    /// The backend behind this handle.
    pub fn backend(&self) -> &Arc<dyn SignalBackend<T>> {
        &self.backend
    }

    /// Connect the backend, mapping expiry to a timeout error naming this signal.
    pub async fn connect(&self, timeout: Duration) -> DaqResult<()> {
        match tokio::time::timeout(timeout, self.backend.connect(timeout)).await {
            Ok(result) => result,
            Err(_) => Err(DaqError::Timeout {
                operation: format!("connect {}", self.name),
                timeout,
            }),
        }
    }

    /// Current readback value.
    pub async fn get_value(&self) -> DaqResult<T> {
        self.backend.get_value().await
    }

    /// Current value with a timestamp, as JSON.
    pub async fn read(&self) -> DaqResult<Reading> {
        let value = self.get_value().await?;
        self.reading(&value)
    }

    /// Last published readback with a timestamp, without a round trip.
    pub fn read_cached(&self) -> DaqResult<Reading> {
        let value = self.subscribe().borrow().clone();
        self.reading(&value)
    }

    fn reading(&self, value: &T) -> DaqResult<Reading> {
        let value = serde_json::to_value(value)
            .map_err(|e| DaqError::Signal(format!("{}: cannot serialize value: {}", self.name, e)))?;
        Ok(Reading {
            value,
            timestamp: now_secs(),
        })
    }

    /// Scalar data key for this signal.
    pub fn describe(&self) -> DataKey {
        DataKey::scalar(&self.source(), T::dtype())
    }

    /// Subscribe to readback changes.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.backend.subscribe()
    }
}

impl<T: SignalValue> AsRef<SignalR<T>> for SignalR<T> {
    fn as_ref(&self) -> &SignalR<T> {
        self
    }
}

// =============================================================================
// SignalRW
// =============================================================================

/// Read/write handle to a typed point.
pub struct SignalRW<T: SignalValue> {
    read: SignalR<T>,
}

impl<T: SignalValue> Clone for SignalRW<T> {
    fn clone(&self) -> Self {
        Self {
            read: self.read.clone(),
        }
    }
}

impl<T: SignalValue> Debug for SignalRW<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalRW")
            .field("name", &self.read.name)
            .field("source", &self.read.backend.source())
            .finish()
    }
}

impl<T: SignalValue> std::ops::Deref for SignalRW<T> {
    type Target = SignalR<T>;

    fn deref(&self) -> &SignalR<T> {
        &self.read
    }
}

impl<T: SignalValue> AsRef<SignalR<T>> for SignalRW<T> {
    fn as_ref(&self) -> &SignalR<T> {
        &self.read
    }
}

impl<T: SignalValue> SignalRW<T> {
    /// Wrap a backend under a device-qualified name.
    pub fn new(name: impl Into<String>, backend: Arc<dyn SignalBackend<T>>) -> Self {
        Self {
            read: SignalR::new(name, backend),
        }
    }

    /// Start writing `value` and return a status that resolves when the put
    /// completes. With a timeout, expiry resolves the status to
    /// `DaqError::Timeout` naming this signal.
    pub fn set(&self, value: T, timeout: Option<Duration>) -> Status {
        let backend = Arc::clone(&self.read.backend);
        let name = self.read.name.clone();
        tracing::trace!(signal = %name, ?value, ?timeout, "put");
        Status::spawn(format!("set {name}"), async move {
            let put = backend.put(value, true);
            match timeout {
                None => put.await,
                Some(timeout) => match tokio::time::timeout(timeout, put).await {
                    Ok(result) => result,
                    Err(_) => Err(DaqError::Timeout {
                        operation: name,
                        timeout,
                    }),
                },
            }
        })
    }

    /// Issue a write without waiting for the put-completion acknowledgement.
    pub async fn set_no_wait(&self, value: T) -> DaqResult<()> {
        tracing::trace!(signal = %self.read.name, ?value, "put (no wait)");
        self.read.backend.put(value, false).await
    }
}

async fn wait_for_value<T: SignalValue>(
    rx: &mut watch::Receiver<T>,
    value: &T,
) -> Result<(), watch::error::RecvError> {
    rx.wait_for(|current| current == value).await.map(|_| ())
}

/// Write `value` and suspend until the readback reports it.
///
/// Returns the still-pending put status so the caller can later wait for the
/// operation to actually finish (for `Capture` or `Acquire`, the end of the
/// capture or acquisition).
pub async fn set_and_wait_for_value<T: SignalValue>(
    signal: &SignalRW<T>,
    value: T,
    timeout: Duration,
) -> DaqResult<Status> {
    let mut rx = signal.subscribe();
    let status = signal.set(value.clone(), None);
    match tokio::time::timeout(timeout, wait_for_value(&mut rx, &value)).await {
        Ok(Ok(())) => Ok(status),
        Ok(Err(_)) => {
            status.cancel();
            Err(DaqError::Signal(format!(
                "{}: readback channel closed",
                signal.name()
            )))
        }
        Err(_) => {
            status.cancel();
            Err(DaqError::Timeout {
                operation: format!("{} == {:?}", signal.name(), value),
                timeout,
            })
        }
    }
}

// =============================================================================
// areaDetector-style constructors
// =============================================================================

/// Read/write signal with an `_RBV` readback, the areaDetector convention.
pub fn ad_rw<T: SignalValue, F: BackendFactory>(
    factory: &F,
    name: impl Into<String>,
    pv: &str,
) -> SignalRW<T> {
    SignalRW::new(name, factory.backend(&format!("{pv}_RBV"), Some(pv)))
}

/// Read-only signal on an `_RBV` readback.
pub fn ad_r<T: SignalValue, F: BackendFactory>(
    factory: &F,
    name: impl Into<String>,
    pv: &str,
) -> SignalR<T> {
    SignalR::new(name, factory.backend(&format!("{pv}_RBV"), None))
}

/// Read/write signal without a separate readback record.
pub fn epics_rw<T: SignalValue, F: BackendFactory>(
    factory: &F,
    name: impl Into<String>,
    pv: &str,
) -> SignalRW<T> {
    SignalRW::new(name, factory.backend(pv, Some(pv)))
}

// =============================================================================
// Type-erased access
// =============================================================================

/// Object-safe view of any readable signal, used to assemble reading
/// partitions of mixed value types.
#[async_trait]
pub trait AnySignal: Send + Sync {
    /// Device-qualified name.
    fn name(&self) -> &str;
    /// Data key describing the signal.
    fn describe(&self) -> DataKey;
    /// Current value with timestamp.
    async fn read(&self) -> DaqResult<Reading>;
    /// Last published value with timestamp.
    fn read_cached(&self) -> DaqResult<Reading>;
    /// Connect the backend.
    async fn connect(&self, timeout: Duration) -> DaqResult<()>;
}

#[async_trait]
impl<T: SignalValue> AnySignal for SignalR<T> {
    fn name(&self) -> &str {
        SignalR::name(self)
    }

    fn describe(&self) -> DataKey {
        SignalR::describe(self)
    }

    async fn read(&self) -> DaqResult<Reading> {
        SignalR::read(self).await
    }

    fn read_cached(&self) -> DaqResult<Reading> {
        SignalR::read_cached(self)
    }

    async fn connect(&self, timeout: Duration) -> DaqResult<()> {
        SignalR::connect(self, timeout).await
    }
}

impl<T: SignalValue> SignalR<T> {
    /// Type-erased clone of this signal.
    pub fn erased(&self) -> Arc<dyn AnySignal> {
        Arc::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{set_sim_put_proceeds, SimBackendFactory};

    #[tokio::test]
    async fn test_ad_rw_addresses_readback() {
        let factory = SimBackendFactory;
        let acquire: SignalRW<bool> = ad_rw(&factory, "det-drv-acquire", "PREFIX:Acquire");
        assert_eq!(acquire.name(), "det-drv-acquire");
        assert_eq!(acquire.source(), "sim://PREFIX:Acquire_RBV");

        let flush: SignalRW<bool> = epics_rw(&factory, "det-hdf-flush_now", "PREFIX:FlushNow");
        assert_eq!(flush.source(), "sim://PREFIX:FlushNow");
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let factory = SimBackendFactory;
        let exposure: SignalRW<f64> = ad_rw(&factory, "exposure", "P:AcquireTime");
        exposure.set(0.25, None).await.unwrap();
        assert_eq!(exposure.get_value().await.unwrap(), 0.25);

        let reading = exposure.read().await.unwrap();
        assert_eq!(reading.value, serde_json::json!(0.25));
        assert_eq!(exposure.describe().dtype, "number");
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_timeout_is_distinguishable() {
        let factory = SimBackendFactory;
        let acquire: SignalRW<bool> = ad_rw(&factory, "det-drv-acquire", "P:Acquire");
        set_sim_put_proceeds(&acquire, false).unwrap();

        let err = acquire
            .set(true, Some(Duration::from_millis(200)))
            .await
            .unwrap_err();
        match err {
            DaqError::Timeout { operation, timeout } => {
                assert_eq!(operation, "det-drv-acquire");
                assert_eq!(timeout, Duration::from_millis(200));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_and_wait_for_value_returns_pending_status() {
        let factory = SimBackendFactory;
        let capture: SignalRW<bool> = ad_rw(&factory, "hdf-capture", "P:Capture");
        set_sim_put_proceeds(&capture, false).unwrap();

        let status = set_and_wait_for_value(&capture, true, DEFAULT_TIMEOUT)
            .await
            .unwrap();
        assert!(capture.get_value().await.unwrap());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!status.done());

        set_sim_put_proceeds(&capture, true).unwrap();
        status.await.unwrap();
    }

    #[tokio::test]
    async fn test_erased_signal_reads() {
        let factory = SimBackendFactory;
        let counter: SignalR<i64> = ad_r(&factory, "det-drv-array_counter", "P:ArrayCounter");
        let erased = counter.erased();
        assert_eq!(erased.name(), "det-drv-array_counter");
        assert_eq!(erased.describe().dtype, "integer");
        assert_eq!(erased.read().await.unwrap().value, serde_json::json!(0));
    }
}
