//! Simulated signal backend.
//!
//! Stands in for the control-system transport in tests and in the simulated
//! detector. Each point holds its value in a `watch` channel; writes update
//! the readback immediately.
//!
//! Put completion can be shaped in two ways:
//!
//! - [`set_sim_put_proceeds`] gates completion of waited puts (the value is
//!   still written, only the acknowledgement is held back).
//! - [`set_sim_put_handler`] installs a hardware-side callback whose future
//!   must finish before the put is acknowledged, e.g. an acquisition loop.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use tokio::sync::watch;

use crate::error::{DaqError, DaqResult};
use crate::signal::{BackendFactory, SignalBackend, SignalR, SignalValue};

/// Callback run on every put to a simulated point.
pub type PutHandler<T> = Arc<dyn Fn(T) -> BoxFuture<'static, DaqResult<()>> + Send + Sync>;

/// In-memory backend for one point.
pub struct SimSignalBackend<T: SignalValue> {
    read_pv: String,
    write_pv: Option<String>,
    value: watch::Sender<T>,
    put_proceeds: watch::Sender<bool>,
    put_handler: RwLock<Option<PutHandler<T>>>,
}

impl<T: SignalValue> SimSignalBackend<T> {
    /// Backend starting at `T::default()`.
    pub fn new(read_pv: impl Into<String>, write_pv: Option<String>) -> Self {
        let (value, _) = watch::channel(T::default());
        let (put_proceeds, _) = watch::channel(true);
        Self {
            read_pv: read_pv.into(),
            write_pv,
            value,
            put_proceeds,
            put_handler: RwLock::new(None),
        }
    }

    /// Overwrite the readback as if the hardware changed it.
    pub fn set_value(&self, value: T) {
        self.value.send_replace(value);
    }

    /// Allow or hold back completion of waited puts.
    pub fn set_put_proceeds(&self, proceeds: bool) {
        self.put_proceeds.send_replace(proceeds);
    }

    /// Install a hardware-side put callback.
    pub fn set_put_handler(&self, handler: PutHandler<T>) {
        *self.put_handler.write() = Some(handler);
    }
}

async fn wait_until_proceeds(mut rx: watch::Receiver<bool>) -> DaqResult<()> {
    rx.wait_for(|proceeds| *proceeds)
        .await
        .map(|_| ())
        .map_err(|_| DaqError::Signal("put completion channel closed".into()))
}

#[async_trait]
impl<T: SignalValue> SignalBackend<T> for SimSignalBackend<T> {
    fn source(&self) -> String {
        format!("sim://{}", self.read_pv)
    }

    async fn connect(&self, _timeout: Duration) -> DaqResult<()> {
        Ok(())
    }

    async fn put(&self, value: T, wait: bool) -> DaqResult<()> {
        if self.write_pv.is_none() {
            return Err(DaqError::Signal(format!("{} is read-only", self.read_pv)));
        }
        // The handler is invoked before the value is published, so whatever it
        // does synchronously is visible to anyone woken by the new value
        let handled = self.put_handler.read().clone().map(|handler| handler(value.clone()));
        self.value.send_replace(value);

        let proceeds = self.put_proceeds.subscribe();
        let completion = async move {
            if let Some(handled) = handled {
                handled.await?;
            }
            wait_until_proceeds(proceeds).await
        };

        if wait {
            completion.await
        } else {
            let pv = self.read_pv.clone();
            tokio::spawn(async move {
                if let Err(e) = completion.await {
                    tracing::warn!(pv = %pv, error = %e, "unwaited sim put failed");
                }
            });
            Ok(())
        }
    }

    async fn get_value(&self) -> DaqResult<T> {
        Ok(self.value.borrow().clone())
    }

    fn subscribe(&self) -> watch::Receiver<T> {
        self.value.subscribe()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Factory producing [`SimSignalBackend`]s with `sim://` sources.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimBackendFactory;

impl BackendFactory for SimBackendFactory {
    fn backend<T: SignalValue>(
        &self,
        read_pv: &str,
        write_pv: Option<&str>,
    ) -> Arc<dyn SignalBackend<T>> {
        Arc::new(SimSignalBackend::<T>::new(
            read_pv,
            write_pv.map(str::to_string),
        ))
    }
}

/// The simulated backend behind a signal, if it has one.
pub fn sim_backend<T: SignalValue>(signal: &SignalR<T>) -> DaqResult<&SimSignalBackend<T>> {
    signal
        .backend()
        .as_any()
        .downcast_ref::<SimSignalBackend<T>>()
        .ok_or_else(|| DaqError::Signal(format!("{} is not a simulated signal", signal.name())))
}

/// Set the simulated readback of a signal.
pub fn set_sim_value<T: SignalValue>(signal: impl AsRef<SignalR<T>>, value: T) -> DaqResult<()> {
    sim_backend(signal.as_ref())?.set_value(value);
    Ok(())
}

/// Allow or hold back completion of waited puts on a simulated signal.
pub fn set_sim_put_proceeds<T: SignalValue>(
    signal: impl AsRef<SignalR<T>>,
    proceeds: bool,
) -> DaqResult<()> {
    sim_backend(signal.as_ref())?.set_put_proceeds(proceeds);
    Ok(())
}

/// Install a hardware-side put callback on a simulated signal.
pub fn set_sim_put_handler<T, F>(signal: impl AsRef<SignalR<T>>, handler: F) -> DaqResult<()>
where
    T: SignalValue,
    F: Fn(T) -> BoxFuture<'static, DaqResult<()>> + Send + Sync + 'static,
{
    sim_backend(signal.as_ref())?.set_put_handler(Arc::new(handler));
    Ok(())
}
