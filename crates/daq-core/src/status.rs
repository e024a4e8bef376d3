//! Single-shot completion handles.
//!
//! A [`Status`] is produced once by whatever watches for a hardware
//! acknowledgement (usually a put-completion) and consumed once by the
//! lifecycle step that needs it. The watched work starts running as soon as
//! the status is created, so a status can be stashed during `stage()` and
//! awaited much later in `unstage()`.
//!
//! ```rust,ignore
//! let status = signal.set(true, None);
//! // ... other work while the put is in flight ...
//! status.await?;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::task::JoinHandle;

use crate::error::{DaqError, DaqResult};

/// A running operation whose completion can be awaited exactly once.
///
/// `Status` is a `Future` taken by value, so the borrow checker guarantees a
/// single consumer. Dropping it does not stop the underlying operation; use
/// [`Status::cancel`] for that.
#[derive(Debug)]
pub struct Status {
    name: String,
    handle: JoinHandle<DaqResult<()>>,
}

impl Status {
    /// Start `operation` on the runtime and return a handle to its completion.
    pub fn spawn<F>(name: impl Into<String>, operation: F) -> Self
    where
        F: Future<Output = DaqResult<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            handle: tokio::spawn(operation),
        }
    }

    /// Name of the operation this status tracks.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the operation has finished (successfully or not).
    pub fn done(&self) -> bool {
        self.handle.is_finished()
    }

    /// Abort the operation. Awaiting afterwards yields `DaqError::Cancelled`.
    pub fn cancel(&self) {
        self.handle.abort();
    }
}

impl Future for Status {
    type Output = DaqResult<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.handle).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(err)) if err.is_cancelled() => {
                Poll::Ready(Err(DaqError::Cancelled(this.name.clone())))
            }
            Poll::Ready(Err(err)) => Poll::Ready(Err(DaqError::Signal(format!(
                "{} task failed: {}",
                this.name, err
            )))),
        }
    }
}
