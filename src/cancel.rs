use crate::error::GyroError;
use crate::Result;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cooperative cancellation shared between a supervisor and its worker threads.
///
/// Cancelling drops the internal sender, which wakes every thread blocked in
/// [`CancelToken::wait`] immediately instead of at the end of its delay.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

struct Inner {
    cancelled: AtomicBool,
    signal: Mutex<Option<Sender<()>>>,
    wakeup: Receiver<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (signal, wakeup) = crossbeam_channel::bounded(0);
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                signal: Mutex::new(Some(signal)),
                wakeup,
            }),
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.signal.lock().take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Sleep for `delay` unless cancelled first. Returns `true` if cancelled.
    pub fn wait(&self, delay: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        match self.inner.wakeup.recv_timeout(delay) {
            Err(RecvTimeoutError::Timeout) => self.is_cancelled(),
            Err(RecvTimeoutError::Disconnected) | Ok(()) => true,
        }
    }

    /// Receiver that becomes ready (disconnected) once the token is cancelled.
    ///
    /// Nothing is ever sent on it; use it as a `select!` arm.
    pub fn receiver(&self) -> Receiver<()> {
        self.inner.wakeup.clone()
    }

    /// Run a blocking call on a helper thread and wait for it, or for cancellation.
    ///
    /// On cancellation this returns [`GyroError::Cancelled`] at once. The
    /// helper keeps running until its call ends on its own and its result is
    /// discarded.
    pub fn run<T, F>(&self, name: &str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        if self.is_cancelled() {
            return Err(GyroError::Cancelled);
        }

        let (tx, rx) = crossbeam_channel::bounded(1);
        std::thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                let _ = tx.send(f());
            })
            .map_err(|e| GyroError::Thread(format!("Failed to spawn {}: {}", name, e)))?;

        let wakeup = self.receiver();
        crossbeam_channel::select! {
            recv(rx) -> result => result
                .map_err(|_| GyroError::Thread(format!("{} exited without a result", name))),
            recv(wakeup) -> _ => {
                log::debug!("Abandoning in-flight {}", name);
                Err(GyroError::Cancelled)
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
