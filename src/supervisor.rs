use crate::cancel::CancelToken;
use crate::error::GyroError;
use crate::shared::SharedOrientation;
use crate::transport::{AdapterFactory, TransportAdapter};
use crate::types::ConnectionState;
use crate::Result;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(200);
/// How long one `next_sample` call may block before the loop rechecks cancellation.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
pub struct SupervisorOptions {
    /// Fixed wait after a failed connect or a dropped connection.
    pub retry_delay: Duration,
    pub receive_timeout: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            retry_delay: DEFAULT_RETRY_DELAY,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
        }
    }
}

/// Owns the background network loop that feeds a [`SharedOrientation`].
///
/// At most one loop runs at a time. `restart` cancels and joins the current
/// loop before starting a new one; `stop` on an idle supervisor is a no-op.
pub struct Supervisor {
    factory: AdapterFactory,
    shared: Arc<SharedOrientation>,
    options: SupervisorOptions,
    worker: Option<Worker>,
    generation: AtomicU64,
    active_loops: Arc<AtomicUsize>,
}

struct Worker {
    cancel: CancelToken,
    thread: JoinHandle<()>,
}

impl Supervisor {
    pub fn new(
        factory: AdapterFactory,
        shared: Arc<SharedOrientation>,
        options: SupervisorOptions,
    ) -> Self {
        Self {
            factory,
            shared,
            options,
            worker: None,
            generation: AtomicU64::new(0),
            active_loops: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Start the loop if it is not already running.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        // Reap a loop that exited on its own.
        self.stop();

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let adapter = (self.factory)();
        let cancel = CancelToken::new();
        let ctx = LoopContext {
            shared: self.shared.clone(),
            cancel: cancel.clone(),
            options: self.options,
            active_loops: self.active_loops.clone(),
        };

        let thread = std::thread::Builder::new()
            .name(format!("gyro-{}-{}", adapter.name(), generation))
            .spawn(move || run_loop(adapter, ctx))
            .map_err(|e| GyroError::Thread(format!("Failed to spawn network loop: {}", e)))?;

        self.worker = Some(Worker { cancel, thread });
        Ok(())
    }

    /// Cancel the running loop and wait for it to exit.
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.cancel.cancel();
            if worker.thread.join().is_err() {
                log::error!("Network loop panicked");
            }
            self.shared.set_state(ConnectionState::Disconnected);
        }
    }

    /// Replace the running loop (if any) with a fresh one.
    pub fn restart(&mut self) -> Result<()> {
        log::info!("Restarting network loop");
        self.stop();
        self.start()
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|w| !w.thread.is_finished())
    }

    /// Number of loops started over the supervisor's lifetime.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }

    /// Number of loop threads currently executing.
    pub fn active_loops(&self) -> usize {
        self.active_loops.load(Ordering::Acquire)
    }

    pub fn shared(&self) -> &Arc<SharedOrientation> {
        &self.shared
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

struct LoopContext {
    shared: Arc<SharedOrientation>,
    cancel: CancelToken,
    options: SupervisorOptions,
    active_loops: Arc<AtomicUsize>,
}

struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Connect, receive until the connection drops, wait, repeat, until cancelled.
fn run_loop(mut adapter: Box<dyn TransportAdapter>, ctx: LoopContext) {
    ctx.active_loops.fetch_add(1, Ordering::AcqRel);
    let _guard = ActiveGuard(ctx.active_loops.clone());
    let LoopContext {
        shared,
        cancel,
        options,
        ..
    } = ctx;

    log::info!("{} loop started", adapter.name());
    let mut failures: u64 = 0;

    while !cancel.is_cancelled() {
        shared.set_state(ConnectionState::Connecting);
        match adapter.connect(&cancel) {
            Ok(()) => {
                failures = 0;
                shared.set_state(ConnectionState::Connected);
            }
            Err(GyroError::Cancelled) => break,
            Err(e) => {
                failures += 1;
                shared.set_state(ConnectionState::Disconnected);
                log::warn!(
                    "{} connect failed (attempt {}): {}; retrying in {:?}",
                    adapter.name(),
                    failures,
                    e,
                    options.retry_delay
                );
                if cancel.wait(options.retry_delay) {
                    break;
                }
                continue;
            }
        }

        receive(adapter.as_mut(), &shared, &cancel, &options);

        adapter.close();
        shared.set_state(ConnectionState::Disconnected);
        if cancel.wait(options.retry_delay) {
            break;
        }
        log::info!("{} reconnecting", adapter.name());
    }

    adapter.close();
    shared.set_state(ConnectionState::Disconnected);
    log::info!("{} loop stopped", adapter.name());
}

fn receive(
    adapter: &mut dyn TransportAdapter,
    shared: &SharedOrientation,
    cancel: &CancelToken,
    options: &SupervisorOptions,
) {
    while !cancel.is_cancelled() {
        match adapter.next_sample(options.receive_timeout) {
            Ok(Some(sample)) => {
                shared.publish(sample);
                shared.set_state(ConnectionState::ReceivingData);
            }
            Ok(None) => {
                if !adapter.source_reachable() {
                    shared.set_state(ConnectionState::Connecting);
                }
            }
            Err(GyroError::Cancelled) => return,
            Err(e) => {
                log::warn!("{} receive error: {}", adapter.name(), e);
                return;
            }
        }

        if let Some(cadence) = adapter.cadence() {
            if cancel.wait(cadence) {
                return;
            }
        }
    }
}
