use crate::cancel::CancelToken;
use crate::types::OrientationSample;
use crate::Result;
use std::time::Duration;

/// A source of orientation samples driven by the supervisor loop.
///
/// Implementations do their own I/O but never retry or sleep between
/// cycles: the supervisor owns scheduling, backoff and cancellation.
pub trait TransportAdapter: Send {
    /// Short name for log lines.
    fn name(&self) -> &str;

    /// Establish the connection. Called again after every failure.
    fn connect(&mut self, cancel: &CancelToken) -> Result<()>;

    /// Wait up to `timeout` for the next sample.
    ///
    /// `Ok(None)` means "nothing this cycle" (timeout, ignored message,
    /// unparsable page). `Err` means the connection is gone and the
    /// supervisor should close and reconnect.
    fn next_sample(&mut self, timeout: Duration) -> Result<Option<OrientationSample>>;

    /// Release the connection. Must not fail if already broken.
    fn close(&mut self);

    /// Fixed delay the supervisor inserts after every `next_sample` call.
    /// `None` for push transports that block in `next_sample` instead.
    fn cadence(&self) -> Option<Duration> {
        None
    }

    /// False while the source is failing without the connection being lost,
    /// e.g. a polled page that keeps returning errors.
    fn source_reachable(&self) -> bool {
        true
    }
}

/// Builds a fresh adapter each time a supervisor loop is (re)started.
pub type AdapterFactory = std::sync::Arc<dyn Fn() -> Box<dyn TransportAdapter> + Send + Sync>;

/// Log level for per-cycle diagnostics: promoted when the user asked for verbose output.
pub(crate) fn diagnostic_level(verbose: bool) -> log::Level {
    if verbose {
        log::Level::Warn
    } else {
        log::Level::Debug
    }
}
