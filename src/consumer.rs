use crate::config::{ConsumerConfig, TransportConfig};
use crate::filter::OrientationFilter;
use crate::poll::HttpPollAdapter;
use crate::shared::{SharedOrientation, Stamped};
use crate::supervisor::{Supervisor, SupervisorOptions};
use crate::transport::{AdapterFactory, TransportAdapter};
use crate::types::ConnectionState;
use crate::websocket::WebSocketAdapter;
use crate::Result;
use glam::Quat;
use std::sync::Arc;
use std::time::Duration;

/// Drives a transport in the background and smooths its samples on demand.
///
/// The network loop only ever writes the latest sample; [`tick`](Self::tick)
/// is called from the render loop, never blocks on I/O and returns the
/// rotation to apply this frame.
pub struct OrientationConsumer {
    supervisor: Supervisor,
    shared: Arc<SharedOrientation>,
    filter: OrientationFilter,
    seen: u64,
}

impl OrientationConsumer {
    /// Build a consumer around any adapter factory. Does not start the loop.
    pub fn new(
        factory: AdapterFactory,
        options: SupervisorOptions,
        filter: OrientationFilter,
    ) -> Self {
        Self::with_shared(factory, options, filter, Arc::new(SharedOrientation::new()))
    }

    fn with_shared(
        factory: AdapterFactory,
        options: SupervisorOptions,
        filter: OrientationFilter,
        shared: Arc<SharedOrientation>,
    ) -> Self {
        Self {
            supervisor: Supervisor::new(factory, shared.clone(), options),
            shared,
            filter,
            seen: 0,
        }
    }

    /// Build a consumer from settings. Does not start the loop.
    pub fn from_config(config: &ConsumerConfig) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new(SharedOrientation::new());
        let factory = adapter_factory(&config.transport, config.verbose, shared.clone());
        let filter = OrientationFilter::new(config.smoothing_rate, config.euler_offset_deg);

        Ok(Self::with_shared(
            factory,
            config.supervisor_options(),
            filter,
            shared,
        ))
    }

    pub fn start(&mut self) -> Result<()> {
        self.supervisor.start()
    }

    /// Cancel any running loop and start exactly one new one.
    pub fn restart(&mut self) -> Result<()> {
        self.supervisor.restart()
    }

    pub fn stop(&mut self) {
        self.supervisor.stop();
    }

    pub fn is_running(&self) -> bool {
        self.supervisor.is_running()
    }

    /// Render tick: pick up the newest sample, if any, and advance the filter.
    pub fn tick(&mut self, dt: f32) -> Quat {
        if let Some(stamped) = self.shared.newer_than(self.seen) {
            self.seen = stamped.sequence;
            self.filter.set_target(&stamped.sample);
        }
        self.filter.tick(dt)
    }

    /// Same as [`tick`](Self::tick) with a `Duration`.
    pub fn tick_duration(&mut self, dt: Duration) -> Quat {
        self.tick(dt.as_secs_f32())
    }

    pub fn rotation(&self) -> Quat {
        self.filter.current()
    }

    /// True once any sample has been applied as a target.
    pub fn has_rotation(&self) -> bool {
        self.filter.has_target()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn latest_sample(&self) -> Option<Stamped> {
        self.shared.latest()
    }

    /// Start of the last polled page body; empty for push transports.
    pub fn last_response_preview(&self) -> String {
        self.shared.response_preview()
    }

    pub fn shared(&self) -> &Arc<SharedOrientation> {
        &self.shared
    }

    pub fn filter(&self) -> &OrientationFilter {
        &self.filter
    }

    pub fn filter_mut(&mut self) -> &mut OrientationFilter {
        &mut self.filter
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }
}

/// Factory producing a fresh adapter for `transport` on every (re)start.
pub fn adapter_factory(
    transport: &TransportConfig,
    verbose: bool,
    shared: Arc<SharedOrientation>,
) -> AdapterFactory {
    match transport.clone() {
        TransportConfig::WebSocket { host, port, path } => Arc::new(move || {
            Box::new(WebSocketAdapter::new(host.clone(), port, path.clone()).with_verbose(verbose))
                as Box<dyn TransportAdapter>
        }),
        TransportConfig::HttpPoll {
            url,
            marker,
            interval_ms,
            request_timeout_ms,
            partial_parse,
        } => Arc::new(move || {
            Box::new(
                HttpPollAdapter::new(url.clone())
                    .with_marker(marker.clone())
                    .with_interval(Duration::from_millis(interval_ms))
                    .with_request_timeout(Duration::from_millis(request_timeout_ms))
                    .with_partial_parse(partial_parse)
                    .with_verbose(verbose)
                    .with_response_preview(shared.clone()),
            ) as Box<dyn TransportAdapter>
        }),
    }
}
