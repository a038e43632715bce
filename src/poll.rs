use crate::cancel::CancelToken;
use crate::error::GyroError;
use crate::scrape;
use crate::shared::SharedOrientation;
use crate::transport::{diagnostic_level, TransportAdapter};
use crate::types::{OrientationSample, PartialParse};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;

/// ~60 Hz, matching the controller page's update rate.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(16);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Poll transport: GET a page and scrape `Orientation: [x, y, z, w]` out of it.
///
/// Every failure (status, DNS, timeout, missing marker) is local to the cycle
/// and yields `Ok(None)`; the connection itself is never considered lost.
/// Fetch failures do mark the source unreachable until the next good response.
/// Requests run on a helper thread so cancellation never waits for them.
pub struct HttpPollAdapter {
    url: String,
    marker: String,
    interval: Duration,
    request_timeout: Duration,
    partial_parse: PartialParse,
    verbose: bool,
    agent: Option<ureq::Agent>,
    cancel: CancelToken,
    reachable: bool,
    previous: [f32; 4],
    preview: Option<Arc<SharedOrientation>>,
}

impl HttpPollAdapter {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            marker: scrape::DEFAULT_MARKER.to_owned(),
            interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            partial_parse: PartialParse::default(),
            verbose: false,
            agent: None,
            cancel: CancelToken::new(),
            reachable: true,
            previous: [0.0, 0.0, 0.0, 1.0],
            preview: None,
        }
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_partial_parse(mut self, policy: PartialParse) -> Self {
        self.partial_parse = policy;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Record the start of every response body in `shared`.
    pub fn with_response_preview(mut self, shared: Arc<SharedOrientation>) -> Self {
        self.preview = Some(shared);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Scrape a sample out of a response body.
    fn extract(&mut self, body: &str) -> Option<OrientationSample> {
        let components =
            match scrape::extract_components(body, &self.marker, self.previous, self.partial_parse)
            {
                Ok(q) => q,
                Err(e) => {
                    log::log!(diagnostic_level(self.verbose), "No orientation in page: {}", e);
                    return None;
                }
            };

        let sample = OrientationSample::from_xyzw(components, 0)?;
        self.previous = components;

        if self.verbose {
            log::info!(
                "Received orientation: [{:.4}, {:.4}, {:.4}, {:.4}]",
                components[0],
                components[1],
                components[2],
                components[3]
            );
        }
        Some(sample)
    }
}

impl TransportAdapter for HttpPollAdapter {
    fn name(&self) -> &str {
        "http-poll"
    }

    fn connect(&mut self, cancel: &CancelToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(GyroError::Cancelled);
        }
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(GyroError::InvalidUrl(self.url.clone()));
        }
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(self.request_timeout)
            .timeout(self.request_timeout)
            .build();
        self.agent = Some(agent);
        self.cancel = cancel.clone();
        self.reachable = true;
        log::info!("Polling {} every {:?}", self.url, self.interval);
        Ok(())
    }

    fn next_sample(&mut self, _timeout: Duration) -> Result<Option<OrientationSample>> {
        let agent = self.agent.clone().ok_or(GyroError::ConnectionClosed)?;
        let url = self.url.clone();

        let fetched = self.cancel.run("gyro-http-fetch", move || fetch(&agent, &url))?;
        let body = match fetched {
            Ok(body) => {
                self.reachable = true;
                body
            }
            Err(e) => {
                self.reachable = false;
                log::log!(
                    diagnostic_level(self.verbose),
                    "Failed to get orientation data from {}: {}",
                    self.url,
                    e
                );
                return Ok(None);
            }
        };

        if let Some(shared) = &self.preview {
            shared.set_response_preview(&body);
        }
        Ok(self.extract(&body))
    }

    fn close(&mut self) {
        self.agent = None;
    }

    fn cadence(&self) -> Option<Duration> {
        Some(self.interval)
    }

    fn source_reachable(&self) -> bool {
        self.reachable
    }
}

fn fetch(agent: &ureq::Agent, url: &str) -> Result<String> {
    let response = agent.get(url).call()?;
    response.into_string().map_err(GyroError::Io)
}
