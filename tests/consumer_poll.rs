//! HTTP poll consumer against a local page server.

use gyro_relay::{ConnectionState, ConsumerConfig, OrientationConsumer, TransportConfig};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tiny_http::{Response, Server};

/// Serves whatever page is currently set, counting requests.
struct PageServer {
    url: String,
    page: Arc<Mutex<(u16, String)>>,
    hits: Arc<AtomicUsize>,
    delay_ms: Arc<AtomicU64>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl PageServer {
    fn start(status: u16, body: &str) -> PageServer {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let page = Arc::new(Mutex::new((status, body.to_owned())));
        let hits = Arc::new(AtomicUsize::new(0));
        let delay_ms = Arc::new(AtomicU64::new(0));
        let stop = Arc::new(AtomicBool::new(false));

        let thread = {
            let page = page.clone();
            let hits = hits.clone();
            let delay_ms = delay_ms.clone();
            let stop = stop.clone();
            std::thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    let request = match server.recv_timeout(Duration::from_millis(10)) {
                        Ok(Some(request)) => request,
                        Ok(None) => continue,
                        Err(_) => break,
                    };
                    hits.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(delay_ms.load(Ordering::SeqCst)));
                    let (status, body) = page.lock().unwrap().clone();
                    let _ = request.respond(Response::from_string(body).with_status_code(status));
                }
            })
        };

        PageServer {
            url: format!("http://{}/", addr),
            page,
            hits,
            delay_ms,
            stop,
            thread: Some(thread),
        }
    }

    fn set_page(&self, status: u16, body: &str) {
        *self.page.lock().unwrap() = (status, body.to_owned());
    }

    /// Hold every later response for `delay` before answering.
    fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    fn wait_for_hits(&self, extra: usize) {
        let target = self.hits.load(Ordering::SeqCst) + extra;
        wait_until("requests", || self.hits.load(Ordering::SeqCst) >= target);
    }
}

impl Drop for PageServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn poll_consumer(url: &str) -> OrientationConsumer {
    let mut transport = TransportConfig::http_poll(url);
    if let TransportConfig::HttpPoll { interval_ms, .. } = &mut transport {
        *interval_ms = 5;
    }
    let config = ConsumerConfig {
        transport,
        verbose: true,
        ..Default::default()
    };
    OrientationConsumer::from_config(&config).unwrap()
}

#[test]
fn test_scrapes_orientation_from_page() {
    let page = PageServer::start(200, "<p>Orientation: [0.1, 0.2, 0.3, 0.9]</p>");
    let mut consumer = poll_consumer(&page.url);
    consumer.start().unwrap();

    wait_until("sample", || consumer.latest_sample().is_some());
    let [x, y, z, w] = consumer.latest_sample().unwrap().sample.to_xyzw();
    for (got, want) in [(x, 0.1), (y, 0.2), (z, 0.3), (w, 0.9)] {
        assert!((got - want).abs() < 1e-5, "{} != {}", got, want);
    }
    assert_eq!(consumer.connection_state(), ConnectionState::ReceivingData);
    assert!(consumer.last_response_preview().starts_with("<p>Orientation:"));

    consumer.stop();
}

#[test]
fn test_failed_cycles_publish_nothing() {
    let page = PageServer::start(500, "Orientation: [0, 0, 0, 1]");
    let mut consumer = poll_consumer(&page.url);
    consumer.start().unwrap();

    page.wait_for_hits(3);
    assert!(consumer.latest_sample().is_none());

    page.set_page(200, "<html>nothing to see</html>");
    page.wait_for_hits(3);
    assert!(consumer.latest_sample().is_none());
    assert!(consumer.is_running());
    assert_eq!(consumer.last_response_preview(), "<html>nothing to see</html>");

    page.set_page(200, "Orientation: [0, 0, 0, 1]");
    wait_until("recovered sample", || consumer.latest_sample().is_some());

    consumer.stop();
}

#[test]
fn test_long_pages_are_truncated_in_preview() {
    let body = format!("{}Orientation: [0, 0, 0, 1]", "x".repeat(500));
    let page = PageServer::start(200, &body);
    let mut consumer = poll_consumer(&page.url);
    consumer.start().unwrap();

    wait_until("sample", || consumer.latest_sample().is_some());
    let preview = consumer.last_response_preview();
    assert_eq!(preview, format!("{}...", "x".repeat(200)));

    consumer.stop();
}

#[test]
fn test_failing_page_leaves_receiving_state() {
    let page = PageServer::start(200, "Orientation: [0, 0, 0, 1]");
    let mut consumer = poll_consumer(&page.url);
    consumer.start().unwrap();

    wait_until("receiving", || {
        consumer.connection_state() == ConnectionState::ReceivingData
    });

    page.set_page(500, "Internal Server Error");
    wait_until("state to drop", || {
        consumer.connection_state() == ConnectionState::Connecting
    });
    page.wait_for_hits(5);
    assert_eq!(consumer.connection_state(), ConnectionState::Connecting);
    assert!(consumer.is_running());

    page.set_page(200, "Orientation: [0, 0, 0, 1]");
    wait_until("receiving again", || {
        consumer.connection_state() == ConnectionState::ReceivingData
    });

    consumer.stop();
}

#[test]
fn test_stop_does_not_wait_for_slow_page() {
    let page = PageServer::start(200, "Orientation: [0, 0, 0, 1]");
    page.set_delay(Duration::from_millis(1800));

    let mut consumer = poll_consumer(&page.url);
    consumer.start().unwrap();
    page.wait_for_hits(1);
    std::thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    consumer.stop();
    let took = started.elapsed();
    assert!(took < Duration::from_millis(500), "stop took {:?}", took);
    assert!(!consumer.is_running());
    assert_eq!(consumer.connection_state(), ConnectionState::Disconnected);
    assert!(consumer.latest_sample().is_none());
}

#[test]
fn test_restart_does_not_wait_for_slow_page() {
    let page = PageServer::start(200, "Orientation: [0, 0, 0, 1]");
    page.set_delay(Duration::from_millis(1800));

    let mut consumer = poll_consumer(&page.url);
    consumer.start().unwrap();
    page.wait_for_hits(1);

    let started = Instant::now();
    consumer.restart().unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));
    assert!(consumer.supervisor().active_loops() <= 1);
    wait_until("new loop", || consumer.supervisor().active_loops() == 1);

    consumer.stop();
}
