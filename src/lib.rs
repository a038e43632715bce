//! # gyro-relay - phone orientation relay and smoothed camera rotation
//!
//! Moves device-orientation quaternions from a phone browser to a renderer.
//! Provides:
//! - A relay server that fans every WebSocket message out to all peers and
//!   serves the phone controller page
//! - Consumers that receive samples over WebSocket or by polling a page and
//!   scraping `Orientation: [x, y, z, w]` out of it
//! - A reconnecting, restartable background loop per consumer
//! - Frame-rate independent exponential slerp smoothing for the render tick
//! - C FFI for integration with game engines
//!
//! ## Quick Start
//! ```no_run
//! use gyro_relay::{ConsumerConfig, OrientationConsumer, TransportConfig};
//! use std::time::Duration;
//!
//! let config = ConsumerConfig {
//!     transport: TransportConfig::websocket("192.168.0.18", 8080, "/ws"),
//!     ..Default::default()
//! };
//! let mut consumer = OrientationConsumer::from_config(&config).unwrap();
//! consumer.start().unwrap();
//!
//! loop {
//!     let rotation = consumer.tick(1.0 / 60.0);
//!     println!("{:?} {}", rotation, consumer.connection_state());
//!     std::thread::sleep(Duration::from_millis(16));
//! }
//! ```

pub mod error;
pub mod types;
pub mod message;
pub mod scrape;
pub mod cancel;
pub mod shared;
pub mod transport;
pub mod websocket;
pub mod poll;
pub mod supervisor;
pub mod filter;
pub mod consumer;
pub mod config;
pub mod relay;
pub mod server;
mod static_files;
pub mod ffi;

pub use error::{DecodeError, GyroError};
pub use types::*;
pub use cancel::CancelToken;
pub use shared::{SharedOrientation, Stamped};
pub use transport::{AdapterFactory, TransportAdapter};
pub use websocket::WebSocketAdapter;
pub use poll::HttpPollAdapter;
pub use supervisor::{Supervisor, SupervisorOptions};
pub use filter::OrientationFilter;
pub use consumer::OrientationConsumer;
pub use config::{ConsumerConfig, RelayConfig, TransportConfig};
pub use relay::{Broadcaster, PeerHandle, RelayStats};
pub use server::RelayServer;

/// Result type alias for gyro-relay operations.
pub type Result<T> = std::result::Result<T, GyroError>;
