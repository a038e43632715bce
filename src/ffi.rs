//! C FFI layer for gyro-relay.
//!
//! Provides an opaque handle-based API so a game engine can own a consumer,
//! call `gyro_consumer_tick` from its frame loop and apply the rotation.
//! The generated C header is written to `include/gyro_relay.h` by cbindgen.

use crate::config::{ConsumerConfig, TransportConfig};
use crate::consumer::OrientationConsumer;
use crate::error::{GyroError, LastError};
use std::ffi::{c_char, c_int, CStr};

/// Last error message for C consumers.
static LAST_ERROR: LastError = LastError::new();

/// Opaque consumer handle for C consumers.
pub struct GyroConsumer(OrientationConsumer);

/// Smoothed rotation in C-compatible layout.
#[repr(C)]
pub struct GyroRotation {
    /// Quaternion [x, y, z, w].
    pub quaternion: [f32; 4],
    /// Euler angles [x, y, z] in degrees (Z, then X, then Y).
    pub euler_deg: [f32; 3],
    /// False until the first sample has arrived.
    pub has_rotation: bool,
}

/// Latest raw sample in C-compatible layout.
#[repr(C)]
pub struct GyroSample {
    /// Quaternion [x, y, z, w] as received.
    pub quaternion: [f32; 4],
    /// Producer timestamp in milliseconds.
    pub timestamp_ms: i64,
    /// Arrival counter on this consumer, starting at 1.
    pub sequence: u64,
}

unsafe fn c_string(ptr: *const c_char, name: &str) -> Result<String, GyroError> {
    if ptr.is_null() {
        return Err(GyroError::Config(format!("{} is null", name)));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map(str::to_owned)
        .map_err(|_| GyroError::Config(format!("{} is not valid UTF-8", name)))
}

fn into_handle(config: ConsumerConfig) -> *mut GyroConsumer {
    match OrientationConsumer::from_config(&config) {
        Ok(consumer) => {
            LAST_ERROR.clear();
            Box::into_raw(Box::new(GyroConsumer(consumer)))
        }
        Err(e) => {
            LAST_ERROR.set(&e);
            std::ptr::null_mut()
        }
    }
}

/// Create a WebSocket consumer for `ws://host:port/path`. Not started.
/// Returns NULL on error (check gyro_last_error()).
///
/// # Safety
/// `host` and `path` must be valid null-terminated strings, or null.
#[no_mangle]
pub unsafe extern "C" fn gyro_consumer_new_websocket(
    host: *const c_char,
    port: u16,
    path: *const c_char,
) -> *mut GyroConsumer {
    let transport = match (c_string(host, "host"), c_string(path, "path")) {
        (Ok(host), Ok(path)) => TransportConfig::websocket(host, port, path),
        (Err(e), _) | (_, Err(e)) => {
            LAST_ERROR.set(&e);
            return std::ptr::null_mut();
        }
    };
    into_handle(ConsumerConfig {
        transport,
        ..Default::default()
    })
}

/// Create a polling consumer for `url`. `marker` may be NULL for the default
/// `Orientation:` marker. Not started.
/// Returns NULL on error.
///
/// # Safety
/// `url` must be a valid null-terminated string; `marker` must be one or null.
#[no_mangle]
pub unsafe extern "C" fn gyro_consumer_new_poll(
    url: *const c_char,
    marker: *const c_char,
) -> *mut GyroConsumer {
    let url = match c_string(url, "url") {
        Ok(url) => url,
        Err(e) => {
            LAST_ERROR.set(&e);
            return std::ptr::null_mut();
        }
    };

    let mut transport = TransportConfig::http_poll(url);
    if !marker.is_null() {
        match (c_string(marker, "marker"), &mut transport) {
            (Ok(value), TransportConfig::HttpPoll { marker, .. }) => *marker = value,
            (Err(e), _) => {
                LAST_ERROR.set(&e);
                return std::ptr::null_mut();
            }
            _ => {}
        }
    }

    into_handle(ConsumerConfig {
        transport,
        ..Default::default()
    })
}

/// Start the background network loop. Returns 0 on success, -1 on error.
///
/// # Safety
/// `consumer` must be a valid consumer pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn gyro_consumer_start(consumer: *mut GyroConsumer) -> c_int {
    if consumer.is_null() {
        return -1;
    }
    match (*consumer).0.start() {
        Ok(()) => 0,
        Err(e) => {
            LAST_ERROR.set(&e);
            -1
        }
    }
}

/// Cancel any running loop and start a new one. Returns 0 on success, -1 on error.
///
/// # Safety
/// `consumer` must be a valid consumer pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn gyro_consumer_restart(consumer: *mut GyroConsumer) -> c_int {
    if consumer.is_null() {
        return -1;
    }
    match (*consumer).0.restart() {
        Ok(()) => 0,
        Err(e) => {
            LAST_ERROR.set(&e);
            -1
        }
    }
}

/// Stop the background loop and wait for it. No-op if not running.
///
/// # Safety
/// `consumer` must be a valid consumer pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn gyro_consumer_stop(consumer: *mut GyroConsumer) {
    if !consumer.is_null() {
        (*consumer).0.stop();
    }
}

/// Set the smoothing rate (1/s). Returns -1 for negative or non-finite rates.
///
/// # Safety
/// `consumer` must be a valid consumer pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn gyro_consumer_set_smoothing(consumer: *mut GyroConsumer, rate: f32) -> c_int {
    if consumer.is_null() {
        return -1;
    }
    if !rate.is_finite() || rate < 0.0 {
        LAST_ERROR.set(&GyroError::Config(format!(
            "smoothing rate must be non-negative, got {}",
            rate
        )));
        return -1;
    }
    (*consumer).0.filter_mut().set_rate(rate);
    0
}

/// Set the Euler offset in degrees applied on the left of every sample.
/// Returns -1 for a null handle or non-finite angles.
///
/// # Safety
/// `consumer` must be a valid consumer pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn gyro_consumer_set_offset(
    consumer: *mut GyroConsumer,
    x_deg: f32,
    y_deg: f32,
    z_deg: f32,
) -> c_int {
    if consumer.is_null() {
        return -1;
    }
    let degrees = [x_deg, y_deg, z_deg];
    if degrees.iter().any(|d| !d.is_finite()) {
        LAST_ERROR.set(&GyroError::Config(format!(
            "offset angles must be finite, got {:?}",
            degrees
        )));
        return -1;
    }
    (*consumer).0.filter_mut().set_euler_offset_deg(degrees);
    0
}

/// Advance smoothing by `dt` seconds and write the rotation to render.
/// Returns 0 on success, -1 on null arguments. Never blocks on the network.
///
/// # Safety
/// `consumer` and `out` must be valid pointers, or null.
#[no_mangle]
pub unsafe extern "C" fn gyro_consumer_tick(
    consumer: *mut GyroConsumer,
    dt: f32,
    out: *mut GyroRotation,
) -> c_int {
    if consumer.is_null() || out.is_null() {
        return -1;
    }
    let consumer = &mut (*consumer).0;
    let rotation = consumer.tick(dt);

    out.write(GyroRotation {
        quaternion: rotation.to_array(),
        euler_deg: consumer.filter().current_euler_deg().to_array(),
        has_rotation: consumer.has_rotation(),
    });
    0
}

/// Copy the latest raw sample. Returns 0 on success, -1 if none yet.
///
/// # Safety
/// `consumer` and `out` must be valid pointers, or null.
#[no_mangle]
pub unsafe extern "C" fn gyro_consumer_latest_sample(
    consumer: *const GyroConsumer,
    out: *mut GyroSample,
) -> c_int {
    if consumer.is_null() || out.is_null() {
        return -1;
    }
    match (*consumer).0.latest_sample() {
        Some(stamped) => {
            out.write(GyroSample {
                quaternion: stamped.sample.to_xyzw(),
                timestamp_ms: stamped.sample.timestamp_millis,
                sequence: stamped.sequence,
            });
            0
        }
        None => -1,
    }
}

/// Connection state: 0 = disconnected, 1 = connecting, 2 = connected,
/// 3 = receiving data. Returns -1 for a null handle.
///
/// # Safety
/// `consumer` must be a valid consumer pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn gyro_consumer_state(consumer: *const GyroConsumer) -> c_int {
    if consumer.is_null() {
        return -1;
    }
    (*consumer).0.connection_state() as c_int
}

/// Stop the consumer and free its resources.
///
/// # Safety
/// `consumer` must be a pointer returned by a `gyro_consumer_new_*` function, or null.
#[no_mangle]
pub unsafe extern "C" fn gyro_consumer_destroy(consumer: *mut GyroConsumer) {
    if !consumer.is_null() {
        drop(Box::from_raw(consumer));
    }
}

/// Get the last error message. Returns NULL if no error.
/// The returned pointer is valid until the next gyro-relay API call.
#[no_mangle]
pub extern "C" fn gyro_last_error() -> *const c_char {
    LAST_ERROR.as_ptr()
}
