use std::fmt;

/// Errors surfaced by the relay, the transports and configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum GyroError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Thread error: {0}")]
    Thread(String),
}

impl From<ureq::Error> for GyroError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, _) => GyroError::HttpStatus(code),
            ureq::Error::Transport(t) => GyroError::Http(t.to_string()),
        }
    }
}

/// Reasons a payload did not yield an orientation sample.
///
/// These never leave the transport adapters: a decode failure just means
/// "no sample this cycle".
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8")]
    NotUtf8,

    #[error("malformed JSON: {0}")]
    Json(String),

    #[error("unexpected message type {0:?}")]
    UnexpectedType(String),

    #[error("expected 4 quaternion components, got {0}")]
    ComponentCount(usize),

    #[error("marker {0:?} not found")]
    MarkerNotFound(String),

    #[error("no bracketed component list after marker")]
    MissingBrackets,

    #[error("component {index} is not a number: {text:?}")]
    InvalidComponent { index: usize, text: String },

    #[error("degenerate quaternion")]
    Degenerate,
}

/// Thread-safe last-error storage for the C FFI layer.
pub(crate) struct LastError {
    message: parking_lot::Mutex<String>,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            message: parking_lot::const_mutex(String::new()),
        }
    }

    pub fn set(&self, err: &GyroError) {
        let mut msg = self.message.lock();
        *msg = fmt::format(format_args!("{}\0", err));
    }

    pub fn clear(&self) {
        self.message.lock().clear();
    }

    pub fn as_ptr(&self) -> *const std::ffi::c_char {
        let msg = self.message.lock();
        if msg.is_empty() {
            std::ptr::null()
        } else {
            msg.as_ptr() as *const std::ffi::c_char
        }
    }
}
