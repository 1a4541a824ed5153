use std::fmt;

/// Errors returned by the smartcam client API.
///
/// Runtime network conditions are never returned through this type once a
/// session is running; they surface as [`crate::ConnectionState`]
/// notifications instead.
#[derive(Debug, thiserror::Error)]
pub enum SmartCamError {
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Invalid port {0:?}: expected a number in 1..=65535")]
    InvalidPort(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Frame length mismatch: expected {expected} bytes, got {actual}")]
    FrameLength { expected: usize, actual: usize },

    #[error("Client already started")]
    AlreadyStarted,

    #[error("Failed to spawn session thread: {0}")]
    Spawn(String),

    #[error("Event stream stopped")]
    StreamStopped,

    #[error("Timeout waiting for event")]
    Timeout,
}

/// Thread-safe last-error storage for the C FFI layer.
pub(crate) struct LastError {
    message: std::sync::Mutex<String>,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            message: std::sync::Mutex::new(String::new()),
        }
    }

    pub fn set(&self, err: &SmartCamError) {
        if let Ok(mut msg) = self.message.lock() {
            *msg = fmt::format(format_args!("{}\0", err));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut msg) = self.message.lock() {
            msg.clear();
        }
    }

    pub fn as_ptr(&self) -> *const std::ffi::c_char {
        match self.message.lock() {
            Ok(msg) if !msg.is_empty() => msg.as_ptr() as *const std::ffi::c_char,
            _ => std::ptr::null(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_error_roundtrip() {
        let last = LastError::new();
        assert!(last.as_ptr().is_null());

        last.set(&SmartCamError::InvalidPort("abc".into()));
        let msg = unsafe { std::ffi::CStr::from_ptr(last.as_ptr()) };
        assert!(msg.to_str().unwrap().contains("abc"));

        last.clear();
        assert!(last.as_ptr().is_null());
    }
}
