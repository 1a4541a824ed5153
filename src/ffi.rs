//! C FFI layer for smartcam.
//!
//! Provides an opaque handle-based API for native viewer front ends.
//! The generated C header is written to `include/smartcam.h` by cbindgen.
//!
//! Callbacks run on the client's session thread. A front end with a UI
//! thread must hop to it inside the callback.

use crate::config::{ClientConfig, ReadFailurePolicy};
use crate::controller::Controller;
use crate::error::LastError;
use crate::sink::FrameSink;
use crate::types::{ConnectionState, Endpoint, StereoFrame};
use crate::SmartCamError;
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::sync::Arc;

static LAST_ERROR: LastError = LastError::new();

/// Opaque client handle for C consumers.
pub struct ScClient {
    endpoint: Endpoint,
    config: ClientConfig,
    on_state: ScStateCallback,
    on_frame: ScFrameCallback,
    user_data: UserData,
    /// Built by `sc_client_start` from the settings above.
    controller: Option<Controller>,
}

/// Connection state in C-compatible layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScState {
    Setup = 0,
    Preparing = 1,
    Waiting = 2,
    Ready = 3,
    Failed = 4,
    Cancelled = 5,
}

/// A received stereo frame. Pointers are valid only during the callback.
#[repr(C)]
pub struct ScFrame {
    /// Left image, `image_len` bytes, row-major 8-bit grayscale.
    pub left: *const u8,
    /// Right image, `image_len` bytes.
    pub right: *const u8,
    pub image_len: usize,
    pub width: u32,
    pub height: u32,
    /// Zero-based frame index within the connection.
    pub sequence: u64,
}

/// Called on every state change. `cause_kind` is -1 and `message` is NULL
/// unless the state is Waiting or Failed.
pub type ScStateCallback = Option<
    unsafe extern "C" fn(user_data: *mut c_void, state: ScState, cause_kind: c_int, message: *const c_char),
>;

/// Called for every complete frame.
pub type ScFrameCallback = Option<unsafe extern "C" fn(user_data: *mut c_void, frame: *const ScFrame)>;

#[derive(Clone, Copy)]
struct UserData(*mut c_void);

// The C caller promises `user_data` may be used from the session thread.
unsafe impl Send for UserData {}
unsafe impl Sync for UserData {}

struct CallbackSink {
    on_state: ScStateCallback,
    on_frame: ScFrameCallback,
    user_data: UserData,
}

impl FrameSink for CallbackSink {
    fn on_connection_state(&self, state: ConnectionState) {
        let Some(callback) = self.on_state else {
            return;
        };
        let (code, cause) = match &state {
            ConnectionState::Setup => (ScState::Setup, None),
            ConnectionState::Preparing => (ScState::Preparing, None),
            ConnectionState::Waiting(cause) => (ScState::Waiting, Some(cause)),
            ConnectionState::Ready => (ScState::Ready, None),
            ConnectionState::Failed(cause) => (ScState::Failed, Some(cause)),
            ConnectionState::Cancelled => (ScState::Cancelled, None),
        };
        let kind = cause.map(|c| c.kind as c_int).unwrap_or(-1);
        let message = cause.map(|c| CString::new(c.message.replace('\0', " ")).unwrap_or_default());
        let message_ptr = message
            .as_ref()
            .map(|m| m.as_ptr())
            .unwrap_or(std::ptr::null());

        unsafe { callback(self.user_data.0, code, kind, message_ptr) };
    }

    fn on_frame(&self, frame: StereoFrame) {
        let Some(callback) = self.on_frame else {
            return;
        };
        let out = ScFrame {
            left: frame.left().as_ptr(),
            right: frame.right().as_ptr(),
            image_len: frame.dimensions().image_len(),
            width: frame.width(),
            height: frame.height(),
            sequence: frame.sequence(),
        };
        unsafe { callback(self.user_data.0, &out) };
    }
}

unsafe fn c_str<'a>(ptr: *const c_char, what: &str) -> Result<&'a str, SmartCamError> {
    if ptr.is_null() {
        return Err(SmartCamError::InvalidEndpoint(format!("{} is NULL", what)));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| SmartCamError::InvalidEndpoint(format!("{} is not valid UTF-8", what)))
}

/// Create a client for `host`:`port` (both textual, as typed by a user).
///
/// `width`/`height` of 0 select the default 320x320. Returns NULL on error
/// (check `sc_last_error()`). Callbacks and the read failure policy may be
/// set until `sc_client_start` is called.
///
/// # Safety
/// `host` and `port` must be null-terminated strings or NULL.
#[no_mangle]
pub unsafe extern "C" fn sc_client_new(
    host: *const c_char,
    port: *const c_char,
    width: u32,
    height: u32,
) -> *mut ScClient {
    let result = (|| -> Result<ScClient, SmartCamError> {
        let endpoint = Endpoint::parse(c_str(host, "host")?, c_str(port, "port")?)?;
        let mut config = ClientConfig::default();
        if width != 0 || height != 0 {
            config = config.with_dimensions(width, height)?;
        }
        config.validate()?;
        Ok(ScClient {
            endpoint,
            config,
            on_state: None,
            on_frame: None,
            user_data: UserData(std::ptr::null_mut()),
            controller: None,
        })
    })();

    match result {
        Ok(client) => {
            LAST_ERROR.clear();
            Box::into_raw(Box::new(client))
        }
        Err(e) => {
            LAST_ERROR.set(&e);
            std::ptr::null_mut()
        }
    }
}

/// Install the state and frame callbacks. Either may be NULL. Returns 0 on
/// success, -1 if the client is NULL or already started.
///
/// # Safety
/// `client` must be a pointer returned by `sc_client_new`, or null.
/// `user_data` is passed back verbatim to the callbacks from the session
/// thread.
#[no_mangle]
pub unsafe extern "C" fn sc_client_set_callbacks(
    client: *mut ScClient,
    on_state: ScStateCallback,
    on_frame: ScFrameCallback,
    user_data: *mut c_void,
) -> c_int {
    let Some(client) = unstarted(client) else {
        return -1;
    };
    client.on_state = on_state;
    client.on_frame = on_frame;
    client.user_data = UserData(user_data);
    0
}

/// Choose what a failed read does: 0 = cancel (default), 1 = stall until
/// stopped. Returns 0 on success, -1 on an unknown policy or a NULL or
/// started client.
///
/// # Safety
/// `client` must be a pointer returned by `sc_client_new`, or null.
#[no_mangle]
pub unsafe extern "C" fn sc_client_set_read_failure(client: *mut ScClient, policy: c_int) -> c_int {
    let Some(client) = unstarted(client) else {
        return -1;
    };
    client.config.read_failure_policy = match policy {
        0 => ReadFailurePolicy::Cancel,
        1 => ReadFailurePolicy::Stall,
        other => {
            LAST_ERROR.set(&SmartCamError::InvalidConfig(format!(
                "unknown read failure policy {}",
                other
            )));
            return -1;
        }
    };
    0
}

unsafe fn unstarted<'a>(client: *mut ScClient) -> Option<&'a mut ScClient> {
    if client.is_null() {
        return None;
    }
    let client = &mut *client;
    if client.controller.is_some() {
        LAST_ERROR.set(&SmartCamError::AlreadyStarted);
        return None;
    }
    Some(client)
}

/// Start connecting. Returns 0 on success, -1 on error.
///
/// # Safety
/// `client` must be a pointer returned by `sc_client_new`, or null.
#[no_mangle]
pub unsafe extern "C" fn sc_client_start(client: *mut ScClient) -> c_int {
    if client.is_null() {
        return -1;
    }
    let client = &mut *client;
    if client.controller.is_some() {
        LAST_ERROR.set(&SmartCamError::AlreadyStarted);
        return -1;
    }

    let sink = Arc::new(CallbackSink {
        on_state: client.on_state,
        on_frame: client.on_frame,
        user_data: client.user_data,
    });
    let mut controller = match Controller::new(client.config.clone(), sink) {
        Ok(controller) => controller,
        Err(e) => {
            LAST_ERROR.set(&e);
            return -1;
        }
    };
    match controller.start(client.endpoint.clone()) {
        Ok(()) => {
            client.controller = Some(controller);
            0
        }
        Err(e) => {
            LAST_ERROR.set(&e);
            -1
        }
    }
}

/// Request cancellation without waiting for it.
///
/// # Safety
/// `client` must be a valid client pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn sc_client_stop(client: *const ScClient) {
    if client.is_null() {
        return;
    }
    if let Some(controller) = &(*client).controller {
        controller.stop();
    }
}

/// Last reported state as an `ScState` value, or -1 before the first one.
///
/// # Safety
/// `client` must be a valid client pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn sc_client_state(client: *const ScClient) -> c_int {
    if client.is_null() {
        return -1;
    }
    let state = (*client).controller.as_ref().and_then(|c| c.state());
    match state {
        Some(ConnectionState::Setup) => ScState::Setup as c_int,
        Some(ConnectionState::Preparing) => ScState::Preparing as c_int,
        Some(ConnectionState::Waiting(_)) => ScState::Waiting as c_int,
        Some(ConnectionState::Ready) => ScState::Ready as c_int,
        Some(ConnectionState::Failed(_)) => ScState::Failed as c_int,
        Some(ConnectionState::Cancelled) => ScState::Cancelled as c_int,
        None => -1,
    }
}

/// Stop the client, wait for its session thread and free it.
///
/// # Safety
/// `client` must be a pointer returned by `sc_client_new`, or null. Must not
/// be called from inside a callback of the same client.
#[no_mangle]
pub unsafe extern "C" fn sc_client_free(client: *mut ScClient) {
    if !client.is_null() {
        drop(Box::from_raw(client));
    }
}

/// Get the last error message. Returns NULL if no error.
/// The returned pointer is valid until the next smartcam API call.
#[no_mangle]
pub extern "C" fn sc_last_error() -> *const c_char {
    LAST_ERROR.as_ptr()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CauseKind;
    use std::sync::Mutex;

    #[test]
    fn test_new_rejects_bad_port() {
        let host = CString::new("127.0.0.1").unwrap();
        let port = CString::new("not-a-port").unwrap();
        let client = unsafe {
            sc_client_new(host.as_ptr(), port.as_ptr(), 0, 0)
        };
        assert!(client.is_null());
        let msg = unsafe { CStr::from_ptr(sc_last_error()) };
        assert!(msg.to_str().unwrap().contains("not-a-port"));
    }

    #[test]
    fn test_null_handles_are_ignored() {
        unsafe {
            assert_eq!(sc_client_start(std::ptr::null_mut()), -1);
            assert_eq!(
                sc_client_set_callbacks(std::ptr::null_mut(), None, None, std::ptr::null_mut()),
                -1
            );
            assert_eq!(sc_client_set_read_failure(std::ptr::null_mut(), 0), -1);
            assert_eq!(sc_client_state(std::ptr::null()), -1);
            sc_client_stop(std::ptr::null());
            sc_client_free(std::ptr::null_mut());
        }
    }

    static SEEN: Mutex<Vec<(ScState, c_int)>> = Mutex::new(Vec::new());

    unsafe extern "C" fn record_state(
        _user_data: *mut c_void,
        state: ScState,
        cause_kind: c_int,
        _message: *const c_char,
    ) {
        SEEN.lock().unwrap().push((state, cause_kind));
    }

    #[test]
    fn test_callback_sink_maps_states() {
        let sink = CallbackSink {
            on_state: Some(record_state),
            on_frame: None,
            user_data: UserData(std::ptr::null_mut()),
        };
        sink.on_connection_state(ConnectionState::Ready);
        sink.on_connection_state(ConnectionState::Failed(crate::ErrorCause::new(
            CauseKind::Resolve,
            "no such host",
        )));

        let seen = SEEN.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (ScState::Ready, -1),
                (ScState::Failed, CauseKind::Resolve as c_int)
            ]
        );
    }

    unsafe extern "C" fn collect_state(
        user_data: *mut c_void,
        state: ScState,
        _cause_kind: c_int,
        _message: *const c_char,
    ) {
        let states = &*(user_data as *const Mutex<Vec<ScState>>);
        states.lock().unwrap().push(state);
    }

    #[test]
    fn test_settings_frozen_after_start() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let host = CString::new("127.0.0.1").unwrap();
        let port = CString::new(port.to_string()).unwrap();
        let states: Mutex<Vec<ScState>> = Mutex::new(Vec::new());
        let user_data = &states as *const _ as *mut c_void;

        unsafe {
            let client = sc_client_new(host.as_ptr(), port.as_ptr(), 4, 4);
            assert!(!client.is_null());
            assert_eq!(sc_client_state(client), -1);
            assert_eq!(sc_client_set_read_failure(client, 7), -1);
            assert_eq!(sc_client_set_read_failure(client, 1), 0);
            assert_eq!(
                sc_client_set_callbacks(client, Some(collect_state), None, user_data),
                0
            );

            assert_eq!(sc_client_start(client), 0);
            assert_eq!(sc_client_start(client), -1);
            assert_eq!(sc_client_set_callbacks(client, None, None, std::ptr::null_mut()), -1);
            assert_eq!(sc_client_set_read_failure(client, 0), -1);

            sc_client_stop(client);
            sc_client_free(client);
        }

        let states = states.lock().unwrap();
        assert_eq!(states.first(), Some(&ScState::Setup));
        assert_eq!(states.last(), Some(&ScState::Cancelled));
    }
}
