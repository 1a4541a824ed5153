//! # smartcam - client SDK for SmartCam stereo cameras
//!
//! Maintains one TCP connection to a SmartCam device and streams its stereo
//! frames. Provides:
//! - Connection lifecycle reporting (`Setup` through `Ready`, then `Failed`
//!   or `Cancelled`)
//! - The one-byte poll handshake with a fixed backoff while no frame is ready
//! - Exact-length frame receive, split into left and right grayscale images
//! - C FFI for native viewer front ends
//!
//! ## Quick Start
//! ```no_run
//! use smartcam::{event_channel, ClientConfig, Controller, Endpoint, Event};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let (sink, events) = event_channel(16);
//! let mut client = Controller::new(ClientConfig::default(), Arc::new(sink)).unwrap();
//! client.start(Endpoint::parse("192.168.4.1", "5000").unwrap()).unwrap();
//!
//! for _ in 0..100 {
//!     match events.recv_timeout(Duration::from_secs(5)).unwrap() {
//!         Event::State(state) => println!("state: {}", state),
//!         Event::Frame(frame) => println!("frame {} ({} bytes left)", frame.sequence(), frame.left().len()),
//!     }
//! }
//! client.stop();
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod protocol;
pub mod transport;
pub mod sink;
mod session;
pub mod controller;
pub mod ffi;

pub use config::{ClientConfig, ReadFailurePolicy};
pub use controller::Controller;
pub use error::SmartCamError;
pub use sink::{
    dispatch_queue, event_channel, ChannelSink, DispatchQueue, Dispatcher, Event, EventStream,
    FrameSink, InlineDispatcher, QueueDispatcher,
};
pub use types::*;

/// Result type alias for smartcam operations.
pub type Result<T> = std::result::Result<T, SmartCamError>;
