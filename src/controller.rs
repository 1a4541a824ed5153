use crate::config::ClientConfig;
use crate::session::{Session, Shared};
use crate::sink::{Dispatcher, FrameSink, InlineDispatcher, Notifier};
use crate::types::{ConnectionState, Endpoint};
use crate::{Result, SmartCamError};
use crossbeam_channel::Receiver;
use std::sync::Arc;

/// Owns one camera connection for its whole lifetime.
///
/// `start` spawns a background session thread that connects, then polls the
/// camera and delivers frames to the sink until `stop` is called or the
/// connection ends. A controller is single-use: after `Failed` or
/// `Cancelled`, build a new one to reconnect.
pub struct Controller {
    config: ClientConfig,
    notifier: Notifier,
    shared: Arc<Shared>,
    stop_rx: Receiver<()>,
    endpoint: Option<Endpoint>,
    thread: Option<std::thread::JoinHandle<()>>,
    /// Set by the first `start` and never cleared.
    started: bool,
}

impl Controller {
    /// Create a controller whose notifications run on the session thread.
    pub fn new(config: ClientConfig, sink: Arc<dyn FrameSink>) -> Result<Controller> {
        Controller::with_dispatcher(config, sink, Arc::new(InlineDispatcher))
    }

    /// Create a controller whose notifications are posted through
    /// `dispatcher`, e.g. a [`crate::QueueDispatcher`] drained by a UI loop.
    pub fn with_dispatcher(
        config: ClientConfig,
        sink: Arc<dyn FrameSink>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Controller> {
        config.validate()?;
        let (shared, stop_rx) = Shared::new();

        Ok(Controller {
            config,
            notifier: Notifier::new(sink, dispatcher),
            shared,
            stop_rx,
            endpoint: None,
            thread: None,
            started: false,
        })
    }

    /// Begin connecting to `endpoint`. Returns without waiting for the
    /// connection; progress is reported through the sink.
    ///
    /// Only the first call starts a session. Any later call, including one
    /// made after the session ended and was joined, returns
    /// [`SmartCamError::AlreadyStarted`].
    pub fn start(&mut self, endpoint: Endpoint) -> Result<()> {
        if self.started {
            return Err(SmartCamError::AlreadyStarted);
        }

        log::info!(
            "Starting SmartCam client for {} ({}x{} frames)",
            endpoint,
            self.config.dimensions.width(),
            self.config.dimensions.height()
        );

        let session = Session::new(
            endpoint.clone(),
            self.config.clone(),
            self.shared.clone(),
            self.stop_rx.clone(),
            self.notifier.clone(),
        );

        self.shared.set_running(true);
        let thread = std::thread::Builder::new()
            .name("smartcam-session".into())
            .spawn(move || session.run())
            .map_err(|e| {
                self.shared.set_running(false);
                SmartCamError::Spawn(e.to_string())
            })?;

        self.started = true;
        self.endpoint = Some(endpoint);
        self.thread = Some(thread);
        Ok(())
    }

    /// Request cancellation. Idempotent and non-blocking; `Cancelled` is
    /// reported once the session has torn the connection down. Does nothing
    /// if the controller was never started.
    ///
    /// A connect attempt already in progress is not interrupted; the session
    /// notices the stop once it returns, which can take up to
    /// `connect_timeout` per resolved address.
    pub fn stop(&self) {
        if !self.started {
            return;
        }
        log::info!("Stopping SmartCam client");
        self.shared.request_stop();
    }

    /// The endpoint passed to `start`, if any.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Last state reported to the sink, or `None` before the session's
    /// first notification.
    pub fn state(&self) -> Option<ConnectionState> {
        self.shared.state()
    }

    /// Check if the session thread is still running.
    pub fn is_active(&self) -> bool {
        self.shared.is_running()
    }

    /// Wait for the session thread to finish. Does not request a stop.
    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("SmartCam session thread panicked");
            }
        }
    }

    fn shutdown(&mut self) {
        self.stop();
        self.join();
    }
}

/// Stops the session and waits for its thread, so dropping a controller
/// mid-connect blocks until the pending connect attempt returns.
impl Drop for Controller {
    fn drop(&mut self) {
        self.shutdown();
    }
}
