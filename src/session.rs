use crate::config::{ClientConfig, ReadFailurePolicy};
use crate::protocol::{FrameOutcome, PollOutcome};
use crate::sink::Notifier;
use crate::transport::TcpTransport;
use crate::types::{ConnectionState, Endpoint, ErrorCause};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::io;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// State shared between a [`crate::Controller`] and its session thread.
pub(crate) struct Shared {
    stop_flag: AtomicBool,
    running: AtomicBool,
    /// Clone of the live socket so `request_stop` can unblock pending I/O.
    socket: Mutex<Option<TcpStream>>,
    state: Mutex<Option<ConnectionState>>,
    stop_tx: Sender<()>,
}

impl Shared {
    pub fn new() -> (Arc<Shared>, Receiver<()>) {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let shared = Arc::new(Shared {
            stop_flag: AtomicBool::new(false),
            running: AtomicBool::new(false),
            socket: Mutex::new(None),
            state: Mutex::new(None),
            stop_tx,
        });
        (shared, stop_rx)
    }

    /// Ask the session to cancel. Safe to call any number of times from
    /// any thread.
    pub fn request_stop(&self) {
        let socket = self.socket.lock().unwrap_or_else(|e| e.into_inner());
        if self.stop_flag.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(sock) = socket.as_ref() {
            let _ = sock.shutdown(Shutdown::Both);
        }
        drop(socket);
        let _ = self.stop_tx.try_send(());
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_flag.load(Ordering::SeqCst)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> Option<ConnectionState> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Publish the socket clone, unless a stop already raced ahead of the
    /// connect. Returns false if the session must tear down.
    fn register_socket(&self, sock: TcpStream) -> bool {
        let mut socket = self.socket.lock().unwrap_or_else(|e| e.into_inner());
        if self.stop_requested() {
            return false;
        }
        *socket = Some(sock);
        true
    }

    fn release_socket(&self) {
        let mut socket = self.socket.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(sock) = socket.take() {
            let _ = sock.shutdown(Shutdown::Both);
        }
    }
}

/// One step of the poll/receive cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    SendPoll,
    RecvPoll,
    Backoff,
    RecvImages,
    Cancel,
}

/// Drives one connection from `Setup` to a terminal state. Runs on the
/// dedicated session thread.
pub(crate) struct Session {
    endpoint: Endpoint,
    config: ClientConfig,
    shared: Arc<Shared>,
    stop_rx: Receiver<()>,
    notifier: Notifier,
    terminated: bool,
    frames: u64,
}

impl Session {
    pub fn new(
        endpoint: Endpoint,
        config: ClientConfig,
        shared: Arc<Shared>,
        stop_rx: Receiver<()>,
        notifier: Notifier,
    ) -> Self {
        Self {
            endpoint,
            config,
            shared,
            stop_rx,
            notifier,
            terminated: false,
            frames: 0,
        }
    }

    pub fn run(mut self) {
        log::info!("Session for {} started", self.endpoint);

        self.emit(ConnectionState::Setup);
        if let Some(transport) = self.connect() {
            self.serve(transport);
        }

        self.shared.release_socket();
        log::info!(
            "Session for {} finished after {} frame(s)",
            self.endpoint,
            self.frames
        );
        self.shared.set_running(false);
    }

    /// Establish the TCP connection, reporting `Preparing` and `Waiting`.
    /// Returns `None` after reporting a terminal state.
    fn connect(&mut self) -> Option<TcpTransport> {
        self.emit(ConnectionState::Preparing);
        let mut failures: u32 = 0;

        loop {
            if self.shared.stop_requested() {
                self.emit(ConnectionState::Cancelled);
                return None;
            }

            match TcpTransport::connect(
                &self.endpoint,
                self.config.connect_timeout,
                self.config.read_timeout,
            ) {
                Ok(transport) => {
                    let registered = match transport.shutdown_handle() {
                        Ok(handle) => self.shared.register_socket(handle),
                        Err(e) => {
                            transport.close();
                            self.emit(ConnectionState::Failed(ErrorCause::from(&e)));
                            return None;
                        }
                    };
                    if !registered {
                        transport.close();
                        self.emit(ConnectionState::Cancelled);
                        return None;
                    }
                    match transport.peer_addr() {
                        Ok(addr) => log::info!("Connected to {} ({})", self.endpoint, addr),
                        Err(_) => log::info!("Connected to {}", self.endpoint),
                    }
                    return Some(transport);
                }
                Err(cause) if cause.kind.is_transient() => {
                    failures += 1;
                    if self
                        .config
                        .max_connect_attempts
                        .is_some_and(|max| failures >= max)
                    {
                        log::warn!(
                            "Giving up on {} after {} attempt(s): {}",
                            self.endpoint,
                            failures,
                            cause
                        );
                        self.emit(ConnectionState::Failed(cause));
                        return None;
                    }
                    log::warn!(
                        "Connection to {} is waiting (attempt {}): {}",
                        self.endpoint,
                        failures,
                        cause
                    );
                    self.emit(ConnectionState::Waiting(cause));
                    if !self.pause(self.config.connect_retry_interval) {
                        self.emit(ConnectionState::Cancelled);
                        return None;
                    }
                }
                Err(cause) => {
                    log::warn!("Connection to {} failed: {}", self.endpoint, cause);
                    self.emit(ConnectionState::Failed(cause));
                    return None;
                }
            }
        }
    }

    /// Report `Ready`, run the poll/receive cycle, then report `Cancelled`.
    fn serve(&mut self, transport: TcpTransport) {
        self.emit(ConnectionState::Ready);
        self.poll_loop(transport);
        self.emit(ConnectionState::Cancelled);
    }

    /// The poll/receive cycle. Returns once the connection must be cancelled.
    fn poll_loop(&mut self, mut transport: TcpTransport) {
        let dims = self.config.dimensions;
        let mut step = Step::SendPoll;

        while step != Step::Cancel {
            if self.shared.stop_requested() {
                log::debug!("Stop requested, leaving poll loop");
                break;
            }

            step = match step {
                Step::SendPoll => match transport.send_poll(self.config.poll_request) {
                    Ok(()) => Step::RecvPoll,
                    Err(e) => {
                        if !self.shared.stop_requested() {
                            log::warn!("Poll send failed: {}", e);
                        }
                        Step::Cancel
                    }
                },
                Step::RecvPoll => match transport.recv_poll() {
                    PollOutcome::NotReady => {
                        log::trace!("No image data ready");
                        Step::Backoff
                    }
                    PollOutcome::Ready => {
                        log::trace!("Image data ready");
                        Step::RecvImages
                    }
                    PollOutcome::Closed => {
                        log::info!("Stream closed while waiting for poll response");
                        Step::Cancel
                    }
                    PollOutcome::Failed(e) => self.read_failed("poll response", e),
                },
                Step::Backoff => {
                    if self.pause(self.config.poll_backoff) {
                        Step::SendPoll
                    } else {
                        Step::Cancel
                    }
                }
                Step::RecvImages => match transport.recv_frame(dims, self.frames) {
                    FrameOutcome::Frame(frame) => {
                        if self.shared.stop_requested() {
                            Step::Cancel
                        } else {
                            log::trace!("Frame {} received", frame.sequence());
                            self.frames += 1;
                            self.notifier.frame(frame);
                            Step::SendPoll
                        }
                    }
                    FrameOutcome::Closed => {
                        log::info!("Stream closed before a full frame arrived");
                        Step::Cancel
                    }
                    FrameOutcome::Failed(e) => self.read_failed("frame", e),
                },
                Step::Cancel => Step::Cancel,
            };
        }

        transport.close();
    }

    fn read_failed(&self, what: &str, err: io::Error) -> Step {
        if self.shared.stop_requested() {
            return Step::Cancel;
        }
        match self.config.read_failure_policy {
            ReadFailurePolicy::Cancel => {
                log::warn!("Receive {} failed: {}", what, err);
            }
            ReadFailurePolicy::Stall => {
                log::warn!(
                    "Receive {} failed: {} (stalled until stop)",
                    what,
                    err
                );
                let _ = self.stop_rx.recv();
            }
        }
        Step::Cancel
    }

    /// Sleep for `duration` unless a stop arrives first. Returns true if
    /// the session should carry on.
    fn pause(&self, duration: Duration) -> bool {
        match self.stop_rx.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => !self.shared.stop_requested(),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    fn emit(&mut self, state: ConnectionState) {
        if self.terminated {
            log::warn!("Dropping {} reported after a terminal state", state);
            return;
        }
        self.terminated = state.is_terminal();
        log::debug!("Connection state: {}", state);
        *self.shared.state.lock().unwrap_or_else(|e| e.into_inner()) = Some(state.clone());
        self.notifier.state(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{FrameSink, InlineDispatcher};
    use crate::types::StereoFrame;
    use std::io::Read;
    use std::net::TcpListener;

    #[derive(Default)]
    struct Recorder {
        states: Mutex<Vec<ConnectionState>>,
        frames: Mutex<u64>,
    }

    impl FrameSink for Recorder {
        fn on_connection_state(&self, state: ConnectionState) {
            self.states.lock().unwrap().push(state);
        }

        fn on_frame(&self, _frame: StereoFrame) {
            *self.frames.lock().unwrap() += 1;
        }
    }

    fn session(endpoint: Endpoint, recorder: Arc<Recorder>) -> Session {
        let (shared, stop_rx) = Shared::new();
        let config = ClientConfig::default()
            .with_dimensions(2, 2)
            .unwrap()
            .with_poll_backoff(Duration::from_millis(10));
        let notifier = Notifier::new(recorder, Arc::new(InlineDispatcher));
        Session::new(endpoint, config, shared, stop_rx, notifier)
    }

    #[test]
    fn test_write_failure_cancels_once() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (mut peer, _) = listener.accept().unwrap();

        let transport = TcpTransport::from_stream(client, None).unwrap();
        transport
            .shutdown_handle()
            .unwrap()
            .shutdown(Shutdown::Write)
            .unwrap();

        let recorder = Arc::new(Recorder::default());
        let endpoint = Endpoint::new("127.0.0.1", addr.port()).unwrap();
        let mut session = session(endpoint, recorder.clone());
        session.serve(transport);
        session.emit(ConnectionState::Cancelled);

        assert_eq!(
            *recorder.states.lock().unwrap(),
            vec![ConnectionState::Ready, ConnectionState::Cancelled]
        );
        assert_eq!(*recorder.frames.lock().unwrap(), 0);

        // No poll byte ever reached the camera.
        let mut buf = [0u8; 8];
        assert_eq!(peer.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_emit_ignores_states_after_terminal() {
        let recorder = Arc::new(Recorder::default());
        let endpoint = Endpoint::new("127.0.0.1", 5000).unwrap();
        let mut session = session(endpoint, recorder.clone());
        session.emit(ConnectionState::Cancelled);
        session.emit(ConnectionState::Ready);
        session.emit(ConnectionState::Cancelled);

        assert_eq!(
            *recorder.states.lock().unwrap(),
            vec![ConnectionState::Cancelled]
        );
        assert_eq!(session.shared.state(), Some(ConnectionState::Cancelled));
    }
}
