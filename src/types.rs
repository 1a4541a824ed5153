use crate::{Result, SmartCamError};
use std::fmt;
use std::io::{self, Write};

/// Remote camera address. Validated once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Build an endpoint from an already-typed port. Port 0 is rejected.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Endpoint> {
        let host = host.into().trim().to_string();
        if host.is_empty() {
            return Err(SmartCamError::InvalidEndpoint("host is empty".into()));
        }
        if port == 0 {
            return Err(SmartCamError::InvalidPort(port.to_string()));
        }
        Ok(Endpoint { host, port })
    }

    /// Build an endpoint from the textual host and port a user typed in.
    pub fn parse(host: &str, port: &str) -> Result<Endpoint> {
        let port_text = port.trim();
        let port = port_text
            .parse::<u16>()
            .map_err(|_| SmartCamError::InvalidPort(port_text.to_string()))?;
        Endpoint::new(host, port)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Category of a transport error attached to `Waiting` and `Failed`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CauseKind {
    /// Peer actively refused the connection.
    Refused = 0,
    /// No route to the host or network.
    Unreachable = 1,
    /// Connect or read deadline elapsed.
    TimedOut = 2,
    /// Host name did not resolve to any address.
    Resolve = 3,
    /// Connection reset or aborted by the peer.
    Reset = 4,
    /// Any other I/O failure.
    Io = 5,
}

impl CauseKind {
    pub fn from_io(err: &io::Error) -> CauseKind {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => CauseKind::Refused,
            io::ErrorKind::NetworkUnreachable | io::ErrorKind::HostUnreachable => {
                CauseKind::Unreachable
            }
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => CauseKind::TimedOut,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => CauseKind::Reset,
            _ => CauseKind::Io,
        }
    }

    /// Whether a connect attempt failing with this cause should be retried.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            CauseKind::Refused | CauseKind::Unreachable | CauseKind::TimedOut | CauseKind::Reset
        )
    }
}

/// Structured reason attached to `Waiting` and `Failed` states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCause {
    pub kind: CauseKind,
    pub message: String,
}

impl ErrorCause {
    pub fn new(kind: CauseKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&io::Error> for ErrorCause {
    fn from(err: &io::Error) -> Self {
        ErrorCause::new(CauseKind::from_io(err), err.to_string())
    }
}

impl fmt::Display for ErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Application-level connection state reported to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Setup,
    Preparing,
    /// Transient connect failure; the transport retries on its own.
    Waiting(ErrorCause),
    Ready,
    /// Terminal.
    Failed(ErrorCause),
    /// Terminal.
    Cancelled,
}

impl ConnectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Failed(_) | ConnectionState::Cancelled)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::Setup => "setup",
            ConnectionState::Preparing => "preparing",
            ConnectionState::Waiting(_) => "waiting",
            ConnectionState::Ready => "ready",
            ConnectionState::Failed(_) => "failed",
            ConnectionState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Waiting(cause) | ConnectionState::Failed(cause) => {
                write!(f, "{} ({})", self.name(), cause)
            }
            _ => f.write_str(self.name()),
        }
    }
}

/// Size of one image in pixels. Both images of a frame share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    width: u32,
    height: u32,
}

impl Dimensions {
    /// 320x320, the resolution the SmartCam firmware streams.
    pub const DEFAULT: Dimensions = Dimensions {
        width: 320,
        height: 320,
    };

    /// Validates that both sides are nonzero and the frame length fits in `usize`.
    pub fn new(width: u32, height: u32) -> Result<Dimensions> {
        if width == 0 || height == 0 {
            return Err(SmartCamError::InvalidConfig(format!(
                "image dimensions must be nonzero, got {}x{}",
                width, height
            )));
        }
        (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(2))
            .ok_or_else(|| {
                SmartCamError::InvalidConfig(format!("frame size {}x{}x2 overflows", width, height))
            })?;
        Ok(Dimensions { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes in one 8-bit single-channel image.
    pub fn image_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Bytes in one frame: left image followed by right image.
    pub fn frame_len(&self) -> usize {
        self.image_len() * 2
    }
}

impl Default for Dimensions {
    fn default() -> Self {
        Dimensions::DEFAULT
    }
}

/// Which half of a stereo frame.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left = 0,
    Right = 1,
}

/// One complete frame: two grayscale images packed back-to-back.
///
/// A `StereoFrame` always holds exactly `dimensions.frame_len()` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StereoFrame {
    data: Vec<u8>,
    dimensions: Dimensions,
    sequence: u64,
}

impl StereoFrame {
    pub fn new(data: Vec<u8>, dimensions: Dimensions, sequence: u64) -> Result<StereoFrame> {
        if data.len() != dimensions.frame_len() {
            return Err(SmartCamError::FrameLength {
                expected: dimensions.frame_len(),
                actual: data.len(),
            });
        }
        Ok(StereoFrame {
            data,
            dimensions,
            sequence,
        })
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn width(&self) -> u32 {
        self.dimensions.width
    }

    pub fn height(&self) -> u32 {
        self.dimensions.height
    }

    /// Zero-based index of this frame within its connection.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn left(&self) -> &[u8] {
        &self.data[..self.dimensions.image_len()]
    }

    pub fn right(&self) -> &[u8] {
        &self.data[self.dimensions.image_len()..]
    }

    pub fn image(&self, side: Side) -> &[u8] {
        match side {
            Side::Left => self.left(),
            Side::Right => self.right(),
        }
    }

    /// The raw frame as received from the wire.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Split into owned (left, right) image buffers.
    pub fn into_images(mut self) -> (Vec<u8>, Vec<u8>) {
        let right = self.data.split_off(self.dimensions.image_len());
        (self.data, right)
    }

    /// Write one image as a binary PGM (P5).
    pub fn write_pgm<W: Write>(&self, side: Side, mut out: W) -> io::Result<()> {
        write!(out, "P5\n{} {}\n255\n", self.width(), self.height())?;
        out.write_all(self.image(side))?;
        out.flush()
    }
}
