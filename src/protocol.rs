use crate::types::{Dimensions, StereoFrame};
use std::io::{self, Read, Write};
use std::time::Duration;

// -- Poll handshake --
/// Byte the client sends to ask whether a frame is ready.
pub const POLL_REQUEST: u8 = 0x02;
/// Response byte meaning "no frame ready". Any other value means ready.
pub const POLL_NOT_READY: u8 = 0x00;

/// Pause between a "not ready" response and the next poll request.
pub const POLL_BACKOFF: Duration = Duration::from_millis(250);

/// Result of reading the one-byte poll response.
#[derive(Debug)]
pub enum PollOutcome {
    NotReady,
    Ready,
    /// Peer closed the stream before a byte arrived.
    Closed,
    Failed(io::Error),
}

/// Result of reading one frame payload.
#[derive(Debug)]
pub enum FrameOutcome {
    Frame(StereoFrame),
    /// Peer closed the stream before the full frame arrived.
    Closed,
    Failed(io::Error),
}

pub fn is_frame_ready(response: u8) -> bool {
    response != POLL_NOT_READY
}

/// Write the one-byte poll request and flush it.
pub fn send_poll<W: Write>(writer: &mut W, request: u8) -> io::Result<()> {
    writer.write_all(&[request])?;
    writer.flush()
}

/// Read the one-byte poll response.
pub fn recv_poll<R: Read>(reader: &mut R) -> PollOutcome {
    let mut byte = [0u8; 1];
    loop {
        return match reader.read(&mut byte) {
            Ok(0) => PollOutcome::Closed,
            Ok(_) if is_frame_ready(byte[0]) => PollOutcome::Ready,
            Ok(_) => PollOutcome::NotReady,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => PollOutcome::Failed(e),
        };
    }
}

/// Read exactly one frame of `dims.frame_len()` bytes.
///
/// A stream that ends part-way through is reported as `Closed`; the partial
/// bytes are discarded.
pub fn recv_frame<R: Read>(reader: &mut R, dims: Dimensions, sequence: u64) -> FrameOutcome {
    let mut buf = vec![0u8; dims.frame_len()];
    match reader.read_exact(&mut buf) {
        Ok(()) => match StereoFrame::new(buf, dims, sequence) {
            Ok(frame) => FrameOutcome::Frame(frame),
            // read_exact filled the buffer, so the length always matches.
            Err(e) => FrameOutcome::Failed(io::Error::new(io::ErrorKind::InvalidData, e.to_string())),
        },
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => FrameOutcome::Closed,
        Err(e) => FrameOutcome::Failed(e),
    }
}
