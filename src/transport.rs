use crate::protocol::{self, FrameOutcome, PollOutcome};
use crate::types::{CauseKind, Dimensions, Endpoint, ErrorCause};
use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// TCP transport to the camera. Owns the connected socket; dropping it closes
/// the connection.
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Resolve `endpoint` and try each address in turn.
    ///
    /// The returned cause tells the session whether to keep waiting
    /// (refused, unreachable, timed out, reset) or fail.
    pub fn connect(
        endpoint: &Endpoint,
        timeout: Duration,
        read_timeout: Option<Duration>,
    ) -> std::result::Result<TcpTransport, ErrorCause> {
        let addrs = resolve(endpoint)?;

        let mut last_err: Option<io::Error> = None;
        for addr in &addrs {
            log::debug!("Connecting to {} ({})", endpoint, addr);
            match TcpStream::connect_timeout(addr, timeout) {
                Ok(stream) => {
                    return TcpTransport::from_stream(stream, read_timeout)
                        .map_err(|e| ErrorCause::from(&e));
                }
                Err(e) => {
                    log::debug!("Connect to {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }

        Err(match last_err {
            Some(e) => ErrorCause::from(&e),
            None => ErrorCause::new(CauseKind::Resolve, format!("{} has no addresses", endpoint)),
        })
    }

    pub fn from_stream(stream: TcpStream, read_timeout: Option<Duration>) -> io::Result<Self> {
        // One-byte polls must not sit in Nagle's buffer.
        stream.set_nodelay(true)?;
        stream.set_read_timeout(read_timeout)?;
        Ok(Self { stream })
    }

    /// A second handle to the same socket, used to interrupt blocked I/O
    /// from another thread.
    pub fn shutdown_handle(&self) -> io::Result<TcpStream> {
        self.stream.try_clone()
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    pub fn send_poll(&mut self, request: u8) -> io::Result<()> {
        protocol::send_poll(&mut self.stream, request)
    }

    pub fn recv_poll(&mut self) -> PollOutcome {
        protocol::recv_poll(&mut self.stream)
    }

    pub fn recv_frame(&mut self, dims: Dimensions, sequence: u64) -> FrameOutcome {
        protocol::recv_frame(&mut self.stream, dims, sequence)
    }

    pub fn close(self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

fn resolve(endpoint: &Endpoint) -> std::result::Result<Vec<SocketAddr>, ErrorCause> {
    let addrs: Vec<SocketAddr> = (endpoint.host(), endpoint.port())
        .to_socket_addrs()
        .map_err(|e| ErrorCause::new(CauseKind::Resolve, format!("{}: {}", endpoint, e)))?
        .collect();

    if addrs.is_empty() {
        return Err(ErrorCause::new(
            CauseKind::Resolve,
            format!("{} resolved to no addresses", endpoint),
        ));
    }
    Ok(addrs)
}
