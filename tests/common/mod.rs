//! In-process fake SmartCam used by the integration tests.

#![allow(dead_code)]

use smartcam::{ConnectionState, Endpoint, Event, EventStream, StereoFrame};
use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// One scripted camera action.
#[derive(Debug, Clone)]
pub enum Step {
    /// Read one poll request byte.
    ExpectPoll,
    /// Write one poll response byte.
    Reply(u8),
    /// Write raw bytes.
    Send(Vec<u8>),
    /// Write bytes in chunks with a pause between them.
    SendChunked(Vec<u8>, usize, Duration),
    Sleep(Duration),
    /// Close the connection.
    Close,
    /// Read until the client closes the connection.
    WaitForClose,
}

/// What the fake camera observed.
#[derive(Debug, Default)]
pub struct Transcript {
    /// (arrival time, byte) of every poll request.
    pub polls: Vec<(Instant, u8)>,
    /// Time each `Reply` was written.
    pub replies: Vec<Instant>,
    /// Whether `WaitForClose` saw the client hang up.
    pub client_closed: bool,
}

pub struct FakeCamera {
    pub endpoint: Endpoint,
    handle: JoinHandle<Transcript>,
}

impl FakeCamera {
    pub fn spawn(script: Vec<Step>) -> FakeCamera {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = std::thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut transcript = Transcript::default();

            for step in script {
                match step {
                    Step::ExpectPoll => {
                        let mut byte = [0u8; 1];
                        if sock.read_exact(&mut byte).is_err() {
                            break;
                        }
                        transcript.polls.push((Instant::now(), byte[0]));
                    }
                    Step::Reply(byte) => {
                        if sock.write_all(&[byte]).is_err() {
                            break;
                        }
                        transcript.replies.push(Instant::now());
                    }
                    Step::Send(bytes) => {
                        if sock.write_all(&bytes).is_err() {
                            break;
                        }
                    }
                    Step::SendChunked(bytes, chunk, pause) => {
                        for part in bytes.chunks(chunk) {
                            if sock.write_all(part).is_err() {
                                break;
                            }
                            std::thread::sleep(pause);
                        }
                    }
                    Step::Sleep(d) => std::thread::sleep(d),
                    Step::Close => {
                        let _ = sock.shutdown(Shutdown::Both);
                        break;
                    }
                    Step::WaitForClose => {
                        let mut buf = [0u8; 64];
                        loop {
                            match sock.read(&mut buf) {
                                Ok(0) | Err(_) => break,
                                Ok(_) => {}
                            }
                        }
                        transcript.client_closed = true;
                    }
                }
            }
            transcript
        });

        FakeCamera {
            endpoint: Endpoint::new("127.0.0.1", port).unwrap(),
            handle,
        }
    }

    pub fn join(self) -> Transcript {
        self.handle.join().unwrap()
    }
}

/// A port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub const WAIT: Duration = Duration::from_secs(5);

/// Receive events until `pred` matches a state, returning everything seen.
pub fn collect_until<F>(events: &EventStream, pred: F) -> Vec<Event>
where
    F: Fn(&ConnectionState) -> bool,
{
    let mut seen = Vec::new();
    loop {
        let event = events
            .recv_timeout(WAIT)
            .unwrap_or_else(|e| panic!("no event after {:?}: {} (seen {:?})", WAIT, e, names(&seen)));
        let done = matches!(&event, Event::State(state) if pred(state));
        seen.push(event);
        if done {
            return seen;
        }
    }
}

pub fn states(events: &[Event]) -> Vec<ConnectionState> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::State(state) => Some(state.clone()),
            Event::Frame(_) => None,
        })
        .collect()
}

pub fn frames(events: &[Event]) -> Vec<StereoFrame> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Frame(frame) => Some(frame.clone()),
            Event::State(_) => None,
        })
        .collect()
}

pub fn names(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .map(|e| match e {
            Event::State(state) => state.name().to_string(),
            Event::Frame(frame) => format!("frame#{}", frame.sequence()),
        })
        .collect()
}

/// Deterministic, position-dependent test pattern.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}
