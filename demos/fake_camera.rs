//! Simulated SmartCam for trying the client without hardware.
//!
//! Usage: cargo run --example fake_camera -- [port] [fps]
//! Answers each poll with 0x00 until the next frame is due, then 0x01
//! followed by a 320x320x2 frame of moving gradients.

use smartcam::protocol::{POLL_NOT_READY, POLL_REQUEST};
use smartcam::Dimensions;
use std::io::{Read as _, Write as _};
use std::net::{TcpListener, TcpStream};
use std::time::{Duration, Instant};

const DEFAULT_PORT: u16 = 5000;

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let port = args
        .get(1)
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let fps: f64 = args.get(2).and_then(|f| f.parse().ok()).unwrap_or(5.0);
    let interval = Duration::from_secs_f64(1.0 / fps.max(0.1));

    let listener = TcpListener::bind(("0.0.0.0", port)).unwrap_or_else(|e| {
        eprintln!("Failed to bind port {}: {}", port, e);
        std::process::exit(1);
    });
    eprintln!("[CAM] Listening on port {} ({:.1} fps)", port, fps);

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                eprintln!("[CAM] Accept failed: {}", e);
                continue;
            }
        };
        let peer = stream.peer_addr().map(|a| a.to_string()).unwrap_or_default();
        eprintln!("[CAM] Client {} connected", peer);
        match serve(stream, interval) {
            Ok(frames) => eprintln!("[CAM] Client {} left after {} frames", peer, frames),
            Err(e) => eprintln!("[CAM] Client {} dropped: {}", peer, e),
        }
    }
}

fn serve(mut stream: TcpStream, interval: Duration) -> std::io::Result<u64> {
    stream.set_nodelay(true)?;
    let dims = Dimensions::DEFAULT;
    let mut next_frame = Instant::now();
    let mut frames: u64 = 0;
    let mut request = [0u8; 1];

    loop {
        if stream.read(&mut request)? == 0 {
            return Ok(frames);
        }
        if request[0] != POLL_REQUEST {
            log::warn!("Unexpected request byte 0x{:02x}", request[0]);
        }

        if Instant::now() < next_frame {
            stream.write_all(&[POLL_NOT_READY])?;
            continue;
        }

        stream.write_all(&[0x01])?;
        stream.write_all(&render(dims, frames))?;
        frames += 1;
        next_frame += interval;
    }
}

/// Left: horizontal gradient. Right: vertical gradient. Both scroll with `t`.
fn render(dims: Dimensions, t: u64) -> Vec<u8> {
    let (w, h) = (dims.width() as usize, dims.height() as usize);
    let shift = (t * 4) as usize;
    let mut frame = Vec::with_capacity(dims.frame_len());
    for _y in 0..h {
        for x in 0..w {
            frame.push(((x + shift) % 256) as u8);
        }
    }
    for y in 0..h {
        for _x in 0..w {
            frame.push(((y + shift) % 256) as u8);
        }
    }
    frame
}
