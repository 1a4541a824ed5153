//! Stream stereo frames from a SmartCam and print connection progress.
//!
//! Usage: cargo run --example stream -- <host> <port> [dump-dir]
//! With a dump directory, the first frame is written as left.pgm/right.pgm.
//! Press Ctrl+C to stop.

use smartcam::{event_channel, ClientConfig, Controller, Endpoint, Event, Side, SmartCamError};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <host> <port> [dump-dir]", args[0]);
        std::process::exit(2);
    }
    let dump_dir = args.get(3).map(std::path::PathBuf::from);

    let endpoint = match Endpoint::parse(&args[1], &args[2]) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Invalid endpoint: {}", e);
            std::process::exit(2);
        }
    };

    let config = match ClientConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    let (sink, events) = event_channel(8);
    let mut client = match Controller::new(config, Arc::new(sink)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to create client: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = client.start(endpoint.clone()) {
        eprintln!("Failed to start client: {}", e);
        std::process::exit(1);
    }

    println!("Connecting to {} (Ctrl+C to stop)...", endpoint);

    let mut start = Instant::now();
    let mut count: u64 = 0;
    let mut last_report = Instant::now();

    loop {
        match events.recv_timeout(Duration::from_secs(10)) {
            Ok(Event::State(state)) => {
                println!("state: {}", state);
                if state == smartcam::ConnectionState::Ready {
                    start = Instant::now();
                }
                if state.is_terminal() {
                    break;
                }
            }
            Ok(Event::Frame(frame)) => {
                count += 1;

                if count == 1 {
                    if let Some(dir) = &dump_dir {
                        for (side, name) in [(Side::Left, "left.pgm"), (Side::Right, "right.pgm")] {
                            let path = dir.join(name);
                            let result = std::fs::File::create(&path)
                                .and_then(|f| frame.write_pgm(side, std::io::BufWriter::new(f)));
                            match result {
                                Ok(()) => println!("wrote {}", path.display()),
                                Err(e) => eprintln!("Failed to write {}: {}", path.display(), e),
                            }
                        }
                    }
                }

                // Report rate every 3 seconds
                let now = Instant::now();
                if now.duration_since(last_report) >= Duration::from_secs(3) {
                    let elapsed = start.elapsed().as_secs_f64();
                    println!(
                        "--- {} frames ({}x{}) in {:.1}s ({:.1} fps) ---",
                        count,
                        frame.width(),
                        frame.height(),
                        elapsed,
                        count as f64 / elapsed
                    );
                    last_report = now;
                }
            }
            Err(SmartCamError::Timeout) => {
                eprintln!("No events for 10s, still {:?}", client.state().map(|s| s.name()));
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        }
    }

    client.stop();
    client.join();
    println!("\nTotal: {} frames", count);
}
