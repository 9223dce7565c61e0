//! Demonstration of a simulated drive past two speed cameras.
//!
//! This example shows how to:
//! 1. Build a camera catalog
//! 2. Feed positions into a tracking session by hand
//! 3. Receive and dismiss alerts
//! 4. Read session statistics
//!
//! Run with: cargo run --example replay_demo

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use speedcam_sentinel::{
    capability::{AlertDispatcher, TerminalBell},
    catalog::Catalog,
    position::{ManualSource, PositionSample},
    session::TrackingSession,
    NOTICE,
};

const CAMERAS: &str = r#"[
    {"id": 1, "name": "Harbour Rd", "latitude": 51.5000, "longitude": -0.1000, "speed_limit": 30},
    {"id": 2, "name": "Bypass North", "latitude": 51.5040, "longitude": -0.1000, "speed_limit": 50}
]"#;

fn main() {
    println!("Speedcam Sentinel - Replay Demo");
    println!("===============================");
    println!();
    println!("{NOTICE}");
    println!();

    let cameras = match Catalog::from_json(CAMERAS) {
        Ok(catalog) => Arc::new(catalog),
        Err(e) => {
            eprintln!("Error loading catalog: {e}");
            return;
        }
    };

    let source = ManualSource::new();
    let feed = source.feed();
    let mut session = TrackingSession::new(cameras, Box::new(source))
        .with_dispatcher(AlertDispatcher::new(Box::new(TerminalBell::stderr())));

    if let Err(e) = session.start() {
        eprintln!("Error starting session: {e}");
        return;
    }

    // Set up stop flag
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    // Set up Ctrl+C handler
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    println!("Driving north along longitude -0.1000...");
    println!();

    // 0.0005° of latitude is about 56 m
    let mut latitude = 51.4960;
    while running.load(Ordering::SeqCst) && latitude < 51.5080 {
        feed.push(PositionSample::new(latitude, -0.1000, Some(0.0)).with_speed(13.9));

        match session.tick(Duration::from_millis(100)) {
            Some(event) => println!("  ⚠ {}", event.banner()),
            None => println!("  at {latitude:.4}: clear"),
        }

        // Dismiss once we have driven past the active camera
        let passed = session
            .alert_state()
            .active()
            .map(|point| latitude > point.latitude)
            .unwrap_or(false);
        if passed {
            if let Some(point) = session.dismiss() {
                println!("  passed {}, alert dismissed", point.name);
            }
        }

        latitude += 0.0005;
        std::thread::sleep(Duration::from_millis(200));
    }

    session.stop();

    println!();
    println!("{}", session.stats().summary());
}
