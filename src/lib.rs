//! Speedcam Sentinel - proximity alerts for fixed speed cameras.
//!
//! This library watches a stream of position fixes and raises an alert when
//! the device comes within range of a known camera while travelling toward
//! it. One alert is active at a time; it stays up until dismissed.
//!
//! # Guarantees
//!
//! - **Local only**: positions are evaluated in memory and never stored or sent
//! - **One alert at a time**: the first trigger wins until it is dismissed
//! - **Best effort outputs**: a failing sound, vibration or wake lock never
//!   stops tracking
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Speedcam Sentinel                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │  Position   │──▶│  Tracking   │──▶│  Evaluator  │       │
//! │  │   Source    │   │  Session    │◀──│  (catalog)  │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │                      │        │                             │
//! │                      ▼        ▼                             │
//! │              ┌───────────┐ ┌─────────────┐                  │
//! │              │ Wake lock │ │ Sound/Haptic│                  │
//! │              └───────────┘ └─────────────┘                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use speedcam_sentinel::{catalog, position, session};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let cameras = Arc::new(catalog::load("cameras.json").expect("catalog"));
//! let source = position::ReplaySource::file("track.jsonl", Duration::from_secs(1));
//!
//! let mut session = session::TrackingSession::new(cameras, Box::new(source));
//! session.start().expect("start tracking");
//!
//! loop {
//!     if let Some(event) = session.tick(Duration::from_millis(100)) {
//!         println!("{}", event.banner());
//!         session.dismiss();
//!     }
//! }
//! ```

pub mod agent;
pub mod capability;
pub mod catalog;
pub mod config;
pub mod core;
pub mod position;
pub mod session;
pub mod stats;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use agent::{Agent, ControlCommand, SharedStatus};
pub use catalog::{Catalog, CatalogError, GeoPoint};
pub use config::{AlertConfig, Config, ConfigError};
pub use core::{AlertEvent, AlertState, SelectionPolicy, Thresholds};
pub use position::{PositionSample, PositionSource, SourceError, SourceEvent, Subscription};
pub use session::{SessionError, SessionState, SessionStatus, TrackingSession, Visibility};
pub use stats::{SessionStats, SharedStats};

#[cfg(feature = "remote")]
pub use catalog::{BlockingCatalogClient, CatalogClient};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Notice shown to users before they rely on the alerts.
pub const NOTICE: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║                 SPEEDCAM SENTINEL - DRIVER NOTICE                ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  Alerts are a driving aid, not a substitute for attention.       ║
║                                                                  ║
║  ✓ WHAT WE USE:                                                  ║
║    • Your current position and direction of travel               ║
║    • The camera catalog you configured                           ║
║                                                                  ║
║  ✗ WHAT WE NEVER DO:                                             ║
║    • Store your route or past positions                          ║
║    • Send your location anywhere                                 ║
║    • Guarantee that every camera is in the catalog               ║
║                                                                  ║
║  Always obey posted speed limits.                                ║
║                                                                  ║
║  You can view session statistics anytime with:                   ║
║    speedcam status                                               ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;
