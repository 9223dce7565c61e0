//! Tracking session lifecycle.

pub mod status;
pub mod tracking;

pub use status::{SessionState, SessionStatus, Transition, Visibility, WakeLockStatus};
pub use tracking::{SessionError, TrackingSession};
