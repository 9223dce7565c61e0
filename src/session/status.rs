//! Read-only views of the tracking session for rendering.

use crate::catalog::GeoPoint;
use crate::position::PositionSample;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a tracking session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Active,
}

/// Whether the session is in the foreground.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

/// Outcome of a `start` or `stop` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The state changed
    Changed,
    /// Already in the requested state; nothing happened
    Unchanged,
}

/// Where the wake lock stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WakeLockStatus {
    Unsupported,
    #[default]
    NotHeld,
    Pending,
    Held,
}

/// Snapshot of everything a UI needs to draw the session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Identifier of the current active run
    pub session_id: Option<Uuid>,
    pub active_alert: Option<GeoPoint>,
    pub wake_lock: WakeLockStatus,
    pub visibility: Visibility,
    pub last_sample: Option<PositionSample>,
    pub catalog_size: usize,
    /// Whether position samples are still being delivered
    pub receiving: bool,
}

impl SessionStatus {
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }
}
