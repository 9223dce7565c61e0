//! Platform capabilities the engine consumes but does not own.
//!
//! Each capability is feature-detected. A missing capability is skipped
//! silently; a failing one is logged and tracking carries on.

pub mod alert_output;
pub mod wake_lock;

// Re-export commonly used types
pub use alert_output::{
    AlertDispatcher, AlertSound, CommandSound, Delivery, Haptics, OutputError, SilentSound,
    TerminalBell, DEFAULT_VIBRATION_PATTERN_MS,
};
pub use wake_lock::{
    InhibitWakeLock, ManualWakeLock, PendingWakeLock, UnsupportedWakeLock, WakeLockError,
    WakeLockGuard, WakeLockProvider, WakeLockResult,
};
