//! Sound and haptic outputs fired when an alert triggers.
//!
//! Delivery is fire-and-forget: failures are logged and never change the
//! alert state.

use crate::core::AlertEvent;
use std::io::Write;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default vibration pattern: 200 ms on, 100 ms off, 200 ms on.
pub const DEFAULT_VIBRATION_PATTERN_MS: [u64; 3] = [200, 100, 200];

/// Output failures.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to start sound player {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write alert: {0}")]
    Write(#[from] std::io::Error),
    #[error("output rejected playback: {0}")]
    Rejected(String),
}

/// Something that can play the alert sound.
pub trait AlertSound: Send {
    /// Ready the output without making a sound. Called once per session
    /// start.
    fn prime(&mut self) -> Result<(), OutputError>;

    /// Play the alert from the beginning, interrupting any playback still
    /// running.
    fn play(&mut self) -> Result<(), OutputError>;
}

/// A vibration motor.
pub trait Haptics: Send {
    fn vibrate(&mut self, pattern: &[Duration]) -> Result<(), OutputError>;
}

/// Rings the terminal bell on stderr.
pub struct TerminalBell {
    out: Box<dyn Write + Send>,
}

impl TerminalBell {
    pub fn stderr() -> Self {
        Self {
            out: Box::new(std::io::stderr()),
        }
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self { out }
    }
}

impl AlertSound for TerminalBell {
    fn prime(&mut self) -> Result<(), OutputError> {
        self.out.flush()?;
        Ok(())
    }

    fn play(&mut self) -> Result<(), OutputError> {
        self.out.write_all(b"\x07")?;
        self.out.flush()?;
        Ok(())
    }
}

/// Plays the alert with an external player, e.g. `paplay alert.wav`.
pub struct CommandSound {
    program: String,
    args: Vec<String>,
    current: Option<Child>,
}

impl CommandSound {
    /// Build from an argv list. Returns `None` for an empty list.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            current: None,
        })
    }

    fn stop_current(&mut self) {
        if let Some(mut child) = self.current.take() {
            if let Ok(None) = child.try_wait() {
                let _ = child.kill();
            }
            let _ = child.wait();
        }
    }
}

impl AlertSound for CommandSound {
    fn prime(&mut self) -> Result<(), OutputError> {
        // Nothing to unlock for an external player; make sure no earlier
        // playback is left running
        self.stop_current();
        Ok(())
    }

    fn play(&mut self) -> Result<(), OutputError> {
        self.stop_current();
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| OutputError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        self.current = Some(child);
        Ok(())
    }
}

impl Drop for CommandSound {
    fn drop(&mut self) {
        self.stop_current();
    }
}

/// Counts requests without producing any sound.
#[derive(Debug, Clone, Default)]
pub struct SilentSound {
    primes: Arc<AtomicUsize>,
    plays: Arc<AtomicUsize>,
}

impl SilentSound {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prime_count(&self) -> usize {
        self.primes.load(Ordering::SeqCst)
    }

    pub fn play_count(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }
}

impl AlertSound for SilentSound {
    fn prime(&mut self) -> Result<(), OutputError> {
        self.primes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn play(&mut self) -> Result<(), OutputError> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Delivery {
    pub sound: bool,
    pub vibration: bool,
}

/// Fans a trigger out to the sound output and, when present, haptics.
pub struct AlertDispatcher {
    sound: Box<dyn AlertSound>,
    haptics: Option<Box<dyn Haptics>>,
    pattern: Vec<Duration>,
}

impl AlertDispatcher {
    pub fn new(sound: Box<dyn AlertSound>) -> Self {
        Self {
            sound,
            haptics: None,
            pattern: DEFAULT_VIBRATION_PATTERN_MS
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
        }
    }

    pub fn with_haptics(mut self, haptics: Box<dyn Haptics>) -> Self {
        self.haptics = Some(haptics);
        self
    }

    pub fn with_pattern(mut self, pattern_ms: &[u64]) -> Self {
        self.pattern = pattern_ms.iter().map(|ms| Duration::from_millis(*ms)).collect();
        self
    }

    pub fn has_haptics(&self) -> bool {
        self.haptics.is_some()
    }

    /// Unlock the sound output silently. Errors are logged.
    pub fn prime(&mut self) {
        if let Err(e) = self.sound.prime() {
            tracing::warn!(error = %e, "could not prime alert sound");
        }
    }

    /// Fire the sound and vibration once for `event`. Errors are logged.
    pub fn deliver(&mut self, event: &AlertEvent) -> Delivery {
        let mut delivery = Delivery::default();

        match self.sound.play() {
            Ok(()) => delivery.sound = true,
            Err(e) => tracing::warn!(point = event.point.id, error = %e, "alert sound failed"),
        }

        if let Some(haptics) = self.haptics.as_mut() {
            match haptics.vibrate(&self.pattern) {
                Ok(()) => delivery.vibration = true,
                Err(e) => tracing::warn!(point = event.point.id, error = %e, "vibration failed"),
            }
        }

        delivery
    }
}
