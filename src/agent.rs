//! The agent loop driving a [`TrackingSession`].
//!
//! Control commands arrive over a channel from the terminal, the control API
//! or a signal handler. Each step drains them, advances the session by one
//! position event and publishes a fresh [`SessionStatus`].

use crate::config::Config;
use crate::core::AlertEvent;
use crate::session::{SessionStatus, TrackingSession, Visibility};
use crossbeam_channel::{Receiver, TryRecvError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// How long one step waits for a position event.
pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

/// How often the config file is re-read for pause/resume.
pub const CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Requests the agent loop accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Start,
    Stop,
    Dismiss,
    Visibility(Visibility),
    Shutdown,
}

/// Latest session status, readable from other threads.
pub type SharedStatus = Arc<RwLock<SessionStatus>>;

pub fn create_shared_status() -> SharedStatus {
    Arc::new(RwLock::new(SessionStatus::default()))
}

/// Read the published status.
pub fn read_status(status: &SharedStatus) -> SessionStatus {
    status
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

struct ConfigWatch {
    path: PathBuf,
    paused: bool,
    last_check: Instant,
}

pub struct Agent {
    session: TrackingSession,
    commands: Receiver<ControlCommand>,
    status: SharedStatus,
    running: Arc<AtomicBool>,
    tick: Duration,
    watch: Option<ConfigWatch>,
    on_alert: Option<Box<dyn FnMut(&AlertEvent) + Send>>,
}

impl Agent {
    pub fn new(session: TrackingSession, commands: Receiver<ControlCommand>) -> Self {
        Self {
            session,
            commands,
            status: create_shared_status(),
            running: Arc::new(AtomicBool::new(true)),
            tick: DEFAULT_TICK,
            watch: None,
            on_alert: None,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_status(mut self, status: SharedStatus) -> Self {
        self.status = status;
        self
    }

    /// Follow the `paused` flag in the config file at `path`, so a separate
    /// `pause`/`resume` invocation controls a running agent. `paused` is the
    /// value the agent started with.
    pub fn watch_config(mut self, path: PathBuf, paused: bool) -> Self {
        self.watch = Some(ConfigWatch {
            path,
            paused,
            last_check: Instant::now(),
        });
        self
    }

    /// Called for every alert the session raises.
    pub fn on_alert(mut self, callback: impl FnMut(&AlertEvent) + Send + 'static) -> Self {
        self.on_alert = Some(Box::new(callback));
        self
    }

    pub fn status(&self) -> SharedStatus {
        self.status.clone()
    }

    /// Flag that keeps [`Agent::run`] going; clear it to shut down.
    pub fn running(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn session(&self) -> &TrackingSession {
        &self.session
    }

    /// Apply one control command.
    pub fn apply(&mut self, command: ControlCommand) {
        tracing::debug!(?command, "control command");
        match command {
            ControlCommand::Start => {
                if let Err(e) = self.session.start() {
                    tracing::error!(error = %e, "could not start tracking");
                }
            }
            ControlCommand::Stop => {
                self.session.stop();
            }
            ControlCommand::Dismiss => {
                self.session.dismiss();
            }
            ControlCommand::Visibility(visibility) => self.session.visibility_changed(visibility),
            ControlCommand::Shutdown => self.running.store(false, Ordering::SeqCst),
        }
    }

    /// One iteration: commands, pause flag, one position event, status.
    pub fn step(&mut self) -> Option<AlertEvent> {
        loop {
            match self.commands.try_recv() {
                Ok(command) => self.apply(command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    // Nobody can send commands any more; keep tracking
                    break;
                }
            }
        }
        self.check_config();

        let event = if self.running.load(Ordering::SeqCst) {
            self.session.tick(self.tick)
        } else {
            None
        };

        if let (Some(event), Some(callback)) = (&event, self.on_alert.as_mut()) {
            callback(event);
        }
        self.publish();
        event
    }

    /// Run until shut down, then stop the session and hand it back.
    pub fn run(mut self) -> TrackingSession {
        self.publish();
        while self.running.load(Ordering::SeqCst) {
            self.step();
        }

        self.session.stop();
        self.publish();
        tracing::info!("agent stopped");
        self.session
    }

    fn publish(&self) {
        let snapshot = self.session.status();
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    fn check_config(&mut self) {
        let Some(watch) = self.watch.as_mut() else {
            return;
        };
        if watch.last_check.elapsed() < CONFIG_POLL_INTERVAL {
            return;
        }
        watch.last_check = Instant::now();

        let paused = match Config::load_from(&watch.path) {
            Ok(config) => config.paused,
            Err(e) => {
                tracing::debug!(error = %e, "config reload failed");
                return;
            }
        };
        if paused == watch.paused {
            return;
        }
        watch.paused = paused;

        if paused {
            tracing::info!("pausing tracking");
            self.session.stop();
        } else {
            tracing::info!("resuming tracking");
            if let Err(e) = self.session.start() {
                tracing::error!(error = %e, "could not resume tracking");
            }
        }
    }
}
