//! Best-effort wake lock that keeps the display awake while tracking.
//!
//! Requests resolve asynchronously: [`WakeLockProvider::request`] returns a
//! [`PendingWakeLock`] the session polls later. A granted lock is a
//! [`WakeLockGuard`]; the platform may revoke it at any time (for example
//! when the session is backgrounded), which the guard reports through
//! [`WakeLockGuard::is_held`].

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendError, Sender, TryRecvError};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Wake-lock failures. None of them is fatal to tracking.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WakeLockError {
    #[error("wake lock not supported on this platform")]
    Unsupported,
    #[error("wake lock request denied: {0}")]
    Denied(String),
    #[error("wake lock release failed: {0}")]
    Release(String),
    #[error("wake lock request abandoned before completing")]
    Abandoned,
}

/// A granted wake lock.
pub trait WakeLockGuard: Send {
    /// Whether the platform still honours the lock.
    fn is_held(&mut self) -> bool;

    /// Give the lock back.
    fn release(self: Box<Self>) -> Result<(), WakeLockError>;
}

pub type WakeLockResult = Result<Box<dyn WakeLockGuard>, WakeLockError>;

/// An in-flight wake-lock request.
pub struct PendingWakeLock {
    receiver: Receiver<WakeLockResult>,
}

impl PendingWakeLock {
    pub fn new(receiver: Receiver<WakeLockResult>) -> Self {
        Self { receiver }
    }

    /// A request that has already resolved.
    pub fn ready(result: WakeLockResult) -> Self {
        let (sender, receiver) = bounded(1);
        let _ = sender.send(result);
        Self { receiver }
    }

    /// The result, if the request has resolved.
    pub fn try_take(&self) -> Option<WakeLockResult> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(WakeLockError::Abandoned)),
        }
    }

    /// Block up to `timeout` for the result.
    pub fn wait(&self, timeout: Duration) -> Option<WakeLockResult> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(WakeLockError::Abandoned)),
        }
    }
}

/// A platform wake-lock capability.
pub trait WakeLockProvider: Send {
    /// Feature detection. Unsupported providers are never asked for a lock.
    fn is_supported(&self) -> bool;

    /// Start a lock request.
    fn request(&self) -> PendingWakeLock;
}

/// Provider for platforms without any wake-lock mechanism.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedWakeLock;

impl WakeLockProvider for UnsupportedWakeLock {
    fn is_supported(&self) -> bool {
        false
    }

    fn request(&self) -> PendingWakeLock {
        PendingWakeLock::ready(Err(WakeLockError::Unsupported))
    }
}

/// Holds an idle inhibitor process for as long as the lock is held.
///
/// Uses `systemd-inhibit` on Linux and `caffeinate` on macOS.
#[derive(Debug, Clone)]
pub struct InhibitWakeLock {
    program: String,
    args: Vec<String>,
}

impl InhibitWakeLock {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// The inhibitor for the current platform, if there is one.
    pub fn system() -> Option<Self> {
        if cfg!(target_os = "linux") {
            Some(Self::new(
                "systemd-inhibit",
                [
                    "--what=idle",
                    "--who=speedcam-sentinel",
                    "--why=Tracking speed cameras",
                    "--mode=block",
                    "sleep",
                    "infinity",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ))
        } else if cfg!(target_os = "macos") {
            Some(Self::new("caffeinate", vec!["-d".to_string(), "-i".to_string()]))
        } else {
            None
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl WakeLockProvider for InhibitWakeLock {
    fn is_supported(&self) -> bool {
        find_on_path(&self.program).is_some()
    }

    fn request(&self) -> PendingWakeLock {
        let (sender, receiver) = bounded(1);
        let program = self.program.clone();
        let args = self.args.clone();

        let spawned = thread::Builder::new()
            .name("wake-lock".to_string())
            .spawn(move || deliver(&sender, spawn_inhibitor(&program, &args)));

        match spawned {
            Ok(_) => PendingWakeLock::new(receiver),
            Err(e) => PendingWakeLock::ready(Err(WakeLockError::Denied(e.to_string()))),
        }
    }
}

/// Hand a result to the requester. A lock nobody is waiting for any more is
/// released on the spot instead of being left running.
fn deliver(sender: &Sender<WakeLockResult>, result: WakeLockResult) {
    if let Err(SendError(Ok(guard))) = sender.send(result) {
        tracing::debug!("wake lock granted after its request was dropped, releasing");
        if let Err(e) = guard.release() {
            tracing::warn!(error = %e, "could not release orphaned wake lock");
        }
    }
}

fn spawn_inhibitor(program: &str, args: &[String]) -> WakeLockResult {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| WakeLockError::Denied(format!("{program}: {e}")))?;

    // An inhibitor that is refused (no session bus, no polkit grant) exits
    // almost immediately
    thread::sleep(Duration::from_millis(150));
    match child.try_wait() {
        Ok(Some(status)) => Err(WakeLockError::Denied(format!("{program} exited with {status}"))),
        Ok(None) => Ok(Box::new(ProcessGuard { child: Some(child) })),
        Err(e) => {
            let _ = child.kill();
            Err(WakeLockError::Denied(e.to_string()))
        }
    }
}

struct ProcessGuard {
    child: Option<Child>,
}

impl WakeLockGuard for ProcessGuard {
    fn is_held(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    fn release(mut self: Box<Self>) -> Result<(), WakeLockError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if let Ok(Some(_)) = child.try_wait() {
            // Already gone
            return Ok(());
        }
        child
            .kill()
            .map_err(|e| WakeLockError::Release(e.to_string()))?;
        let _ = child.wait();
        Ok(())
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn find_on_path(program: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

#[derive(Default)]
struct ManualState {
    deny: Option<String>,
    deferred: bool,
    pending: Vec<Sender<WakeLockResult>>,
    grants: Vec<Arc<AtomicBool>>,
}

/// In-process wake lock whose behaviour is scripted by the caller.
///
/// Useful wherever no platform lock exists but the lifecycle should still be
/// observable: requests can be granted, denied or held pending, and granted
/// locks can be revoked as a platform would when the app is backgrounded.
#[derive(Clone, Default)]
pub struct ManualWakeLock {
    state: Arc<Mutex<ManualState>>,
    requests: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
}

impl ManualWakeLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deny future requests with `reason`, or grant them again with `None`.
    pub fn set_denied(&self, reason: Option<&str>) {
        self.lock().deny = reason.map(str::to_string);
    }

    /// Keep future requests pending until [`Self::resolve_pending`].
    pub fn set_deferred(&self, deferred: bool) {
        self.lock().deferred = deferred;
    }

    /// Resolve all pending requests according to the current deny setting.
    /// Returns how many were resolved.
    pub fn resolve_pending(&self) -> usize {
        let pending = std::mem::take(&mut self.lock().pending);
        let count = pending.len();
        for sender in pending {
            deliver(&sender, self.grant_or_deny());
        }
        count
    }

    /// Resolve only the oldest pending request. Returns false when none is
    /// pending.
    pub fn resolve_next(&self) -> bool {
        let sender = {
            let mut state = self.lock();
            if state.pending.is_empty() {
                return false;
            }
            state.pending.remove(0)
        };
        deliver(&sender, self.grant_or_deny());
        true
    }

    /// Revoke every granted lock, as a platform does on backgrounding.
    pub fn revoke_all(&self) {
        for grant in &self.lock().grants {
            grant.store(false, Ordering::SeqCst);
        }
    }

    /// Number of granted locks still held.
    pub fn held_count(&self) -> usize {
        self.lock()
            .grants
            .iter()
            .filter(|g| g.load(Ordering::SeqCst))
            .count()
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn grant_or_deny(&self) -> WakeLockResult {
        let mut state = self.lock();
        if let Some(reason) = &state.deny {
            return Err(WakeLockError::Denied(reason.clone()));
        }
        let held = Arc::new(AtomicBool::new(true));
        state.grants.push(held.clone());
        Ok(Box::new(ManualGuard {
            held,
            releases: self.releases.clone(),
        }))
    }
}

impl WakeLockProvider for ManualWakeLock {
    fn is_supported(&self) -> bool {
        true
    }

    fn request(&self) -> PendingWakeLock {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.lock().deferred {
            let (sender, receiver) = bounded(1);
            self.lock().pending.push(sender);
            return PendingWakeLock::new(receiver);
        }
        PendingWakeLock::ready(self.grant_or_deny())
    }
}

struct ManualGuard {
    held: Arc<AtomicBool>,
    releases: Arc<AtomicUsize>,
}

impl WakeLockGuard for ManualGuard {
    fn is_held(&mut self) -> bool {
        self.held.load(Ordering::SeqCst)
    }

    fn release(self: Box<Self>) -> Result<(), WakeLockError> {
        self.held.store(false, Ordering::SeqCst);
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
