//! The tracking session: Idle ⇄ Active.
//!
//! While active the session owns exactly one position subscription and, when
//! the platform supports it, a wake lock. Samples are evaluated one at a time
//! in arrival order; a trigger updates the alert state and fires the alert
//! outputs once.

use super::status::{SessionState, SessionStatus, Transition, Visibility, WakeLockStatus};
use crate::capability::{
    AlertDispatcher, PendingWakeLock, SilentSound, UnsupportedWakeLock, WakeLockError,
    WakeLockGuard, WakeLockProvider, WakeLockResult,
};
use crate::catalog::{Catalog, GeoPoint};
use crate::core::{evaluate, AlertEvent, AlertState, Thresholds};
use crate::position::{PositionSample, PositionSource, SourceError, SourceEvent, Subscription};
use crate::stats::{create_shared_stats, SharedStats};
use crossbeam_channel::RecvTimeoutError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

/// How long a dropped session waits for in-flight wake-lock requests.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Failures that keep a session from changing state.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("could not subscribe to position source: {0}")]
    Subscribe(#[from] SourceError),
}

enum LockSlot {
    Empty,
    Pending(PendingWakeLock),
    Held(Box<dyn WakeLockGuard>),
}

/// Proximity tracking session.
pub struct TrackingSession {
    catalog: Arc<Catalog>,
    thresholds: Thresholds,
    source: Box<dyn PositionSource>,
    subscription: Option<Subscription>,
    wake_lock: Box<dyn WakeLockProvider>,
    wake_lock_supported: bool,
    lock: LockSlot,
    // Requests issued before the last stop(); whatever they yield is released
    stale_requests: Vec<PendingWakeLock>,
    lock_acquired_this_run: bool,
    dispatcher: AlertDispatcher,
    stats: SharedStats,
    state: SessionState,
    run_id: Option<Uuid>,
    visibility: Visibility,
    alert: AlertState,
    last_sample: Option<PositionSample>,
}

impl TrackingSession {
    /// A session with no wake lock, silent alerts and private statistics.
    pub fn new(catalog: Arc<Catalog>, source: Box<dyn PositionSource>) -> Self {
        Self {
            catalog,
            thresholds: Thresholds::default(),
            source,
            subscription: None,
            wake_lock: Box::new(UnsupportedWakeLock),
            wake_lock_supported: false,
            lock: LockSlot::Empty,
            stale_requests: Vec::new(),
            lock_acquired_this_run: false,
            dispatcher: AlertDispatcher::new(Box::new(SilentSound::new())),
            stats: create_shared_stats(),
            state: SessionState::Idle,
            run_id: None,
            visibility: Visibility::Visible,
            alert: AlertState::none(),
            last_sample: None,
        }
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_wake_lock(mut self, provider: Box<dyn WakeLockProvider>) -> Self {
        self.wake_lock_supported = provider.is_supported();
        self.wake_lock = provider;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: AlertDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_stats(mut self, stats: SharedStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn alert_state(&self) -> &AlertState {
        &self.alert
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn stats(&self) -> &SharedStats {
        &self.stats
    }

    /// Begin tracking.
    ///
    /// Subscribes to the position source, asks for a wake lock when one is
    /// available and primes the alert sound. Calling this while already
    /// active changes nothing.
    pub fn start(&mut self) -> Result<Transition, SessionError> {
        if self.is_active() {
            tracing::debug!("start requested while already tracking");
            return Ok(Transition::Unchanged);
        }

        let subscription = self.source.subscribe()?;
        let run_id = Uuid::new_v4();
        tracing::info!(
            session = %run_id,
            source = %self.source.describe(),
            cameras = self.catalog.len(),
            "tracking started"
        );

        self.subscription = Some(subscription);
        self.state = SessionState::Active;
        self.run_id = Some(run_id);
        self.lock_acquired_this_run = false;
        self.stats.record_session_started();

        self.dispatcher.prime();
        self.request_wake_lock();
        self.poll_wake_lock();

        Ok(Transition::Changed)
    }

    /// End tracking: cancel the subscription, give back the wake lock and
    /// clear any active alert. No-op when idle.
    pub fn stop(&mut self) -> Transition {
        if !self.is_active() {
            return Transition::Unchanged;
        }

        if let Some(mut subscription) = self.subscription.take() {
            subscription.cancel();
        }
        self.release_wake_lock();
        self.lock_acquired_this_run = false;
        self.alert = AlertState::none();
        self.state = SessionState::Idle;

        tracing::info!(
            session = ?self.run_id.take(),
            "tracking stopped"
        );
        Transition::Changed
    }

    /// Clear the active alert so the next qualifying sample can raise a new
    /// one. Returns the point that was active.
    pub fn dismiss(&mut self) -> Option<GeoPoint> {
        let dismissed = self.alert.dismiss();
        if let Some(point) = &dismissed {
            self.stats.record_alert_dismissed();
            tracing::info!(camera = point.id, name = %point.name, "alert dismissed");
        }
        dismissed
    }

    /// Evaluate one position sample. Ignored while idle.
    pub fn handle_sample(&mut self, sample: PositionSample) -> Option<AlertEvent> {
        if !self.is_active() {
            return None;
        }

        self.stats.record_sample();
        let evaluation = evaluate(&sample, &self.catalog, &self.alert, &self.thresholds);
        self.alert = evaluation.state;
        self.last_sample = Some(sample);

        let event = evaluation.triggered?;
        self.stats.record_alert_raised();
        tracing::info!(
            camera = event.point.id,
            name = %event.point.name,
            speed_limit = event.point.speed_limit,
            distance_m = event.distance_meters.round(),
            "{}",
            event.banner()
        );
        let delivery = self.dispatcher.deliver(&event);
        tracing::debug!(sound = delivery.sound, vibration = delivery.vibration, "alert delivered");
        Some(event)
    }

    /// Record a source error. Tracking continues.
    pub fn handle_source_error(&mut self, error: &SourceError) {
        self.stats.record_source_error();
        tracing::warn!(error = %error, "position source error");
    }

    /// One step of the session loop: settle wake-lock requests, then wait up
    /// to `timeout` for the next position event and process it.
    ///
    /// Returns the alert raised by this step, if any.
    pub fn tick(&mut self, timeout: Duration) -> Option<AlertEvent> {
        self.poll_wake_lock();

        let Some(subscription) = self.subscription.as_ref() else {
            std::thread::sleep(timeout);
            return None;
        };

        match subscription.recv_timeout(timeout) {
            Ok(SourceEvent::Sample(sample)) => self.handle_sample(sample),
            Ok(SourceEvent::Error(error)) => {
                self.handle_source_error(&error);
                None
            }
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                tracing::info!("position source ended");
                self.subscription = None;
                None
            }
        }
    }

    /// React to the session moving between foreground and background.
    ///
    /// Platforms drop wake locks for background apps. On returning to the
    /// foreground the lock is requested again if this run held one before
    /// and it is gone now.
    pub fn visibility_changed(&mut self, visibility: Visibility) {
        self.visibility = visibility;
        tracing::debug!(?visibility, "visibility changed");

        if visibility != Visibility::Visible || !self.is_active() {
            return;
        }
        if !self.lock_acquired_this_run {
            return;
        }

        let lost = match &mut self.lock {
            LockSlot::Held(guard) => !guard.is_held(),
            LockSlot::Pending(_) => false,
            LockSlot::Empty => true,
        };
        if lost {
            if let LockSlot::Held(guard) = std::mem::replace(&mut self.lock, LockSlot::Empty) {
                // The platform already revoked it
                let _ = guard.release();
            }
            tracing::info!("re-acquiring wake lock");
            self.request_wake_lock();
            self.poll_wake_lock();
        }
    }

    /// Settle any wake-lock requests that have resolved and notice a held
    /// lock the platform has taken back.
    pub fn poll_wake_lock(&mut self) {
        self.stale_requests.retain(|pending| match pending.try_take() {
            None => true,
            Some(result) => {
                release_stale(result);
                false
            }
        });

        if let LockSlot::Pending(pending) = &self.lock {
            if let Some(result) = pending.try_take() {
                self.settle_request(result);
            }
        }

        let revoked = match &mut self.lock {
            LockSlot::Held(guard) => !guard.is_held(),
            _ => false,
        };
        if revoked {
            if let LockSlot::Held(guard) = std::mem::replace(&mut self.lock, LockSlot::Empty) {
                let _ = guard.release();
            }
            tracing::info!("wake lock revoked by the platform");
        }
    }

    /// Wait up to `timeout` for requests still in flight and release
    /// whatever they grant. Only meaningful once stopped.
    pub fn drain_wake_lock_requests(&mut self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        for pending in self.stale_requests.drain(..) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match pending.wait(remaining) {
                Some(result) => release_stale(result),
                None => tracing::warn!("wake lock request still unresolved at shutdown"),
            }
        }
    }

    /// Everything a UI needs to draw the session.
    pub fn status(&self) -> SessionStatus {
        let wake_lock = if !self.wake_lock_supported {
            WakeLockStatus::Unsupported
        } else {
            match self.lock {
                LockSlot::Empty => WakeLockStatus::NotHeld,
                LockSlot::Pending(_) => WakeLockStatus::Pending,
                LockSlot::Held(_) => WakeLockStatus::Held,
            }
        };

        SessionStatus {
            state: self.state,
            session_id: self.run_id,
            active_alert: self.alert.active().cloned(),
            wake_lock,
            visibility: self.visibility,
            last_sample: self.last_sample.clone(),
            catalog_size: self.catalog.len(),
            receiving: self
                .subscription
                .as_ref()
                .map(Subscription::is_active)
                .unwrap_or(false),
        }
    }

    fn settle_request(&mut self, result: WakeLockResult) {
        match result {
            Ok(guard) => {
                self.lock = LockSlot::Held(guard);
                self.lock_acquired_this_run = true;
                self.stats.record_wake_lock_acquired();
                tracing::info!("wake lock acquired");
            }
            Err(WakeLockError::Unsupported) => {
                self.lock = LockSlot::Empty;
                tracing::debug!("wake lock unsupported");
            }
            Err(e) => {
                self.lock = LockSlot::Empty;
                self.stats.record_wake_lock_failure();
                tracing::warn!(error = %e, "wake lock request failed");
            }
        }
    }

    fn request_wake_lock(&mut self) {
        if !self.wake_lock_supported {
            return;
        }
        self.lock = LockSlot::Pending(self.wake_lock.request());
    }

    fn release_wake_lock(&mut self) {
        match std::mem::replace(&mut self.lock, LockSlot::Empty) {
            LockSlot::Empty => {}
            LockSlot::Pending(pending) => self.stale_requests.push(pending),
            LockSlot::Held(guard) => match guard.release() {
                Ok(()) => tracing::debug!("wake lock released"),
                Err(e) => tracing::warn!(error = %e, "wake lock release failed"),
            },
        }
    }
}

/// A grant that arrived for a run that already ended.
fn release_stale(result: WakeLockResult) {
    if let Ok(guard) = result {
        tracing::debug!("releasing wake lock granted after stop");
        if let Err(e) = guard.release() {
            tracing::warn!(error = %e, "could not release stale wake lock");
        }
    }
}

impl Drop for TrackingSession {
    fn drop(&mut self) {
        self.stop();
        self.drain_wake_lock_requests(SHUTDOWN_GRACE);
    }
}
