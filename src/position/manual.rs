//! Hand-fed position source.
//!
//! Samples are pushed through a [`PositionFeed`] and delivered to whichever
//! subscription is currently open. Pushing while nobody is subscribed drops
//! the sample, the way a platform location API simply stops calling back
//! after the watch is cleared.

use super::types::{PositionSample, PositionSource, SourceError, SourceEvent, Subscription};
use crossbeam_channel::{bounded, Sender};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Default)]
struct FeedState {
    current: Option<(Sender<SourceEvent>, Arc<AtomicBool>)>,
}

/// Clonable pushing end of a [`ManualSource`].
#[derive(Clone)]
pub struct PositionFeed {
    state: Arc<Mutex<FeedState>>,
}

impl PositionFeed {
    /// Deliver a sample. Returns false if no live subscription received it.
    pub fn push(&self, sample: PositionSample) -> bool {
        self.send(SourceEvent::Sample(sample))
    }

    /// Deliver a source error.
    pub fn push_error(&self, error: SourceError) -> bool {
        self.send(SourceEvent::Error(error))
    }

    fn send(&self, event: SourceEvent) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match &state.current {
            Some((sender, active)) if active.load(Ordering::SeqCst) => {
                sender.try_send(event).is_ok()
            }
            _ => false,
        }
    }

    /// Whether a live subscription is attached.
    pub fn is_subscribed(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .current
            .as_ref()
            .map(|(_, active)| active.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

/// A position source driven entirely by its [`PositionFeed`].
pub struct ManualSource {
    state: Arc<Mutex<FeedState>>,
    subscribe_count: Arc<AtomicUsize>,
    fail_with: Option<SourceError>,
}

impl ManualSource {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FeedState::default())),
            subscribe_count: Arc::new(AtomicUsize::new(0)),
            fail_with: None,
        }
    }

    /// A source whose `subscribe` always fails with `error`.
    pub fn failing(error: SourceError) -> Self {
        Self {
            fail_with: Some(error),
            ..Self::new()
        }
    }

    pub fn feed(&self) -> PositionFeed {
        PositionFeed {
            state: self.state.clone(),
        }
    }

    /// Shared counter of successful `subscribe` calls.
    pub fn subscribe_counter(&self) -> Arc<AtomicUsize> {
        self.subscribe_count.clone()
    }
}

impl Default for ManualSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionSource for ManualSource {
    fn subscribe(&mut self) -> Result<Subscription, SourceError> {
        if let Some(error) = &self.fail_with {
            return Err(error.clone());
        }

        let (sender, receiver) = bounded(10_000);
        let active = Arc::new(AtomicBool::new(true));

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.current = Some((sender, active.clone()));
        drop(state);

        self.subscribe_count.fetch_add(1, Ordering::SeqCst);
        Ok(Subscription::new(receiver, active, None))
    }

    fn describe(&self) -> String {
        "manual feed".to_string()
    }
}
