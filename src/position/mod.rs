//! Position stream adapters.
//!
//! Every location source is exposed as a [`PositionSource`] that hands out
//! cancellable [`Subscription`]s.

pub mod manual;
pub mod replay;
pub mod types;

// Re-export commonly used types
pub use manual::{ManualSource, PositionFeed};
pub use replay::{ReplayInput, ReplaySource};
pub use types::{
    sanitize_heading, PositionSample, PositionSource, SourceError, SourceEvent, Subscription,
};
