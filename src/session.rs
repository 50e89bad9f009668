//! Client side of progress tracking: watches a playback surface and decides
//! when observed activity is flushed to the progress API.
//!
//! [Controller] is a synchronous state machine that turns playback events and
//! timer expiries into [Effect]s. [Session] drives it on a tokio task, owning
//! the timers and the in-flight requests.

use crate::interval::RawInterval;

pub use controller::*;
pub use driver::*;
pub use http::*;
pub use remote::*;

mod controller;
mod driver;
mod http;
mod remote;

/// A media player as seen by the session.
pub trait PlaybackSurface: Send + 'static {
    /// Current playhead in seconds.
    fn position(&self) -> f64;

    /// Media length in seconds, once metadata is known.
    fn duration(&self) -> Option<f64>;

    /// Every range played since the media was loaded.
    fn played(&self) -> Vec<RawInterval>;

    fn is_paused(&self) -> bool;

    fn seek(&mut self, position: f64);
}

/// Notifications a [PlaybackSurface] emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    MetadataLoaded,
    Play,
    Pause,
    TimeUpdate,
    Seeking,
    Seeked,
    Ended,
}

#[cfg(test)]
mod testing;
