use std::sync::{Arc, Mutex, MutexGuard};

use super::PlaybackSurface;
use crate::interval::RawInterval;

#[derive(Debug, Default)]
struct Media {
    position: f64,
    duration: Option<f64>,
    paused: bool,
    played: Vec<(f64, f64)>,
}

/// Scriptable player. Clones share the same media, so a test can keep one
/// handle while a session owns another.
#[derive(Debug, Clone)]
pub struct FakePlayer {
    media: Arc<Mutex<Media>>,
}

impl FakePlayer {
    pub fn new(duration: f64) -> Self {
        let media = Media {
            duration: Some(duration),
            paused: true,
            ..Media::default()
        };

        Self {
            media: Arc::new(Mutex::new(media)),
        }
    }

    /// A player whose metadata has not loaded yet.
    pub fn unloaded() -> Self {
        let player = Self::new(0.0);
        player.media().duration = None;
        player
    }

    fn media(&self) -> MutexGuard<'_, Media> {
        self.media.lock().unwrap()
    }

    pub fn play(&self) {
        self.media().paused = false;
    }

    pub fn pause(&self) {
        self.media().paused = true;
    }

    pub fn set_duration(&self, duration: f64) {
        self.media().duration = Some(duration);
    }

    /// Plays `seconds` of media from the current position.
    pub fn advance(&self, seconds: f64) {
        let mut media = self.media();
        let start = media.position;
        let end = media.duration.map_or(start + seconds, |duration| (start + seconds).min(duration));

        match media.played.last_mut() {
            Some((_, last_end)) if *last_end == start => *last_end = end,
            _ => media.played.push((start, end)),
        }

        media.position = end;
    }

    /// Moves the playhead like a user dragging the seek bar.
    pub fn jump(&self, position: f64) {
        self.media().position = position;
    }
}

impl PlaybackSurface for FakePlayer {
    fn position(&self) -> f64 {
        self.media().position
    }

    fn duration(&self) -> Option<f64> {
        self.media().duration
    }

    fn played(&self) -> Vec<RawInterval> {
        self.media()
            .played
            .iter()
            .map(|&(start, end)| RawInterval::new(start, end))
            .collect()
    }

    fn is_paused(&self) -> bool {
        self.media().paused
    }

    fn seek(&mut self, position: f64) {
        self.jump(position);
    }
}
