use super::{PlaybackEvent, PlaybackSurface, RemoteError};
use crate::config::SessionConfig;
use crate::interval::WatchedSet;
use crate::model::{ProgressUpdate, ProgressView, VideoId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No active video.
    #[default]
    Idle,
    /// Waiting for the saved progress and the media metadata.
    Loading,
    Ready,
    /// The user is moving the playhead; nothing is flushed.
    Seeking,
}

/// Work the [Controller] asks its driver to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Fetch { video_id: VideoId },
    Save { video_id: VideoId, update: ProgressUpdate },
    StartPeriodic,
    StopPeriodic,
    /// Arm the debounce timer, replacing a running one.
    ScheduleDebounce,
    CancelDebounce,
}

/// What a UI shows about the active video.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressDisplay {
    pub video_id: Option<VideoId>,
    pub state: SessionState,
    pub watched_intervals: WatchedSet,
    pub progress_percentage: f64,
    pub current_time: f64,
    pub duration: f64,
    pub playing: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Debounce {
    /// Quiet; the next trigger flushes right away.
    #[default]
    Idle,
    /// Flushed on the leading edge, nothing new since.
    Armed,
    /// Triggers arrived inside the window; flush when it elapses.
    Coalesced,
    /// The window elapsed during a seek; flush after the seek completes.
    Deferred,
}

/// Decides when playback activity of the active video is saved.
///
/// Every method returns the [Effect]s to run, in order. The controller never
/// performs I/O or keeps time itself.
#[derive(Debug, Clone)]
pub struct Controller {
    config: SessionConfig,
    state: SessionState,
    video_id: Option<VideoId>,
    fetched: Option<ProgressView>,
    acknowledged_duration: f64,
    debounce: Debounce,
    display: ProgressDisplay,
}

impl Controller {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: SessionState::Idle,
            video_id: None,
            fetched: None,
            acknowledged_duration: 0.0,
            debounce: Debounce::Idle,
            display: ProgressDisplay::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn video_id(&self) -> Option<&VideoId> {
        self.video_id.as_ref()
    }

    pub fn display(&self) -> &ProgressDisplay {
        &self.display
    }

    /// Makes `video_id` the active video and requests its saved progress.
    ///
    /// Unflushed activity of the previous video is dropped.
    pub fn activate(&mut self, video_id: VideoId) -> Vec<Effect> {
        if self.video_id.as_ref() == Some(&video_id) && self.state != SessionState::Idle {
            return Vec::new();
        }

        tracing::debug!(%video_id, previous = ?self.video_id, "activate video");

        *self = Self::new(self.config);
        self.state = SessionState::Loading;
        self.video_id = Some(video_id.clone());
        self.sync_display();

        vec![Effect::StopPeriodic, Effect::CancelDebounce, Effect::Fetch { video_id }]
    }

    pub fn playback<P: PlaybackSurface>(&mut self, event: PlaybackEvent, player: &mut P) -> Vec<Effect> {
        let mut effects = Vec::new();

        match event {
            PlaybackEvent::MetadataLoaded => {
                if let Some(duration) = valid_duration(player) {
                    self.display.duration = duration;
                    self.try_ready(player, &mut effects);
                }
            }
            PlaybackEvent::Play => {
                self.display.playing = true;
                if self.state == SessionState::Ready {
                    effects.push(Effect::StartPeriodic);
                }
            }
            PlaybackEvent::Pause => {
                // Players pause while scrubbing; the seek owns that flush.
                if self.state != SessionState::Seeking {
                    self.display.playing = false;
                }

                if self.state == SessionState::Ready {
                    effects.push(Effect::StopPeriodic);
                    self.trigger(player, &mut effects);
                }
            }
            PlaybackEvent::TimeUpdate => {
                if self.state == SessionState::Ready {
                    self.display.current_time = player.position();
                }
            }
            PlaybackEvent::Seeking => {
                if self.state == SessionState::Ready {
                    effects.push(Effect::StopPeriodic);
                    self.trigger(player, &mut effects);
                    self.state = SessionState::Seeking;
                }
            }
            PlaybackEvent::Seeked => {
                if self.state == SessionState::Seeking {
                    self.state = SessionState::Ready;
                    self.display.current_time = player.position();
                    self.display.playing = !player.is_paused();

                    if self.display.playing {
                        effects.push(Effect::StartPeriodic);
                    }

                    if self.debounce == Debounce::Deferred {
                        self.debounce = Debounce::Coalesced;
                        effects.push(Effect::ScheduleDebounce);
                    }
                }
            }
            PlaybackEvent::Ended => {
                if matches!(self.state, SessionState::Ready | SessionState::Seeking) {
                    self.display.playing = false;
                    effects.push(Effect::StopPeriodic);
                    self.trigger(player, &mut effects);
                    self.display.current_time = valid_duration(player).unwrap_or(self.display.duration);
                }
            }
        }

        self.sync_display();
        effects
    }

    /// The periodic timer fired.
    pub fn tick<P: PlaybackSurface>(&mut self, player: &mut P) -> Vec<Effect> {
        if player.is_paused() {
            return Vec::new();
        }

        self.flush(player).into_iter().collect()
    }

    /// The debounce window closed without another trigger.
    pub fn debounce_elapsed<P: PlaybackSurface>(&mut self, player: &mut P) -> Vec<Effect> {
        match self.debounce {
            Debounce::Coalesced if self.state == SessionState::Seeking => {
                self.debounce = Debounce::Deferred;
                Vec::new()
            }
            Debounce::Coalesced => {
                self.debounce = Debounce::Idle;
                self.flush(player).into_iter().collect()
            }
            Debounce::Armed => {
                self.debounce = Debounce::Idle;
                Vec::new()
            }
            Debounce::Idle | Debounce::Deferred => Vec::new(),
        }
    }

    pub fn fetch_resolved<P: PlaybackSurface>(
        &mut self, video_id: &VideoId, result: Result<ProgressView, RemoteError>, player: &mut P,
    ) -> Vec<Effect> {
        if self.video_id.as_ref() != Some(video_id) || self.state != SessionState::Loading {
            tracing::debug!(%video_id, active = ?self.video_id, "discard stale fetch response");
            return Vec::new();
        }

        let view = result.unwrap_or_else(|error| {
            tracing::warn!(%video_id, %error, "failed to fetch progress, starting from scratch");
            self.display.last_error = Some(error.to_string());
            ProgressView::empty()
        });

        self.display.watched_intervals = view.watched_intervals.clone();
        self.display.progress_percentage = view.progress_percentage;
        self.fetched = Some(view);

        let mut effects = Vec::new();
        self.try_ready(player, &mut effects);
        self.sync_display();
        effects
    }

    pub fn save_resolved(&mut self, video_id: &VideoId, result: Result<ProgressView, RemoteError>) {
        if self.video_id.as_ref() != Some(video_id) {
            tracing::debug!(%video_id, active = ?self.video_id, "discard stale save response");
            return;
        }

        match result {
            Ok(view) => {
                self.display.watched_intervals = view.watched_intervals;
                self.display.progress_percentage = view.progress_percentage;
                self.acknowledged_duration = view.video_duration;
                self.display.last_error = None;
            }
            Err(error) if error.is_conflict() => {
                tracing::warn!(%video_id, "save lost a concurrent write, the next flush will carry it");
                self.display.last_error = Some(error.to_string());
            }
            Err(error) => {
                tracing::warn!(%video_id, %error, "failed to save progress");
                self.display.last_error = Some(error.to_string());
            }
        }
    }

    /// Stops all scheduling. Unflushed activity is dropped.
    pub fn shutdown(&mut self) -> Vec<Effect> {
        self.state = SessionState::Idle;
        self.debounce = Debounce::Idle;
        self.sync_display();

        vec![Effect::StopPeriodic, Effect::CancelDebounce]
    }

    /// Enters `Ready` once the saved progress is in and the player knows the
    /// media length, whichever comes last. A player that already had its
    /// metadata before activation needs no further `MetadataLoaded`.
    fn try_ready<P: PlaybackSurface>(&mut self, player: &mut P, effects: &mut Vec<Effect>) {
        if self.state != SessionState::Loading || self.fetched.is_none() {
            return;
        }

        let (Some(video_id), Some(duration)) = (self.video_id.clone(), valid_duration(player)) else {
            return;
        };

        let Some(fetched) = self.fetched.take() else {
            return;
        };

        self.state = SessionState::Ready;
        self.display.duration = duration;
        self.acknowledged_duration = fetched.video_duration;

        let saved = fetched.last_watched_position;
        if saved > self.config.seek_epsilon && saved < duration {
            tracing::debug!(%video_id, position = saved, "resume from saved position");
            player.seek(saved);
        }

        let position = player.position();
        self.display.current_time = position;

        if duration != self.acknowledged_duration {
            tracing::debug!(%video_id, duration, stored = self.acknowledged_duration, "back-fill video duration");
            effects.push(Effect::Save {
                video_id,
                update: ProgressUpdate::default()
                    .with_position(position)
                    .with_duration(duration),
            });
        }

        self.display.playing = !player.is_paused();
        if self.display.playing {
            effects.push(Effect::StartPeriodic);
        }
    }

    /// A pause, seek or end: flush on the leading edge, coalesce the rest.
    fn trigger<P: PlaybackSurface>(&mut self, player: &mut P, effects: &mut Vec<Effect>) {
        match self.debounce {
            Debounce::Idle => {
                self.debounce = match self.flush(player) {
                    Some(save) => {
                        effects.push(save);
                        Debounce::Armed
                    }
                    None => Debounce::Coalesced,
                };
                effects.push(Effect::ScheduleDebounce);
            }
            Debounce::Armed | Debounce::Coalesced => {
                self.debounce = Debounce::Coalesced;
                effects.push(Effect::ScheduleDebounce);
            }
            Debounce::Deferred => {}
        }
    }

    fn flush<P: PlaybackSurface>(&mut self, player: &mut P) -> Option<Effect> {
        if self.state != SessionState::Ready {
            return None;
        }

        let video_id = self.video_id.clone()?;

        let mut update = ProgressUpdate::default()
            .with_intervals(player.played())
            .with_position(player.position());

        if let Some(duration) = valid_duration(player) {
            if duration != self.acknowledged_duration {
                update = update.with_duration(duration);
            }
        }

        Some(Effect::Save { video_id, update })
    }

    fn sync_display(&mut self) {
        self.display.video_id = self.video_id.clone();
        self.display.state = self.state;
    }
}

fn valid_duration<P: PlaybackSurface>(player: &P) -> Option<f64> {
    player
        .duration()
        .filter(|duration| duration.is_finite() && *duration > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::RawInterval;
    use crate::session::testing::FakePlayer;

    fn video() -> VideoId {
        "lecture-1".parse().unwrap()
    }

    fn saved(position: f64, duration: f64) -> ProgressView {
        ProgressView {
            last_watched_position: position,
            video_duration: duration,
            ..ProgressView::default()
        }
    }

    fn saves(effects: &[Effect]) -> Vec<&ProgressUpdate> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Save { update, .. } => Some(update),
                _ => None,
            })
            .collect()
    }

    /// A controller that is `Ready` on `lecture-1` with a paused player.
    fn ready(duration: f64) -> (Controller, FakePlayer) {
        let mut controller = Controller::new(SessionConfig::default());
        let mut player = FakePlayer::new(duration);

        controller.activate(video());
        controller.playback(PlaybackEvent::MetadataLoaded, &mut player);
        controller.fetch_resolved(&video(), Ok(saved(0.0, duration)), &mut player);
        assert_eq!(controller.state(), SessionState::Ready);

        (controller, player)
    }

    #[test]
    fn activation_fetches_and_resets() {
        let mut controller = Controller::new(SessionConfig::default());

        let effects = controller.activate(video());

        assert_eq!(effects, vec![
            Effect::StopPeriodic,
            Effect::CancelDebounce,
            Effect::Fetch { video_id: video() }
        ]);
        assert_eq!(controller.state(), SessionState::Loading);
        assert!(controller.activate(video()).is_empty());
    }

    #[test]
    fn nothing_is_flushed_before_ready() {
        let mut controller = Controller::new(SessionConfig::default());
        let mut player = FakePlayer::new(100.0);
        controller.activate(video());

        player.play();
        player.advance(10.0);
        let mut effects = controller.playback(PlaybackEvent::Play, &mut player);
        effects.extend(controller.tick(&mut player));
        player.pause();
        effects.extend(controller.playback(PlaybackEvent::Pause, &mut player));
        effects.extend(controller.debounce_elapsed(&mut player));

        assert!(saves(&effects).is_empty());
        assert_eq!(controller.state(), SessionState::Loading);
    }

    #[test]
    fn ready_needs_fetch_and_metadata_in_any_order() {
        let mut controller = Controller::new(SessionConfig::default());
        let mut player = FakePlayer::unloaded();
        controller.activate(video());

        controller.playback(PlaybackEvent::MetadataLoaded, &mut player);
        controller.fetch_resolved(&video(), Ok(saved(0.0, 100.0)), &mut player);
        assert_eq!(controller.state(), SessionState::Loading);

        player.set_duration(100.0);
        controller.playback(PlaybackEvent::MetadataLoaded, &mut player);
        assert_eq!(controller.state(), SessionState::Ready);
        assert_eq!(controller.display().duration, 100.0);
    }

    #[test]
    fn player_loaded_before_activation_is_ready_after_fetch() {
        let mut controller = Controller::new(SessionConfig::default());
        let mut player = FakePlayer::new(100.0);
        controller.activate(video());

        let effects = controller.fetch_resolved(&video(), Ok(saved(0.0, 100.0)), &mut player);
        assert_eq!(controller.state(), SessionState::Ready);
        assert!(effects.is_empty());
        assert_eq!(controller.display().duration, 100.0);

        player.play();
        player.advance(10.0);
        player.pause();
        let effects = controller.playback(PlaybackEvent::Pause, &mut player);
        assert_eq!(saves(&effects), vec![&ProgressUpdate::default()
            .with_intervals([RawInterval::new(0.0, 10.0)])
            .with_position(10.0)]);
    }

    #[test]
    fn resumes_from_saved_position() {
        let mut controller = Controller::new(SessionConfig::default());
        let mut player = FakePlayer::new(100.0);
        controller.activate(video());
        controller.playback(PlaybackEvent::MetadataLoaded, &mut player);

        controller.fetch_resolved(&video(), Ok(saved(42.0, 100.0)), &mut player);

        assert_eq!(player.position(), 42.0);
        assert_eq!(controller.display().current_time, 42.0);
    }

    #[test]
    fn does_not_seek_to_edges() {
        for position in [0.05, 100.0, 130.0] {
            let mut controller = Controller::new(SessionConfig::default());
            let mut player = FakePlayer::new(100.0);
            controller.activate(video());
            controller.playback(PlaybackEvent::MetadataLoaded, &mut player);

            controller.fetch_resolved(&video(), Ok(saved(position, 100.0)), &mut player);

            assert_eq!(player.position(), 0.0, "saved position {position}");
        }
    }

    #[test]
    fn back_fills_a_changed_duration() {
        let mut controller = Controller::new(SessionConfig::default());
        let mut player = FakePlayer::new(120.0);
        controller.activate(video());
        controller.playback(PlaybackEvent::MetadataLoaded, &mut player);

        let effects = controller.fetch_resolved(&video(), Ok(saved(30.0, 100.0)), &mut player);

        assert_eq!(saves(&effects), vec![&ProgressUpdate::default()
            .with_position(30.0)
            .with_duration(120.0)]);
    }

    #[test]
    fn failed_fetch_starts_empty_and_still_becomes_ready() {
        let mut controller = Controller::new(SessionConfig::default());
        let mut player = FakePlayer::new(100.0);
        controller.activate(video());
        controller.playback(PlaybackEvent::MetadataLoaded, &mut player);

        let error = RemoteError::Rejected {
            status: 500,
            message: "boom".to_string(),
        };
        let effects = controller.fetch_resolved(&video(), Err(error), &mut player);

        assert_eq!(controller.state(), SessionState::Ready);
        assert!(controller.display().last_error.is_some());
        // The empty default has no duration, so the first ready back-fills it.
        assert_eq!(saves(&effects).len(), 1);
    }

    #[test]
    fn play_starts_periodic_flush() {
        let (mut controller, mut player) = ready(100.0);

        player.play();
        let effects = controller.playback(PlaybackEvent::Play, &mut player);
        assert_eq!(effects, vec![Effect::StartPeriodic]);

        player.advance(5.0);
        let effects = controller.tick(&mut player);
        assert_eq!(saves(&effects), vec![&ProgressUpdate::default()
            .with_intervals([RawInterval::new(0.0, 5.0)])
            .with_position(5.0)]);
    }

    #[test]
    fn tick_while_paused_does_nothing() {
        let (mut controller, mut player) = ready(100.0);

        assert!(controller.tick(&mut player).is_empty());
    }

    #[test]
    fn pause_flushes_on_the_leading_edge() {
        let (mut controller, mut player) = ready(100.0);
        player.play();
        controller.playback(PlaybackEvent::Play, &mut player);
        player.advance(30.0);

        player.pause();
        let effects = controller.playback(PlaybackEvent::Pause, &mut player);

        assert_eq!(effects, vec![
            Effect::StopPeriodic,
            Effect::Save {
                video_id: video(),
                update: ProgressUpdate::default()
                    .with_intervals([RawInterval::new(0.0, 30.0)])
                    .with_position(30.0)
            },
            Effect::ScheduleDebounce
        ]);

        // Nothing new happened inside the window.
        assert!(controller.debounce_elapsed(&mut player).is_empty());
    }

    #[test]
    fn burst_of_triggers_is_coalesced_into_one_trailer() {
        let (mut controller, mut player) = ready(100.0);
        player.play();
        player.advance(10.0);
        player.pause();

        let first = controller.playback(PlaybackEvent::Pause, &mut player);
        assert_eq!(saves(&first).len(), 1);

        player.play();
        controller.playback(PlaybackEvent::Play, &mut player);
        player.advance(1.0);
        player.pause();
        let second = controller.playback(PlaybackEvent::Pause, &mut player);
        assert!(saves(&second).is_empty());
        assert!(second.contains(&Effect::ScheduleDebounce));

        let trailer = controller.debounce_elapsed(&mut player);
        assert_eq!(saves(&trailer), vec![&ProgressUpdate::default()
            .with_intervals([RawInterval::new(0.0, 11.0)])
            .with_position(11.0)]);

        // The window is quiet again, so the next pause flushes at once.
        player.play();
        player.advance(1.0);
        player.pause();
        assert_eq!(saves(&controller.playback(PlaybackEvent::Pause, &mut player)).len(), 1);
    }

    #[test]
    fn no_flush_while_seeking() {
        let (mut controller, mut player) = ready(100.0);
        player.play();
        controller.playback(PlaybackEvent::Play, &mut player);
        player.advance(20.0);

        let seeking = controller.playback(PlaybackEvent::Seeking, &mut player);
        assert_eq!(saves(&seeking).len(), 1);
        assert_eq!(controller.state(), SessionState::Seeking);

        // Scrubbing pauses the player and fires more seeks; none of it flushes.
        player.pause();
        assert!(controller.playback(PlaybackEvent::Pause, &mut player).is_empty());
        assert!(controller.playback(PlaybackEvent::Seeking, &mut player).is_empty());
        assert!(controller.tick(&mut player).is_empty());
    }

    #[test]
    fn trailer_due_during_seek_waits_for_seeked() {
        let (mut controller, mut player) = ready(100.0);
        player.play();
        controller.playback(PlaybackEvent::Play, &mut player);
        player.advance(10.0);
        player.pause();
        controller.playback(PlaybackEvent::Pause, &mut player);

        // A second trigger inside the window, then a seek that outlasts it.
        player.play();
        controller.playback(PlaybackEvent::Play, &mut player);
        player.advance(2.0);
        controller.playback(PlaybackEvent::Seeking, &mut player);
        assert!(controller.debounce_elapsed(&mut player).is_empty());

        player.jump(60.0);
        let seeked = controller.playback(PlaybackEvent::Seeked, &mut player);
        assert_eq!(seeked, vec![Effect::StartPeriodic, Effect::ScheduleDebounce]);
        assert_eq!(controller.display().current_time, 60.0);

        let trailer = controller.debounce_elapsed(&mut player);
        assert_eq!(saves(&trailer), vec![&ProgressUpdate::default()
            .with_intervals([RawInterval::new(0.0, 12.0)])
            .with_position(60.0)]);
    }

    #[test]
    fn ended_flushes_and_shows_full_time() {
        let (mut controller, mut player) = ready(100.0);
        player.play();
        controller.playback(PlaybackEvent::Play, &mut player);
        player.advance(100.0);
        player.pause();

        let effects = controller.playback(PlaybackEvent::Ended, &mut player);

        assert_eq!(effects[0], Effect::StopPeriodic);
        assert_eq!(saves(&effects).len(), 1);
        assert_eq!(controller.display().current_time, 100.0);
        assert!(!controller.display().playing);
    }

    #[test]
    fn duration_is_sent_only_until_acknowledged() {
        let (mut controller, mut player) = ready(100.0);
        player.set_duration(90.0);
        controller.playback(PlaybackEvent::MetadataLoaded, &mut player);
        player.play();
        player.advance(5.0);

        let first = controller.tick(&mut player);
        assert_eq!(saves(&first)[0].video_duration, Some(90.0));

        controller.save_resolved(&video(), Ok(saved(5.0, 90.0)));

        player.advance(5.0);
        let second = controller.tick(&mut player);
        assert_eq!(saves(&second)[0].video_duration, None);
    }

    #[test]
    fn server_response_overwrites_display() {
        let (mut controller, _player) = ready(100.0);
        let view = ProgressView {
            watched_intervals: WatchedSet::new()
                .merge(&[RawInterval::new(0.0, 30.0), RawInterval::new(60.0, 80.0)]),
            progress_percentage: 50.0,
            video_duration: 100.0,
            ..ProgressView::default()
        };

        controller.save_resolved(&video(), Ok(view.clone()));

        assert_eq!(controller.display().watched_intervals, view.watched_intervals);
        assert_eq!(controller.display().progress_percentage, 50.0);
    }

    #[test]
    fn conflict_is_surfaced_without_retry() {
        let (mut controller, _player) = ready(100.0);

        controller.save_resolved(&video(), Err(RemoteError::Conflict {
            message: "saved concurrently".to_string(),
        }));

        assert!(controller.display().last_error.is_some());
        assert_eq!(controller.state(), SessionState::Ready);
    }

    #[test]
    fn responses_for_a_previous_video_are_discarded() {
        let (mut controller, mut player) = ready(100.0);
        let next: VideoId = "lecture-2".parse().unwrap();
        controller.activate(next.clone());

        controller.save_resolved(&video(), Ok(ProgressView {
            progress_percentage: 99.0,
            ..ProgressView::default()
        }));
        let effects = controller.fetch_resolved(&video(), Ok(saved(50.0, 100.0)), &mut player);

        assert!(effects.is_empty());
        assert_eq!(controller.display().progress_percentage, 0.0);
        assert_eq!(controller.display().video_id, Some(next));
        assert_eq!(controller.state(), SessionState::Loading);
    }

    #[test]
    fn shutdown_cancels_timers() {
        let (mut controller, mut player) = ready(100.0);

        assert_eq!(controller.shutdown(), vec![Effect::StopPeriodic, Effect::CancelDebounce]);
        assert_eq!(controller.state(), SessionState::Idle);
        assert!(controller.tick(&mut player).is_empty());
    }
}
