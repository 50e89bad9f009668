use std::future::pending;

use tokio::select;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant, Interval};

use super::{Controller, Effect, PlaybackEvent, PlaybackSurface, ProgressDisplay, ProgressRemote, RemoteError};
use crate::config::SessionConfig;
use crate::model::{ProgressView, VideoId};
use crate::time::timer;

#[derive(Debug)]
enum Message {
    Activate(VideoId),
    Playback(PlaybackEvent),
    Stop(oneshot::Sender<()>),
}

#[derive(Debug)]
enum Outcome {
    Fetched(VideoId, Result<ProgressView, RemoteError>),
    Saved(VideoId, Result<ProgressView, RemoteError>),
}

/// Runs a [Controller] against a player and a remote on a background task.
pub struct Session<P, R> {
    controller: Controller,
    player: P,
    remote: R,
    config: SessionConfig,
    periodic: Option<Interval>,
    debounce: Option<Instant>,
    outcomes: mpsc::UnboundedSender<Outcome>,
    display: watch::Sender<ProgressDisplay>,
}

impl<P: PlaybackSurface, R: ProgressRemote> Session<P, R> {
    pub fn spawn(player: P, remote: R, config: SessionConfig) -> SessionHandle {
        let (tx, messages) = mpsc::unbounded_channel();
        let (outcomes, results) = mpsc::unbounded_channel();
        let (display, display_rx) = watch::channel(ProgressDisplay::default());

        let session = Session {
            controller: Controller::new(config),
            player,
            remote,
            config,
            periodic: None,
            debounce: None,
            outcomes,
            display,
        };

        let task = tokio::spawn(session.run(messages, results));

        SessionHandle {
            tx,
            display: display_rx,
            task,
        }
    }

    async fn run(mut self, mut messages: mpsc::UnboundedReceiver<Message>, mut results: mpsc::UnboundedReceiver<Outcome>) {
        tracing::info!(flush_interval = ?self.config.flush_interval, debounce = ?self.config.debounce, "start progress session");

        loop {
            let effects = select! {
                message = messages.recv() => match message {
                    Some(Message::Activate(video_id)) => self.controller.activate(video_id),
                    Some(Message::Playback(event)) => self.controller.playback(event, &mut self.player),
                    Some(Message::Stop(done)) => {
                        let effects = self.controller.shutdown();
                        self.apply(effects);
                        self.publish();
                        let _ = done.send(());
                        break;
                    }
                    None => {
                        self.controller.shutdown();
                        break;
                    }
                },
                _ = tick(&mut self.periodic) => self.controller.tick(&mut self.player),
                _ = elapsed(self.debounce) => {
                    self.debounce = None;
                    self.controller.debounce_elapsed(&mut self.player)
                },
                Some(outcome) = results.recv() => match outcome {
                    Outcome::Fetched(video_id, result) => {
                        self.controller.fetch_resolved(&video_id, result, &mut self.player)
                    }
                    Outcome::Saved(video_id, result) => {
                        self.controller.save_resolved(&video_id, result);
                        Vec::new()
                    }
                },
            };

            self.apply(effects);
            self.publish();
        }

        tracing::info!("progress session stopped");
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Fetch { video_id } => {
                    let remote = self.remote.clone();
                    let outcomes = self.outcomes.clone();
                    tokio::spawn(async move {
                        let result = remote.fetch(&video_id).await;
                        let _ = outcomes.send(Outcome::Fetched(video_id, result));
                    });
                }
                Effect::Save { video_id, update } => {
                    tracing::debug!(%video_id, update = ?update, "flush progress");
                    let remote = self.remote.clone();
                    let outcomes = self.outcomes.clone();
                    tokio::spawn(async move {
                        let result = remote.save(&video_id, &update).await;
                        let _ = outcomes.send(Outcome::Saved(video_id, result));
                    });
                }
                Effect::StartPeriodic => self.periodic = Some(timer(self.config.flush_interval)),
                Effect::StopPeriodic => self.periodic = None,
                Effect::ScheduleDebounce => self.debounce = Some(Instant::now() + self.config.debounce),
                Effect::CancelDebounce => self.debounce = None,
            }
        }
    }

    fn publish(&self) {
        let display = self.controller.display();
        self.display.send_if_modified(|current| {
            if current == display {
                return false;
            }
            *current = display.clone();
            true
        });
    }
}

async fn tick(periodic: &mut Option<Interval>) {
    match periodic {
        Some(periodic) => {
            periodic.tick().await;
        }
        None => pending().await,
    }
}

async fn elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

/// Control side of a running [Session].
#[derive(Debug)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Message>,
    display: watch::Receiver<ProgressDisplay>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn activate(&self, video_id: VideoId) {
        let _ = self.tx.send(Message::Activate(video_id));
    }

    pub fn playback(&self, event: PlaybackEvent) {
        let _ = self.tx.send(Message::Playback(event));
    }

    /// Display state, updated after every handled event.
    pub fn display(&self) -> watch::Receiver<ProgressDisplay> {
        self.display.clone()
    }

    /// Cancels the timers and waits for the session task to finish.
    ///
    /// Saves already in flight still reach the server.
    pub async fn shutdown(self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(Message::Stop(done)).is_ok() {
            let _ = wait.await;
        }

        if let Err(error) = self.task.await {
            tracing::error!(error = ?error, "progress session task failed");
        }
    }
}
