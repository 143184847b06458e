//! A running player: one control task owning the index, scheduler and loop.

use crate::config::{Config, IndexConfig, PlaybackConfig};
use crate::error::{PlayerError, Result};
use crate::events::{EventEmitter, PlayerEvent};
use crate::highlight::WordChanged;
use crate::index::WordIndex;
use crate::playback::{AudioSource, LoopController, LoopUpdate, PlaybackEvent, PlaybackLoop};
use crate::scheduler::{SampleKind, TickMonitor, TickOutcome, TickStats, Ticker, TimingScheduler};
use crate::transcript::{Transcript, Word};
use futures::future::{BoxFuture, FutureExt};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const COMMAND_CAPACITY: usize = 32;

type PendingSeek = BoxFuture<'static, (f64, Result<()>)>;

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub playing: bool,
    pub last_time: Option<f64>,
    pub current: Option<Word>,
    pub looping: bool,
    pub playback_loop: Option<PlaybackLoop>,
    pub degraded: bool,
    pub word_count: usize,
    pub playback_rate: f64,
}

enum Command {
    Play,
    Pause,
    Seek(f64),
    Jump(f64),
    SeekFraction(f64),
    SetRate {
        rate: f64,
        reply: oneshot::Sender<Result<()>>,
    },
    SetLooping(bool),
    Load {
        transcript: Transcript,
        reply: oneshot::Sender<Result<()>>,
    },
    Snapshot(oneshot::Sender<SessionSnapshot>),
}

/// Handle to a running player session.
///
/// Dropping the handle lets the control task finish once the command
/// channel drains; `shutdown` stops it right away and returns tick stats.
pub struct PlayerSession {
    commands: mpsc::Sender<Command>,
    events: Arc<EventEmitter>,
    cancel: CancellationToken,
    task: JoinHandle<TickStats>,
    load_error: Option<PlayerError>,
}

impl PlayerSession {
    /// Start a session over `transcript`. Must be called inside a runtime.
    ///
    /// A transcript that cannot be indexed is replaced by an empty one; the
    /// error is kept in `load_error` and the session stays usable.
    pub fn start(transcript: Transcript, source: Arc<dyn AudioSource>, config: &Config) -> Self {
        let (index, transcript, load_error) = match build_index(&transcript, &config.index) {
            Ok(index) => (index, transcript, None),
            Err(e) => {
                warn!("Transcript rejected, starting with an empty one: {}", e);
                (WordIndex::new(config.index.clone()), Transcript::empty(), Some(e))
            }
        };

        info!(
            "Starting session: {} words, {} tick mode every {}ms",
            index.len(),
            config.scheduler.tick_mode,
            config.scheduler.tick_interval_ms
        );

        let events = Arc::new(EventEmitter::new());
        let cancel = CancellationToken::new();
        let (commands, receiver) = mpsc::channel(COMMAND_CAPACITY);

        let controller = Controller {
            playback: config.playback.clone(),
            index_config: config.index.clone(),
            ticker: Ticker::new(&config.scheduler),
            scheduler: TimingScheduler::new(index, config.scheduler.clone())
                .with_monitor(TickMonitor::new()),
            looping: LoopController::new(Arc::new(transcript)),
            playback_events: source.subscribe(),
            source,
            events: events.clone(),
            pending_seek: None,
            pending_play: None,
        };
        let task = tokio::spawn(controller.run(receiver, cancel.clone()));

        Self {
            commands,
            events,
            cancel,
            task,
            load_error,
        }
    }

    /// Start a session over the transcript file at `path`.
    pub fn open(path: &Path, source: Arc<dyn AudioSource>, config: &Config) -> Self {
        match Transcript::load(path) {
            Ok(transcript) => Self::start(transcript, source, config),
            Err(e) => {
                warn!("Could not load transcript {:?}: {}", path, e);
                let mut session = Self::start(Transcript::empty(), source, config);
                session.load_error = Some(e);
                session
            }
        }
    }

    /// The error that replaced the initial transcript with an empty one.
    pub fn load_error(&self) -> Option<&PlayerError> {
        self.load_error.as_ref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    pub async fn play(&self) -> Result<()> {
        self.send(Command::Play).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(Command::Pause).await
    }

    /// Request a seek. Completion is reported through events; a newer seek
    /// supersedes one still in flight.
    pub async fn seek(&self, time: f64) -> Result<()> {
        self.send(Command::Seek(time)).await
    }

    /// Seek relative to the current position; negative jumps back.
    pub async fn jump(&self, seconds: f64) -> Result<()> {
        self.send(Command::Jump(seconds)).await
    }

    /// Seek to a fraction of the media duration, `0.0` to `1.0`.
    pub async fn seek_fraction(&self, fraction: f64) -> Result<()> {
        self.send(Command::SeekFraction(fraction)).await
    }

    pub async fn set_playback_rate(&self, rate: f64) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(Command::SetRate { rate, reply }).await?;
        response.await.map_err(|_| PlayerError::SessionClosed)?
    }

    pub async fn set_looping(&self, enabled: bool) -> Result<()> {
        self.send(Command::SetLooping(enabled)).await
    }

    /// Replace the transcript. On failure the current one stays in place.
    pub async fn load(&self, transcript: Transcript) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Load { transcript, reply }).await?;
        response.await.map_err(|_| PlayerError::SessionClosed)?
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Snapshot(reply)).await?;
        response.await.map_err(|_| PlayerError::SessionClosed)
    }

    /// Stop the control task and return what the tick monitor observed.
    pub async fn shutdown(self) -> Result<TickStats> {
        self.cancel.cancel();
        self.task.await.map_err(|e| {
            warn!("Session task ended abnormally: {}", e);
            PlayerError::SessionClosed
        })
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| PlayerError::SessionClosed)
    }
}

fn build_index(transcript: &Transcript, config: &IndexConfig) -> Result<WordIndex> {
    WordIndex::from_words(transcript.words()?, config.clone())
}

struct Controller {
    playback: PlaybackConfig,
    index_config: IndexConfig,
    source: Arc<dyn AudioSource>,
    playback_events: broadcast::Receiver<PlaybackEvent>,
    scheduler: TimingScheduler,
    looping: LoopController,
    ticker: Ticker,
    events: Arc<EventEmitter>,
    pending_seek: Option<PendingSeek>,
    pending_play: Option<JoinHandle<()>>,
}

impl Controller {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>, cancel: CancellationToken) -> TickStats {
        let mut source_open = true;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },

                event = self.playback_events.recv(), if source_open => match event {
                    Ok(event) => self.handle_playback(event),
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Missed {} playback notifications", skipped);
                    }
                    Err(RecvError::Closed) => {
                        warn!("Audio source stopped sending notifications");
                        source_open = false;
                    }
                },

                (target, result) = next_seek(&mut self.pending_seek), if self.pending_seek.is_some() => {
                    self.pending_seek = None;
                    self.finish_seek(target, result);
                }

                _ = self.ticker.tick(), if self.scheduler.is_playing() => {
                    self.sample(SampleKind::Tick);
                }
            }
        }

        if let Some(play) = self.pending_play.take() {
            play.abort();
        }
        debug!("Session control task stopped");
        self.scheduler
            .take_monitor()
            .map(|mut monitor| monitor.stop())
            .unwrap_or_default()
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Play => self.play(),
            Command::Pause => {
                if let Some(play) = self.pending_play.take() {
                    play.abort();
                }
                self.source.pause();
                self.scheduler.set_playing(false);
            }
            Command::Seek(time) => self.seek(time),
            Command::Jump(seconds) => {
                let from = self
                    .source
                    .current_time()
                    .ok()
                    .or(self.scheduler.last_time())
                    .unwrap_or(0.0);
                debug!("Jumping {:+.2}s from {:.3}s", seconds, from);
                self.seek(from + seconds);
            }
            Command::SeekFraction(fraction) => {
                self.seek(fraction.clamp(0.0, 1.0) * self.source.duration());
            }
            Command::SetRate { rate, reply } => {
                let result = self.source.set_playback_rate(rate);
                match &result {
                    Ok(()) => info!("Playback rate set to {}x", rate),
                    Err(e) => warn!("Playback rate unchanged: {}", e),
                }
                let _ = reply.send(result);
            }
            Command::SetLooping(enabled) => {
                let update = self.looping.set_looping(enabled, self.source.as_ref());
                self.publish_loop(update);
            }
            Command::Load { transcript, reply } => {
                let _ = reply.send(self.load(transcript));
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn play(&mut self) {
        if self.pending_play.as_ref().is_some_and(|play| !play.is_finished()) {
            return;
        }

        let source = self.source.clone();
        let ready_timeout = self.playback.ready_timeout();
        self.pending_play = Some(tokio::spawn(async move {
            if tokio::time::timeout(ready_timeout, source.wait_ready())
                .await
                .is_err()
            {
                warn!(
                    "Audio not ready after {}ms, trying to play anyway",
                    ready_timeout.as_millis()
                );
            }
            if let Err(e) = source.play() {
                warn!("Could not start playback: {}", e);
            }
        }));
    }

    fn seek(&mut self, time: f64) {
        if !time.is_finite() {
            warn!("Ignoring seek to invalid time {}", time);
            self.events.emit(PlayerEvent::SeekFailed {
                target: time,
                reason: "invalid seek target".to_string(),
            });
            return;
        }

        let duration = self.source.duration();
        let target = if duration > 0.0 {
            time.clamp(0.0, duration)
        } else {
            time.max(0.0)
        };

        if self.pending_seek.is_some() {
            debug!("Seek to {:.3}s supersedes the one in flight", target);
        }
        self.pending_seek = Some(seek_and_confirm(
            self.source.clone(),
            target,
            self.playback.clone(),
        ));
    }

    fn finish_seek(&mut self, target: f64, result: Result<()>) {
        if let Err(e) = result {
            warn!("Seek to {:.3}s failed: {}", target, e);
            self.events.emit(PlayerEvent::SeekFailed {
                target,
                reason: e.to_string(),
            });
        }
        // Resolve right away either way, from wherever the source ended up.
        self.sample(SampleKind::Seek);
    }

    fn handle_playback(&mut self, event: PlaybackEvent) {
        match event {
            PlaybackEvent::Play => {
                self.scheduler.set_playing(true);
                self.sample(SampleKind::Resume);
                self.ticker.reset();
            }
            PlaybackEvent::Pause => self.scheduler.set_playing(false),
            PlaybackEvent::Ended => {
                info!("Playback reached the end");
                self.scheduler.set_playing(false);
            }
            PlaybackEvent::Seeked { .. } => {
                self.sample(SampleKind::Seek);
                self.ticker.reset();
            }
        }
    }

    fn load(&mut self, transcript: Transcript) -> Result<()> {
        let index = build_index(&transcript, &self.index_config).map_err(|e| {
            warn!("Transcript rejected, keeping the current one: {}", e);
            e
        })?;
        info!("Loaded transcript with {} words", index.len());

        let cleared = self.scheduler.replace_index(index);
        let update = self.looping.reset(Arc::new(transcript), self.source.as_ref());
        if let Some(change) = cleared {
            self.events.emit(PlayerEvent::WordChanged(change));
        }
        self.publish_loop(update);
        self.sample(SampleKind::Seek);
        Ok(())
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            playing: self.scheduler.is_playing(),
            last_time: self.scheduler.last_time(),
            current: self.scheduler.current_word().cloned(),
            looping: self.looping.is_active(),
            playback_loop: self.looping.playback_loop(),
            degraded: self.scheduler.is_degraded(),
            word_count: self.scheduler.index().len(),
            playback_rate: self.source.playback_rate(),
        }
    }

    fn sample(&mut self, kind: SampleKind) {
        let was_degraded = self.scheduler.is_degraded();
        let outcome = self.scheduler.sample(self.source.current_time(), kind);

        match outcome {
            TickOutcome::Changed(change) => self.publish(change),
            TickOutcome::Failed { consecutive, .. } => {
                if !was_degraded && self.scheduler.is_degraded() {
                    self.events.emit(PlayerEvent::Degraded {
                        consecutive_failures: consecutive,
                    });
                }
            }
            TickOutcome::Idle | TickOutcome::Skipped | TickOutcome::Unchanged { .. } => {}
        }

        if was_degraded && !self.scheduler.is_degraded() {
            self.events.emit(PlayerEvent::Recovered);
        }
    }

    fn publish(&mut self, change: WordChanged) {
        let update = self.looping.on_word_changed(&change, self.source.as_ref());
        self.events.emit(PlayerEvent::WordChanged(change));
        self.publish_loop(update);
    }

    fn publish_loop(&self, update: LoopUpdate) {
        match update {
            LoopUpdate::Armed(sentence) => {
                self.events.emit(PlayerEvent::LoopArmed {
                    start: sentence.start,
                    end: sentence.end,
                });
            }
            LoopUpdate::Cleared => {
                self.events.emit(PlayerEvent::LoopCleared);
            }
            LoopUpdate::Kept | LoopUpdate::Pending => {}
        }
    }
}

async fn next_seek(pending: &mut Option<PendingSeek>) -> (f64, Result<()>) {
    match pending.as_mut() {
        Some(seek) => seek.await,
        None => std::future::pending().await,
    }
}

/// Seek, then wait until the source reports a position near the target.
fn seek_and_confirm(source: Arc<dyn AudioSource>, target: f64, playback: PlaybackConfig) -> PendingSeek {
    async move {
        let waited = playback.seek_timeout();
        let confirmed =
            tokio::time::timeout(waited, confirm_seek(source.as_ref(), target, &playback)).await;

        let result = match confirmed {
            Ok(result) => result,
            Err(_) => Err(PlayerError::SeekTimeout { target, waited }),
        };
        (target, result)
    }
    .boxed()
}

async fn confirm_seek(source: &dyn AudioSource, target: f64, playback: &PlaybackConfig) -> Result<()> {
    source.seek(target).await?;
    loop {
        // A failed read is just an unconfirmed poll.
        if let Ok(position) = source.current_time() {
            if (position - target).abs() < playback.seek_tolerance {
                return Ok(());
            }
        }
        tokio::time::sleep(playback.seek_poll()).await;
    }
}
