use super::{PlaybackSource, ProgressMode, SourceEvent, EVENT_CAPACITY};
use crate::error::SourceError;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

/// Progress cadence of a browser media element's `timeupdate`.
pub const DEFAULT_TICK: Duration = Duration::from_millis(250);

#[derive(Debug)]
struct ClockState {
    duration: f64,
    /// Position at the last seek or pause.
    base: f64,
    /// Set while playing.
    anchor: Option<Instant>,
}

impl ClockState {
    fn position(&self) -> f64 {
        match self.anchor {
            Some(anchor) => (self.base + anchor.elapsed().as_secs_f64()).min(self.duration),
            None => self.base,
        }
    }

    fn is_playing(&self) -> bool {
        self.anchor.is_some()
    }
}

/// Silent playback source for text-only practice: a media clock that
/// advances in real time while playing and pushes progress on every tick.
/// Reaching the end pauses it and pushes [`SourceEvent::Ended`].
pub struct ClockSource {
    state: Arc<Mutex<ClockState>>,
    events: broadcast::Sender<SourceEvent>,
    ticker: JoinHandle<()>,
}

impl ClockSource {
    /// A clock over a timeline of known length. Must be called inside a
    /// tokio runtime.
    pub fn new(duration: f64) -> Self {
        Self::with_tick(duration, DEFAULT_TICK)
    }

    pub fn with_tick(duration: f64, tick: Duration) -> Self {
        let state = Arc::new(Mutex::new(ClockState {
            duration,
            base: 0.0,
            anchor: None,
        }));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let ticker = tokio::spawn(run_ticker(state.clone(), events.clone(), tick));

        Self {
            state,
            events,
            ticker,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_playing(&self) -> bool {
        self.lock().is_playing()
    }

    pub fn duration(&self) -> f64 {
        self.lock().duration
    }
}

impl Drop for ClockSource {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}

async fn run_ticker(
    state: Arc<Mutex<ClockState>>,
    events: broadcast::Sender<SourceEvent>,
    tick: Duration,
) {
    let mut interval = time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        let (position, ended) = {
            let mut guard = state.lock().unwrap_or_else(|e| e.into_inner());
            if !guard.is_playing() {
                continue;
            }
            let position = guard.position();
            let ended = position >= guard.duration;
            if ended {
                debug!("Media clock reached the end at {:.3}s", position);
                guard.base = position;
                guard.anchor = None;
            }
            (position, ended)
        };

        // No receivers just means nobody is attached yet.
        let _ = events.send(SourceEvent::Progress(position));
        if ended {
            let _ = events.send(SourceEvent::Ended);
        }
    }
}

#[async_trait]
impl PlaybackSource for ClockSource {
    fn name(&self) -> &'static str {
        "media clock"
    }

    fn progress_mode(&self) -> ProgressMode {
        ProgressMode::Push
    }

    fn subscribe(&self) -> broadcast::Receiver<SourceEvent> {
        self.events.subscribe()
    }

    async fn ready(&self) -> Result<(), SourceError> {
        let duration = self.lock().duration;
        if duration.is_finite() && duration > 0.0 {
            Ok(())
        } else {
            Err(SourceError::Load(format!(
                "timeline has no playable length ({duration}s)"
            )))
        }
    }

    async fn current_position(&self) -> Result<f64, SourceError> {
        Ok(self.lock().position())
    }

    async fn seek(&self, seconds: f64) -> Result<(), SourceError> {
        let mut guard = self.lock();
        guard.base = seconds.clamp(0.0, guard.duration.max(0.0));
        if guard.is_playing() {
            guard.anchor = Some(Instant::now());
        }
        Ok(())
    }

    async fn play(&self) -> Result<(), SourceError> {
        let at_end = {
            let mut guard = self.lock();
            let at_end = guard.base >= guard.duration;
            if !guard.is_playing() && !at_end {
                guard.anchor = Some(Instant::now());
            }
            at_end
        };
        // Nothing left to play: report the end instead of sitting silent.
        if at_end {
            let _ = self.events.send(SourceEvent::Ended);
        }
        Ok(())
    }

    async fn pause(&self) -> Result<(), SourceError> {
        let mut guard = self.lock();
        if guard.is_playing() {
            guard.base = guard.position();
            guard.anchor = None;
        }
        Ok(())
    }
}
