//! Drives a [`SchedulerState`] against a live playback source.
//!
//! One task owns the state. Commands from the controller, progress from the
//! source, timer expiries and source errors are all funnelled into it as
//! [`Signal`]s and handled strictly one at a time, so no transition ever
//! observes another half-applied.

use super::machine::{Effect, Projection, SchedulerState, Signal};
use super::timer::PauseTimer;
use super::Settings;
use crate::captions::Segment;
use crate::error::{Result, ShadowError};
use crate::source::{PlaybackSource, ProgressMode, SourceEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Owning handle to a running scheduler task.
pub struct SchedulerHandle {
    commands: mpsc::UnboundedSender<Signal>,
    projection: watch::Receiver<Projection>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Start driving `source` through `captions`. Must be called inside a
    /// tokio runtime.
    pub fn spawn(
        source: Arc<dyn PlaybackSource>,
        captions: Vec<Segment>,
        settings: Settings,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let state = SchedulerState::new(captions, settings);
        let (projection_tx, projection) = watch::channel(state.projection());

        let runtime = Runtime {
            source,
            state,
            commands: command_rx,
            internal_tx,
            internal_rx,
            projection: projection_tx,
            timer: None,
            forwarder: None,
            poller: None,
            readiness: None,
        };
        let task = tokio::spawn(runtime.run());

        Self {
            commands,
            projection,
            task,
        }
    }

    pub(crate) fn send(&self, signal: Signal) -> Result<()> {
        self.commands
            .send(signal)
            .map_err(|_| ShadowError::SchedulerClosed)
    }

    pub fn projection(&self) -> Projection {
        self.projection.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Projection> {
        self.projection.clone()
    }

    /// Detach from the source and wait for the task to release everything.
    pub async fn detach(self) {
        let _ = self.commands.send(Signal::Detach);
        if let Err(e) = self.task.await {
            warn!("Scheduler task ended abnormally: {}", e);
        }
    }
}

struct Runtime {
    source: Arc<dyn PlaybackSource>,
    state: SchedulerState,
    commands: mpsc::UnboundedReceiver<Signal>,
    internal_tx: mpsc::UnboundedSender<Signal>,
    internal_rx: mpsc::UnboundedReceiver<Signal>,
    projection: watch::Sender<Projection>,
    timer: Option<PauseTimer>,
    forwarder: Option<JoinHandle<()>>,
    poller: Option<JoinHandle<()>>,
    readiness: Option<JoinHandle<()>>,
}

impl Runtime {
    async fn run(mut self) {
        info!("Attaching scheduler to {}", self.source.name());

        // Subscribe before waiting on readiness so a load failure is not missed.
        self.forwarder = Some(tokio::spawn(forward_events(
            self.source.subscribe(),
            self.internal_tx.clone(),
        )));
        self.readiness = Some(tokio::spawn(await_ready(
            self.source.clone(),
            self.internal_tx.clone(),
        )));

        loop {
            let signal = tokio::select! {
                Some(signal) = self.internal_rx.recv() => signal,
                command = self.commands.recv() => command.unwrap_or(Signal::Detach),
            };

            let detaching = matches!(signal, Signal::Detach);
            self.dispatch(signal).await;
            if detaching {
                break;
            }
        }

        self.teardown();
    }

    async fn dispatch(&mut self, signal: Signal) {
        let attaching = matches!(signal, Signal::Attached);
        if let Signal::TimerExpired(id) = &signal {
            if self.timer.as_ref().map(PauseTimer::id) == Some(*id) {
                self.timer = None;
            }
        }

        let effects = self.state.handle(signal);
        if attaching {
            self.start_polling();
        }
        self.apply(effects).await;
        self.publish();
    }

    async fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Seek(position) => {
                    if let Err(e) = self.source.seek(position).await {
                        warn!("Seek to {:.3}s failed: {}", position, e);
                    }
                }
                Effect::Play => {
                    if let Err(e) = self.source.play().await {
                        warn!("Play failed: {}", e);
                    }
                }
                Effect::Pause => {
                    if let Err(e) = self.source.pause().await {
                        warn!("Pause failed: {}", e);
                        let _ = self.internal_tx.send(Signal::PauseFailed);
                    }
                }
                Effect::StartTimer { id, duration } => {
                    let tx = self.internal_tx.clone();
                    // Replacing the slot aborts any previous countdown.
                    self.timer = Some(PauseTimer::start(id, duration, move |id| {
                        let _ = tx.send(Signal::TimerExpired(id));
                    }));
                }
                Effect::CancelTimer(id) => {
                    if let Some(timer) = self.timer.take() {
                        debug!("Cancelling pause timer {:?}", id);
                        timer.cancel();
                    }
                }
                Effect::Report(e) => {
                    error!("{} failed: {}", self.source.name(), e);
                }
            }
        }
    }

    fn start_polling(&mut self) {
        if self.poller.is_some() {
            return;
        }
        if let ProgressMode::Poll(period) = self.source.progress_mode() {
            debug!(
                "Sampling {} every {}ms",
                self.source.name(),
                period.as_millis()
            );
            self.poller = Some(tokio::spawn(poll_position(
                self.source.clone(),
                self.internal_tx.clone(),
                period,
            )));
        }
    }

    fn publish(&self) {
        let next = self.state.projection();
        self.projection.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn teardown(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        for task in [
            self.forwarder.take(),
            self.poller.take(),
            self.readiness.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }
        info!("Scheduler detached from {}", self.source.name());
    }
}

async fn await_ready(source: Arc<dyn PlaybackSource>, tx: mpsc::UnboundedSender<Signal>) {
    let signal = match source.ready().await {
        Ok(()) => Signal::Attached,
        Err(e) => Signal::SourceFailed(e),
    };
    let _ = tx.send(signal);
}

async fn forward_events(
    mut events: broadcast::Receiver<SourceEvent>,
    tx: mpsc::UnboundedSender<Signal>,
) {
    loop {
        let signal = match events.recv().await {
            Ok(SourceEvent::Progress(position)) => Signal::Progress(position),
            Ok(SourceEvent::Ended) => Signal::MediaEnded,
            Ok(SourceEvent::Error(e)) => Signal::SourceFailed(e),
            Err(RecvError::Lagged(skipped)) => {
                debug!("Dropped {} stale source events", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        if tx.send(signal).is_err() {
            break;
        }
    }
}

/// Sample a source that has no progress events. Missed ticks are skipped
/// rather than bunched up.
async fn poll_position(
    source: Arc<dyn PlaybackSource>,
    tx: mpsc::UnboundedSender<Signal>,
    period: Duration,
) {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        match source.current_position().await {
            Ok(position) => {
                if tx.send(Signal::Progress(position)).is_err() {
                    break;
                }
            }
            Err(e) => debug!("Position sample failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Phase;
    use crate::source::ClockSource;

    fn lesson() -> Vec<Segment> {
        vec![
            Segment::new(0.0, 1.0, "one"),
            Segment::new(1.0, 2.0, "two"),
        ]
    }

    fn settings(repeat_count: u32) -> Settings {
        Settings {
            repeat_count,
            ..Settings::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_lesson_to_the_end() {
        let clock = Arc::new(ClockSource::with_tick(3.0, Duration::from_millis(50)));
        let handle = SchedulerHandle::spawn(clock.clone(), lesson(), settings(2));
        let mut updates = handle.subscribe();

        let ended = updates
            .wait_for(|p| p.phase == Phase::Ended)
            .await
            .unwrap()
            .clone();
        assert_eq!(ended.segment_index, 2);
        assert_eq!(ended.active_text, None);
        assert!(!clock.is_playing());

        handle.detach().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_caption_ending_with_the_media_reaches_the_end() {
        let clock = Arc::new(ClockSource::with_tick(2.0, Duration::from_millis(50)));
        let handle = SchedulerHandle::spawn(clock.clone(), lesson(), settings(2));
        let mut updates = handle.subscribe();

        let ended = updates
            .wait_for(|p| p.phase == Phase::Ended)
            .await
            .unwrap()
            .clone();
        assert_eq!(ended.segment_index, 2);
        assert!(!clock.is_playing());

        handle.detach().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_projection_starts_idle() {
        let clock = Arc::new(ClockSource::new(3.0));
        let handle = SchedulerHandle::spawn(clock, lesson(), settings(1));
        let first = handle.projection();
        assert_eq!(first.segment_count, 2);
        assert_eq!(first.repeat_count, 1);
        handle.detach().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_after_detach_fails() {
        let clock = Arc::new(ClockSource::new(3.0));
        let handle = SchedulerHandle::spawn(clock, lesson(), settings(1));
        let commands = handle.commands.clone();
        handle.detach().await;
        assert!(commands.send(Signal::ManualPlay).is_err());
    }
}
