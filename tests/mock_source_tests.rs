//! Scheduler runtime tests against fake playback sources
//!
//! All tests run on paused tokio time, so pauses and polling intervals are
//! exact and no test waits in real time.

use async_trait::async_trait;
use futures::future::join_all;
use shadowing::captions::Segment;
use shadowing::scheduler::{Phase, Settings};
use shadowing::source::{
    LoadStatus, PlaybackSource, PlayerApi, PolledSource, ProgressMode, Readiness, SdkInfo,
    SdkLoader, SourceEvent,
};
use shadowing::{Controller, SourceError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{self, Instant};

/// Let every spawned task drain its queue before asserting.
async fn settle() {
    time::sleep(Duration::from_millis(10)).await;
}

fn settings(repeat_count: u32) -> Settings {
    Settings {
        repeat_count,
        ..Settings::default()
    }
}

// ============================================================================
// Push Source Tests
// ============================================================================

mod push_source_tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Command {
        Seek(f64),
        Play,
        Pause,
    }

    /// A push source whose progress the test emits by hand.
    struct ManualSource {
        events: broadcast::Sender<SourceEvent>,
        commands: Mutex<Vec<Command>>,
        /// Number of upcoming pause requests to reject.
        rejected_pauses: AtomicUsize,
    }

    impl ManualSource {
        fn new() -> Arc<Self> {
            Self::rejecting_pauses(0)
        }

        fn rejecting_pauses(count: usize) -> Arc<Self> {
            let (events, _) = broadcast::channel(16);
            Arc::new(Self {
                events,
                commands: Mutex::new(Vec::new()),
                rejected_pauses: AtomicUsize::new(count),
            })
        }

        fn pause_attempts(&self) -> usize {
            self.commands()
                .iter()
                .filter(|c| **c == Command::Pause)
                .count()
        }

        fn emit(&self, position: f64) {
            let _ = self.events.send(SourceEvent::Progress(position));
        }

        fn fail(&self, error: SourceError) {
            let _ = self.events.send(SourceEvent::Error(error));
        }

        fn commands(&self) -> Vec<Command> {
            self.commands.lock().unwrap().clone()
        }

        fn record(&self, command: Command) {
            self.commands.lock().unwrap().push(command);
        }
    }

    #[async_trait]
    impl PlaybackSource for ManualSource {
        fn name(&self) -> &'static str {
            "manual"
        }

        fn progress_mode(&self) -> ProgressMode {
            ProgressMode::Push
        }

        fn subscribe(&self) -> broadcast::Receiver<SourceEvent> {
            self.events.subscribe()
        }

        async fn current_position(&self) -> Result<f64, SourceError> {
            Ok(0.0)
        }

        async fn seek(&self, seconds: f64) -> Result<(), SourceError> {
            self.record(Command::Seek(seconds));
            Ok(())
        }

        async fn play(&self) -> Result<(), SourceError> {
            self.record(Command::Play);
            Ok(())
        }

        async fn pause(&self) -> Result<(), SourceError> {
            self.record(Command::Pause);
            let rejected = self
                .rejected_pauses
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if rejected {
                return Err(SourceError::Transport("player busy".to_string()));
            }
            Ok(())
        }
    }

    fn lesson() -> Vec<Segment> {
        vec![
            Segment::new(0.0, 2.0, "A"),
            Segment::new(2.0, 5.0, "B"),
        ]
    }

    /// Attach and drive segment A to its first shadowing pause.
    async fn paused_on_first_segment(repeat_count: u32) -> (Arc<ManualSource>, Controller) {
        let source = ManualSource::new();
        let controller = Controller::attach(source.clone(), lesson(), settings(repeat_count)).unwrap();
        controller
            .wait_for(|p| p.phase == Phase::Playing)
            .await
            .unwrap();

        source.emit(0.1);
        source.emit(2.1);
        settle().await;
        assert_eq!(controller.projection().phase, Phase::PausedForShadowing);
        (source, controller)
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_starts_first_segment() {
        let source = ManualSource::new();
        let controller = Controller::attach(source.clone(), lesson(), settings(2)).unwrap();

        let projection = controller
            .wait_for(|p| p.phase == Phase::Playing)
            .await
            .unwrap();
        assert_eq!(projection.active_text.as_deref(), Some("A"));
        assert_eq!(source.commands(), vec![Command::Seek(0.0), Command::Play]);
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_progress_pauses_once() {
        let source = ManualSource::new();
        let controller = Controller::attach(source.clone(), lesson(), settings(2)).unwrap();
        controller
            .wait_for(|p| p.phase == Phase::Playing)
            .await
            .unwrap();

        source.emit(0.1);
        source.emit(2.1);
        source.emit(2.2);
        source.emit(2.3);
        settle().await;

        assert_eq!(
            source.commands(),
            vec![Command::Seek(0.0), Command::Play, Command::Pause]
        );
        let projection = controller.projection();
        assert_eq!(projection.phase, Phase::PausedForShadowing);
        assert_eq!(projection.repeat_index, 0);

        // One timer, so exactly one repeat after the 2s pause.
        time::sleep(Duration::from_secs(3)).await;
        assert_eq!(
            source.commands(),
            vec![
                Command::Seek(0.0),
                Command::Play,
                Command::Pause,
                Command::Seek(0.0),
                Command::Play,
            ]
        );
        assert_eq!(controller.projection().repeat_index, 1);
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_pause_is_retried_while_playback_continues() {
        let source = ManualSource::rejecting_pauses(1);
        let controller = Controller::attach(source.clone(), lesson(), settings(2)).unwrap();
        controller
            .wait_for(|p| p.phase == Phase::Playing)
            .await
            .unwrap();

        source.emit(0.1);
        source.emit(2.1);
        settle().await;
        assert_eq!(source.pause_attempts(), 1);
        assert_eq!(controller.projection().phase, Phase::PausedForShadowing);

        // The player ignored the pause and kept going.
        source.emit(2.35);
        settle().await;
        assert_eq!(source.pause_attempts(), 2);

        source.emit(2.35);
        settle().await;
        assert_eq!(source.pause_attempts(), 2);

        // Still one countdown from the first pause: a single repeat.
        time::sleep(Duration::from_secs(3)).await;
        let seeks = source
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::Seek(_)))
            .count();
        assert_eq!(seeks, 2);
        let projection = controller.projection();
        assert_eq!(projection.phase, Phase::Playing);
        assert_eq!(projection.repeat_index, 1);
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_cancels_pending_pause() {
        let (source, controller) = paused_on_first_segment(3).await;

        time::sleep(Duration::from_secs(1)).await;
        controller.set_repeat_count(2).unwrap();
        settle().await;

        let after_reconfigure = source.commands();
        assert_eq!(
            &after_reconfigure[3..],
            &[Command::Seek(0.0), Command::Play]
        );
        let projection = controller.projection();

        // Well past the original expiry: nothing moves.
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(source.commands(), after_reconfigure);
        assert_eq!(controller.projection(), projection);
        assert_eq!(projection.phase, Phase::Playing);
        assert_eq!(projection.repeat_index, 0);
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shadowing_change_keeps_running_pause() {
        let (_source, controller) = paused_on_first_segment(2).await;

        time::sleep(Duration::from_millis(500)).await;
        controller.set_shadowing_time(3.0).unwrap();

        time::sleep(Duration::from_millis(1400)).await;
        assert_eq!(controller.projection().phase, Phase::PausedForShadowing);

        time::sleep(Duration::from_millis(200)).await;
        let projection = controller.projection();
        assert_eq!(projection.phase, Phase::Playing);
        assert_eq!(projection.repeat_index, 1);
        assert_eq!(projection.shadowing_time, 3.0);
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_play_ignored_while_shadowing() {
        let (source, controller) = paused_on_first_segment(2).await;
        let before = source.commands();

        controller.play().unwrap();
        settle().await;
        assert_eq!(source.commands(), before);
        assert_eq!(controller.projection().phase, Phase::PausedForShadowing);
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_error_stops_everything() {
        let (source, controller) = paused_on_first_segment(2).await;
        let before = source.commands();

        source.fail(SourceError::Player {
            code: 101,
            message: "playback not allowed".to_string(),
        });
        let projection = controller
            .wait_for(|p| p.phase == Phase::Error)
            .await
            .unwrap();
        assert!(projection.error.unwrap().contains("playback not allowed"));

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(source.commands(), before);
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_releases_timer() {
        let (source, controller) = paused_on_first_segment(2).await;
        let before = source.commands();

        controller.shutdown().await;
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(source.commands(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_captions_restart() {
        let (source, controller) = paused_on_first_segment(2).await;

        controller
            .set_captions(vec![Segment::new(10.0, 11.0, "fresh start")])
            .unwrap();
        let projection = controller
            .wait_for(|p| p.active_text.as_deref() == Some("fresh start"))
            .await
            .unwrap();
        assert_eq!(projection.segment_count, 1);
        assert_eq!(source.commands().last(), Some(&Command::Play));
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_captions_stay_inert() {
        let source = ManualSource::new();
        let controller = Controller::attach(source.clone(), Vec::new(), settings(2)).unwrap();

        source.emit(1.0);
        time::sleep(Duration::from_secs(5)).await;

        let projection = controller.projection();
        assert_eq!(projection.phase, Phase::Idle);
        assert_eq!(projection.active_text, None);
        assert!(source.commands().is_empty());
        controller.shutdown().await;
    }
}

// ============================================================================
// Polled Source Tests
// ============================================================================

mod polled_source_tests {
    use super::*;

    #[derive(Default)]
    struct FakeClock {
        base: f64,
        anchor: Option<Instant>,
    }

    impl FakeClock {
        fn position(&self) -> f64 {
            match self.anchor {
                Some(anchor) => self.base + anchor.elapsed().as_secs_f64(),
                None => self.base,
            }
        }
    }

    /// A player SDK that advances in (paused) tokio time and records pauses.
    struct FakePlayer {
        loads: Arc<AtomicUsize>,
        load_error: Option<SourceError>,
        time_error: Option<SourceError>,
        clock: Mutex<FakeClock>,
        pauses: Mutex<Vec<f64>>,
    }

    impl FakePlayer {
        fn new(loads: Arc<AtomicUsize>) -> Self {
            Self {
                loads,
                load_error: None,
                time_error: None,
                clock: Mutex::new(FakeClock::default()),
                pauses: Mutex::new(Vec::new()),
            }
        }

        fn pauses(&self) -> Vec<f64> {
            self.pauses.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PlayerApi for FakePlayer {
        fn endpoint(&self) -> String {
            "fake://player".to_string()
        }

        async fn load(&self) -> Result<SdkInfo, SourceError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            time::sleep(Duration::from_millis(50)).await;
            match &self.load_error {
                Some(e) => Err(e.clone()),
                None => Ok(SdkInfo {
                    version: "fake-1".to_string(),
                }),
            }
        }

        async fn current_time(&self) -> Result<f64, SourceError> {
            if let Some(e) = &self.time_error {
                return Err(e.clone());
            }
            Ok(self.clock.lock().unwrap().position())
        }

        async fn seek_to(&self, seconds: f64) -> Result<(), SourceError> {
            let mut clock = self.clock.lock().unwrap();
            clock.base = seconds;
            if clock.anchor.is_some() {
                clock.anchor = Some(Instant::now());
            }
            Ok(())
        }

        async fn play(&self) -> Result<(), SourceError> {
            let mut clock = self.clock.lock().unwrap();
            if clock.anchor.is_none() {
                clock.anchor = Some(Instant::now());
            }
            Ok(())
        }

        async fn pause(&self) -> Result<(), SourceError> {
            let mut clock = self.clock.lock().unwrap();
            let position = clock.position();
            clock.base = position;
            clock.anchor = None;
            self.pauses.lock().unwrap().push(position);
            Ok(())
        }
    }

    fn polled(api: FakePlayer, loader: &Arc<SdkLoader>) -> Arc<PolledSource<FakePlayer>> {
        Arc::new(
            PolledSource::new(api)
                .with_loader(loader.clone())
                .with_interval(Duration::from_millis(300)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_polled_transition_waits_for_a_sample_past_the_end() {
        let loader = Arc::new(SdkLoader::new());
        let source = polled(FakePlayer::new(Arc::default()), &loader);
        let captions = vec![Segment::new(0.0, 2.05, "Nice to meet you")];

        let controller = Controller::attach(source.clone(), captions, settings(1)).unwrap();
        controller
            .wait_for(|p| p.phase == Phase::Playing)
            .await
            .unwrap();
        let started = Instant::now();

        controller
            .wait_for(|p| p.phase == Phase::PausedForShadowing)
            .await
            .unwrap();
        let latency = started.elapsed().as_secs_f64();

        // Eventual, and no later than one polling interval past the end.
        let paused_at = source.api().pauses()[0];
        assert!(paused_at > 2.05, "paused early at {paused_at}");
        assert!(paused_at <= 2.05 + 0.3 + 1e-6, "paused late at {paused_at}");
        assert!(latency > 2.05 && latency <= 2.05 + 0.3 + 1e-6);

        controller
            .wait_for(|p| p.phase == Phase::Ended)
            .await
            .unwrap();
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_repeated_segment_pauses_within_one_interval() {
        let loader = Arc::new(SdkLoader::new());
        let source = polled(FakePlayer::new(Arc::default()), &loader);
        let captions = vec![Segment::new(1.95, 2.05, "Hi")];
        let short = Settings {
            repeat_count: 2,
            shadowing_time: 0.5,
            min_duration: 0.0,
        };

        let controller = Controller::attach(source.clone(), captions, short).unwrap();
        controller
            .wait_for(|p| p.phase == Phase::Ended)
            .await
            .unwrap();

        // The first sample after each repeat's seek counts, so neither
        // repeat overruns by a second interval.
        let pauses = source.api().pauses();
        assert!(pauses.len() >= 2, "pauses: {pauses:?}");
        for paused_at in pauses {
            assert!(paused_at > 2.05, "paused early at {paused_at}");
            assert!(paused_at <= 2.05 + 0.3 + 1e-6, "paused late at {paused_at}");
        }
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_failure_is_terminal_and_shared() {
        let loader = Arc::new(SdkLoader::new());
        let loads = Arc::new(AtomicUsize::new(0));

        let mut api = FakePlayer::new(loads.clone());
        api.load_error = Some(SourceError::Load("script blocked".to_string()));
        let first = polled(api, &loader);

        let controller =
            Controller::attach(first.clone(), vec![Segment::new(0.0, 1.0, "hi")], settings(1))
                .unwrap();
        let projection = controller
            .wait_for(|p| p.phase == Phase::Error)
            .await
            .unwrap();
        assert!(projection.error.unwrap().contains("script blocked"));
        assert!(first.api().pauses().is_empty());

        // A second instance on the same endpoint gets the cached failure.
        let second = polled(FakePlayer::new(loads.clone()), &loader);
        assert_eq!(
            second.ready().await,
            Err(SourceError::Load("script blocked".to_string()))
        );
        assert!(matches!(second.readiness(), Readiness::Failed(_)));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_poll_error_moves_to_error() {
        let loader = Arc::new(SdkLoader::new());
        let mut api = FakePlayer::new(Arc::default());
        api.time_error = Some(SourceError::Player {
            code: 404,
            message: "media removed".to_string(),
        });
        let source = polled(api, &loader);

        let controller =
            Controller::attach(source, vec![Segment::new(0.0, 1.0, "hi")], settings(1)).unwrap();
        let projection = controller
            .wait_for(|p| p.phase == Phase::Error)
            .await
            .unwrap();
        assert!(projection.error.unwrap().contains("404"));
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_poll_errors_are_absorbed() {
        let loader = Arc::new(SdkLoader::new());
        let mut api = FakePlayer::new(Arc::default());
        api.time_error = Some(SourceError::Transport("connection reset".to_string()));
        let source = polled(api, &loader);

        let controller =
            Controller::attach(source, vec![Segment::new(0.0, 1.0, "hi")], settings(1)).unwrap();
        time::sleep(Duration::from_secs(3)).await;

        let projection = controller.projection();
        assert_eq!(projection.phase, Phase::Playing);
        assert_eq!(projection.error, None);
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_ready_loads_once() {
        let loader = Arc::new(SdkLoader::new());
        let loads = Arc::new(AtomicUsize::new(0));
        let sources: Vec<_> = (0..4)
            .map(|_| polled(FakePlayer::new(loads.clone()), &loader))
            .collect();

        let results = join_all(sources.iter().map(|s| s.ready())).await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(matches!(
            loader.status("fake://player"),
            LoadStatus::Loaded(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loader_waiters_share_one_outcome() {
        let loader = Arc::new(SdkLoader::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let waiters = (0..5).map(|_| {
            let loader = loader.clone();
            let calls = calls.clone();
            async move {
                loader
                    .load("https://player.example/api", || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        time::sleep(Duration::from_millis(100)).await;
                        Ok(SdkInfo {
                            version: "2.0".to_string(),
                        })
                    })
                    .await
            }
        });

        let results = join_all(waiters).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results
            .iter()
            .all(|r| r.as_ref().map(|info| info.version.as_str()) == Ok("2.0")));
    }
}
