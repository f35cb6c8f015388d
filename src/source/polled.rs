use super::loader::{SdkInfo, SdkLoader};
use super::{PlaybackSource, ProgressMode, SourceEvent, DEFAULT_POLL_INTERVAL, EVENT_CAPACITY};
use crate::error::SourceError;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error};

/// The asynchronous SDK surface of an embeddable third-party player.
///
/// Implementations only translate calls; readiness, error fan-out and
/// polling cadence are handled by [`PolledSource`].
#[async_trait]
pub trait PlayerApi: Send + Sync {
    /// Identifies the SDK instance for single-flight loading.
    fn endpoint(&self) -> String;

    /// Make the SDK usable. Called at most once per endpoint per process.
    async fn load(&self) -> Result<SdkInfo, SourceError>;

    async fn current_time(&self) -> Result<f64, SourceError>;

    async fn seek_to(&self, seconds: f64) -> Result<(), SourceError>;

    async fn play(&self) -> Result<(), SourceError>;

    async fn pause(&self) -> Result<(), SourceError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// SDK not yet available; commands are rejected.
    Loading,
    /// Player instantiated; commands are accepted.
    Ready,
    /// Load failed or the player reported a fatal error.
    Failed(SourceError),
}

/// Polled playback source: wraps a [`PlayerApi`] with no progress events.
pub struct PolledSource<A> {
    api: A,
    loader: Arc<SdkLoader>,
    interval: Duration,
    readiness: Mutex<Readiness>,
    events: broadcast::Sender<SourceEvent>,
}

impl<A: PlayerApi> PolledSource<A> {
    pub fn new(api: A) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            api,
            loader: SdkLoader::global(),
            interval: DEFAULT_POLL_INTERVAL,
            readiness: Mutex::new(Readiness::Loading),
            events,
        }
    }

    /// Use a private loader instead of the process-wide one.
    pub fn with_loader(mut self, loader: Arc<SdkLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_readiness(&self, readiness: Readiness) {
        *self.readiness.lock().unwrap_or_else(|e| e.into_inner()) = readiness;
    }

    fn check_ready(&self) -> Result<(), SourceError> {
        match self.readiness() {
            Readiness::Ready => Ok(()),
            Readiness::Loading => Err(SourceError::NotReady),
            Readiness::Failed(e) => Err(e),
        }
    }

    /// Fan fatal errors out to subscribers and latch the failed state.
    fn observe<T>(&self, result: Result<T, SourceError>) -> Result<T, SourceError> {
        if let Err(e) = &result {
            if e.is_fatal() {
                error!("{} reported a fatal error: {}", self.api.endpoint(), e);
                self.set_readiness(Readiness::Failed(e.clone()));
                let _ = self.events.send(SourceEvent::Error(e.clone()));
            }
        }
        result
    }
}

#[async_trait]
impl<A: PlayerApi> PlaybackSource for PolledSource<A> {
    fn name(&self) -> &'static str {
        "polled player"
    }

    fn progress_mode(&self) -> ProgressMode {
        ProgressMode::Poll(self.interval)
    }

    fn subscribe(&self) -> broadcast::Receiver<SourceEvent> {
        self.events.subscribe()
    }

    async fn ready(&self) -> Result<(), SourceError> {
        match self.readiness() {
            Readiness::Ready => return Ok(()),
            Readiness::Failed(e) => return Err(e),
            Readiness::Loading => {}
        }

        let key = self.api.endpoint();
        match self.loader.load(&key, || self.api.load()).await {
            Ok(sdk) => {
                debug!("Player at {} is ready (version {})", key, sdk.version);
                self.set_readiness(Readiness::Ready);
                Ok(())
            }
            Err(e) => {
                self.set_readiness(Readiness::Failed(e.clone()));
                let _ = self.events.send(SourceEvent::Error(e.clone()));
                Err(e)
            }
        }
    }

    async fn current_position(&self) -> Result<f64, SourceError> {
        self.check_ready()?;
        let result = self.api.current_time().await;
        self.observe(result)
    }

    async fn seek(&self, seconds: f64) -> Result<(), SourceError> {
        self.check_ready()?;
        let result = self.api.seek_to(seconds).await;
        self.observe(result)
    }

    async fn play(&self) -> Result<(), SourceError> {
        self.check_ready()?;
        let result = self.api.play().await;
        self.observe(result)
    }

    async fn pause(&self) -> Result<(), SourceError> {
        self.check_ready()?;
        let result = self.api.pause().await;
        self.observe(result)
    }
}
