pub mod audio;
pub mod clock;
pub mod loader;
pub mod polled;
pub mod vlc;

pub use audio::AudioSource;
pub use clock::ClockSource;
pub use loader::{LoadStatus, SdkInfo, SdkLoader};
pub use polled::{PlayerApi, PolledSource, Readiness};
pub use vlc::VlcApi;

use crate::error::SourceError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::broadcast;

/// Reference sampling cadence for backends without progress events.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Capacity of each source's event channel.
pub(crate) const EVENT_CAPACITY: usize = 64;

/// Notifications a backend pushes to whoever is driving it.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// The playhead advanced to this position, in seconds.
    Progress(f64),
    /// Playback ran off the end of the media.
    Ended,
    /// The backend hit an unrecoverable condition.
    Error(SourceError),
}

/// How the driver learns about playhead movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    /// The source emits `SourceEvent::Progress` on its own.
    Push,
    /// The driver must sample `current_position` on this interval.
    Poll(Duration),
}

/// Capability surface every media backend exposes to the scheduler.
#[async_trait]
pub trait PlaybackSource: Send + Sync {
    fn name(&self) -> &'static str;

    fn progress_mode(&self) -> ProgressMode;

    /// Subscribe to progress (push sources) and error notifications.
    fn subscribe(&self) -> broadcast::Receiver<SourceEvent>;

    /// Resolve once the backend accepts commands.
    async fn ready(&self) -> Result<(), SourceError> {
        Ok(())
    }

    /// Best-effort instantaneous playhead, in seconds.
    async fn current_position(&self) -> Result<f64, SourceError>;

    async fn seek(&self, seconds: f64) -> Result<(), SourceError>;

    /// Start playback. A no-op if already playing.
    async fn play(&self) -> Result<(), SourceError>;

    /// Pause playback. A no-op if already paused.
    async fn pause(&self) -> Result<(), SourceError>;
}
