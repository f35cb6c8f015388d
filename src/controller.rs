use crate::captions::Segment;
use crate::config::{validate_min_duration, validate_repeat_count, validate_shadowing_time};
use crate::error::{Result, ShadowError};
use crate::scheduler::{Projection, SchedulerHandle, Settings, Signal};
use crate::source::PlaybackSource;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Public surface of a practice session: settings in, projection out.
///
/// Setters validate before anything reaches the scheduler, so an invalid
/// value never disturbs playback.
pub struct Controller {
    scheduler: SchedulerHandle,
}

impl Controller {
    pub fn attach(
        source: Arc<dyn PlaybackSource>,
        captions: Vec<Segment>,
        settings: Settings,
    ) -> Result<Self> {
        settings.validate()?;
        info!(
            "Starting practice on {} with {} captions (repeat {}, shadowing x{})",
            source.name(),
            captions.len(),
            settings.repeat_count,
            settings.shadowing_time
        );

        Ok(Self {
            scheduler: SchedulerHandle::spawn(source, captions, settings),
        })
    }

    pub fn projection(&self) -> Projection {
        self.scheduler.projection()
    }

    /// A receiver that is notified whenever the projection changes.
    pub fn subscribe(&self) -> watch::Receiver<Projection> {
        self.scheduler.subscribe()
    }

    /// Wait until the projection satisfies `predicate`.
    pub async fn wait_for<F>(&self, predicate: F) -> Result<Projection>
    where
        F: FnMut(&Projection) -> bool,
    {
        let mut updates = self.subscribe();
        let projection = updates
            .wait_for(predicate)
            .await
            .map_err(|_| ShadowError::SchedulerClosed)?;
        Ok(projection.clone())
    }

    /// Honored only while a segment is playing.
    pub fn play(&self) -> Result<()> {
        self.scheduler.send(Signal::ManualPlay)
    }

    pub fn set_repeat_count(&self, count: u32) -> Result<()> {
        validate_repeat_count(count)?;
        self.scheduler.send(Signal::SetRepeatCount(count))
    }

    /// Takes effect from the next pause; a pause already running keeps its length.
    pub fn set_shadowing_time(&self, multiplier: f64) -> Result<()> {
        validate_shadowing_time(multiplier)?;
        self.scheduler.send(Signal::SetShadowingTime(multiplier))
    }

    pub fn set_min_duration(&self, seconds: f64) -> Result<()> {
        validate_min_duration(seconds)?;
        self.scheduler.send(Signal::SetMinDuration(seconds))
    }

    /// Replace the caption list and restart from its first playable segment.
    pub fn set_captions(&self, captions: Vec<Segment>) -> Result<()> {
        self.scheduler.send(Signal::SetCaptions(captions))
    }

    pub async fn shutdown(self) {
        self.scheduler.detach().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ClockSource;

    fn controller() -> Controller {
        let clock = Arc::new(ClockSource::new(10.0));
        Controller::attach(
            clock,
            vec![Segment::new(0.0, 2.0, "hello")],
            Settings::default(),
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_rejects_invalid_settings() {
        let clock = Arc::new(ClockSource::new(10.0));
        let settings = Settings {
            repeat_count: 0,
            ..Settings::default()
        };
        let result = Controller::attach(clock, Vec::new(), settings);
        assert!(matches!(result, Err(ShadowError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_setters_validate_bounds() {
        let controller = controller();
        assert!(controller.set_repeat_count(11).is_err());
        assert!(controller.set_shadowing_time(0.4).is_err());
        assert!(controller.set_shadowing_time(f64::NAN).is_err());
        assert!(controller.set_min_duration(-1.0).is_err());

        assert!(controller.set_repeat_count(10).is_ok());
        assert!(controller.set_shadowing_time(3.0).is_ok());
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_settings_reach_projection() {
        let controller = controller();
        controller.set_repeat_count(5).unwrap();
        controller.set_shadowing_time(2.5).unwrap();

        let projection = controller
            .wait_for(|p| p.repeat_count == 5 && p.shadowing_time == 2.5)
            .await
            .unwrap();
        assert_eq!(projection.segment_count, 1);
        controller.shutdown().await;
    }
}
