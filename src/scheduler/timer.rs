use super::machine::TimerId;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;

/// One-shot shadowing pause. Dropping or cancelling it aborts the countdown,
/// so an owner holding at most one of these has at most one live timer.
pub struct PauseTimer {
    id: TimerId,
    handle: JoinHandle<()>,
}

impl PauseTimer {
    /// Start counting down; `on_expiry` runs once with this timer's id.
    pub fn start<F>(id: TimerId, duration: Duration, on_expiry: F) -> Self
    where
        F: FnOnce(TimerId) + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            time::sleep(duration).await;
            on_expiry(id);
        });
        Self { id, handle }
    }

    pub fn id(&self) -> TimerId {
        self.id
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for PauseTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
