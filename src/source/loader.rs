use crate::error::SourceError;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// What a successful player API load reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkInfo {
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    NotStarted,
    Loading,
    Loaded(SdkInfo),
    Failed(SourceError),
}

type Slot = Arc<OnceCell<Result<SdkInfo, SourceError>>>;

/// Single-flight loader for third-party player APIs.
///
/// One slot per endpoint. The first caller runs the initializer; concurrent
/// callers wait on the same slot and every caller, now or later, receives
/// the same outcome. Failures are cached and replayed.
#[derive(Default)]
pub struct SdkLoader {
    slots: Mutex<HashMap<String, Slot>>,
}

impl SdkLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide loader.
    pub fn global() -> Arc<SdkLoader> {
        static LOADER: OnceLock<Arc<SdkLoader>> = OnceLock::new();
        LOADER.get_or_init(|| Arc::new(SdkLoader::new())).clone()
    }

    fn slot(&self, key: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    pub async fn load<F, Fut>(&self, key: &str, init: F) -> Result<SdkInfo, SourceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SdkInfo, SourceError>>,
    {
        let slot = self.slot(key);

        if let Some(done) = slot.get() {
            debug!("Player API for {} already settled", key);
            return done.clone();
        }

        slot.get_or_init(move || async move {
            info!("Loading player API from {}", key);
            let result = init().await;
            match &result {
                Ok(sdk) => info!("Player API ready: {} ({})", key, sdk.version),
                Err(e) => warn!("Player API failed to load from {}: {}", key, e),
            }
            result
        })
        .await
        .clone()
    }

    pub fn status(&self, key: &str) -> LoadStatus {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        match slots.get(key).map(|slot| slot.get().cloned()) {
            None => LoadStatus::NotStarted,
            Some(None) => LoadStatus::Loading,
            Some(Some(Ok(sdk))) => LoadStatus::Loaded(sdk),
            Some(Some(Err(e))) => LoadStatus::Failed(e),
        }
    }
}
