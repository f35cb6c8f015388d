use super::loader::SdkInfo;
use super::polled::PlayerApi;
use crate::error::SourceError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Status endpoint of VLC's HTTP interface; commands ride on its query string.
const STATUS_PATH: &str = "/requests/status.json";

/// Per-request timeout. Polls are 300 ms apart, so anything slower is stale.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct VlcStatus {
    #[serde(default)]
    time: f64,
    #[serde(default)]
    length: f64,
    #[serde(default)]
    position: f64,
    #[serde(default)]
    state: String,
    #[serde(default)]
    version: Option<String>,
}

impl VlcStatus {
    /// `time` is whole seconds; `position * length` gives sub-second resolution.
    fn playhead(&self) -> f64 {
        if self.length > 0.0 && self.position > 0.0 {
            self.position * self.length
        } else {
            self.time
        }
    }
}

/// VLC media player driven through its HTTP control interface.
///
/// Start VLC with `--extraintf http --http-password <secret>`.
pub struct VlcApi {
    client: reqwest::Client,
    base_url: String,
    password: String,
    length: Mutex<Option<f64>>,
}

impl VlcApi {
    pub fn new(base_url: impl Into<String>, password: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            password: password.into(),
            length: Mutex::new(None),
        }
    }

    fn status_url(&self) -> String {
        format!("{}{}", self.base_url, STATUS_PATH)
    }

    async fn request(&self, params: &[(&str, String)]) -> Result<VlcStatus, SourceError> {
        let response = self
            .client
            .get(self.status_url())
            .basic_auth("", Some(&self.password))
            .query(params)
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Player {
                code: status.as_u16(),
                message: describe_status(status),
            });
        }

        let body: VlcStatus = response
            .json()
            .await
            .map_err(|e| SourceError::Transport(format!("Unreadable VLC status: {e}")))?;

        if body.length > 0.0 {
            *self.length.lock().unwrap_or_else(|e| e.into_inner()) = Some(body.length);
        }

        Ok(body)
    }

    async fn command(&self, command: &str, val: Option<String>) -> Result<(), SourceError> {
        let mut params = vec![("command", command.to_string())];
        if let Some(val) = val {
            params.push(("val", val));
        }
        let status = self.request(&params).await?;
        debug!("VLC {} -> state {}", command, status.state);
        Ok(())
    }

    fn known_length(&self) -> Option<f64> {
        *self.length.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn describe_status(status: StatusCode) -> String {
    match status {
        StatusCode::UNAUTHORIZED => "VLC rejected the HTTP password".to_string(),
        StatusCode::FORBIDDEN => "VLC refused access from this host".to_string(),
        StatusCode::NOT_FOUND => "VLC HTTP interface not found at this address".to_string(),
        other => other
            .canonical_reason()
            .unwrap_or("unexpected response")
            .to_string(),
    }
}

/// VLC seeks in whole seconds unless given a percentage.
fn seek_value(seconds: f64, length: Option<f64>) -> String {
    match length {
        Some(length) if length > 0.0 => {
            format!("{:.4}%", (seconds / length * 100.0).clamp(0.0, 100.0))
        }
        _ => format!("{}", seconds.max(0.0).round() as u64),
    }
}

#[async_trait]
impl PlayerApi for VlcApi {
    fn endpoint(&self) -> String {
        self.base_url.clone()
    }

    async fn load(&self) -> Result<SdkInfo, SourceError> {
        let status = self
            .request(&[])
            .await
            .map_err(|e| SourceError::Load(format!("VLC at {} is unavailable: {e}", self.base_url)))?;

        Ok(SdkInfo {
            version: status.version.unwrap_or_else(|| "unknown".to_string()),
        })
    }

    async fn current_time(&self) -> Result<f64, SourceError> {
        Ok(self.request(&[]).await?.playhead())
    }

    async fn seek_to(&self, seconds: f64) -> Result<(), SourceError> {
        self.command("seek", Some(seek_value(seconds, self.known_length())))
            .await
    }

    async fn play(&self) -> Result<(), SourceError> {
        self.command("pl_forceresume", None).await
    }

    async fn pause(&self) -> Result<(), SourceError> {
        self.command("pl_forcepause", None).await
    }
}
