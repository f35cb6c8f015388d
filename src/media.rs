use std::path::Path;

use tokio::process::Command;
use tracing::debug;

use crate::error::SourceError;

/// Check if FFprobe is installed and accessible.
pub async fn check_ffprobe() -> Result<(), SourceError> {
    let output = Command::new("ffprobe")
        .arg("-version")
        .output()
        .await
        .map_err(|e| {
            SourceError::Load(format!(
                "FFprobe not found. Please install FFmpeg (includes FFprobe). Error: {e}"
            ))
        })?;

    if !output.status.success() {
        return Err(SourceError::Load("FFprobe check failed".to_string()));
    }

    debug!("FFprobe is available");
    Ok(())
}

/// Get the duration in seconds of a local media file using FFprobe.
pub async fn probe_duration(input: &Path) -> Result<f64, SourceError> {
    if !input.exists() {
        return Err(SourceError::Load(format!(
            "Media file not found: {}",
            input.display()
        )));
    }

    check_ffprobe().await?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(input)
        .output()
        .await
        .map_err(|e| SourceError::Load(format!("Failed to run FFprobe: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SourceError::Load(format!("FFprobe failed: {}", stderr.trim())));
    }

    let duration = parse_duration(&String::from_utf8_lossy(&output.stdout))?;
    debug!("Probed {:?}: {:.2}s", input, duration);
    Ok(duration)
}

fn parse_duration(stdout: &str) -> Result<f64, SourceError> {
    let trimmed = stdout.trim();
    let duration: f64 = trimmed.parse().map_err(|e| {
        SourceError::Load(format!("Failed to parse duration '{}': {e}", trimmed))
    })?;

    if !duration.is_finite() || duration <= 0.0 {
        return Err(SourceError::Load(format!(
            "Media reports no playable duration ({trimmed})"
        )));
    }

    Ok(duration)
}
