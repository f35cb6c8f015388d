pub mod filter;
pub mod json;
pub mod srt;
pub mod vtt;

pub use filter::filter_segments;

use crate::error::{Result, ShadowError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// A timed span of spoken media with its caption text. Times are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl Segment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    /// Spoken length of this segment.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionFormat {
    Json,
    Srt,
    Vtt,
}

impl std::fmt::Display for CaptionFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptionFormat::Json => write!(f, "json"),
            CaptionFormat::Srt => write!(f, "srt"),
            CaptionFormat::Vtt => write!(f, "vtt"),
        }
    }
}

impl std::str::FromStr for CaptionFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(CaptionFormat::Json),
            "srt" => Ok(CaptionFormat::Srt),
            "vtt" | "webvtt" => Ok(CaptionFormat::Vtt),
            _ => Err(format!(
                "Unknown caption format: {}. Use 'json', 'srt', or 'vtt'",
                s
            )),
        }
    }
}

impl CaptionFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| e.parse().ok())
    }

    pub fn extension(&self) -> &'static str {
        match self {
            CaptionFormat::Json => "json",
            CaptionFormat::Srt => "srt",
            CaptionFormat::Vtt => "vtt",
        }
    }
}

/// Load a caption file, choosing the parser from its extension.
pub fn load_captions(path: &Path) -> Result<Vec<Segment>> {
    if !path.exists() {
        return Err(ShadowError::FileNotFound(path.display().to_string()));
    }

    let format = CaptionFormat::from_path(path).ok_or_else(|| {
        ShadowError::CaptionParse(format!(
            "Unsupported caption file: {} (expected .json, .srt or .vtt)",
            path.display()
        ))
    })?;

    let contents = std::fs::read_to_string(path)?;
    let segments = parse_captions(&contents, format)?;
    debug!("Loaded {} captions from {:?}", segments.len(), path);
    Ok(segments)
}

/// Parse caption text in the given format and normalize the result.
pub fn parse_captions(contents: &str, format: CaptionFormat) -> Result<Vec<Segment>> {
    let raw = match format {
        CaptionFormat::Json => json::parse(contents)?,
        CaptionFormat::Srt => srt::parse(contents)?,
        CaptionFormat::Vtt => vtt::parse(contents)?,
    };
    Ok(normalize(raw))
}

/// Drop unusable cues and order the rest by start time.
fn normalize(segments: Vec<Segment>) -> Vec<Segment> {
    let mut result: Vec<Segment> = segments
        .into_iter()
        .filter_map(|mut segment| {
            segment.text = segment.text.trim().to_string();
            if segment.text.is_empty() {
                return None;
            }
            if !(segment.start.is_finite() && segment.end.is_finite()) || segment.end <= segment.start
            {
                warn!(
                    "Dropping caption with invalid timing ({} -> {}): {:?}",
                    segment.start, segment.end, segment.text
                );
                return None;
            }
            Some(segment)
        })
        .collect();

    // Stable, so cues sharing a start keep their file order.
    result.sort_by(|a, b| a.start.total_cmp(&b.start));
    result
}

/// Parse `[HH:]MM:SS(,|.)mmm` into seconds.
pub(crate) fn parse_timestamp(s: &str) -> Option<f64> {
    static TIMESTAMP: OnceLock<Regex> = OnceLock::new();
    let re = TIMESTAMP.get_or_init(|| {
        Regex::new(r"^(?:(\d+):)?(\d{1,2}):(\d{2})[,.](\d{1,3})$").expect("Invalid regex")
    });

    let caps = re.captures(s.trim())?;
    let hours: f64 = caps.get(1).map_or(Some(0.0), |m| m.as_str().parse().ok())?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    let fraction = &caps[4];
    let millis: f64 = format!("{:0<3}", fraction).parse().ok()?;

    Some(hours * 3600.0 + minutes * 60.0 + seconds + millis / 1000.0)
}

/// Render seconds as `MM:SS.mmm`, or `H:MM:SS.mmm` past the hour.
pub fn format_timestamp(seconds: f64) -> String {
    let total_millis = (seconds.max(0.0) * 1000.0).round() as u64;
    let millis = total_millis % 1000;
    let total_secs = total_millis / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}.{:03}", hours, minutes, secs, millis)
    } else {
        format!("{:02}:{:02}.{:03}", minutes, secs, millis)
    }
}
