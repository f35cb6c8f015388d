// WebVTT caption input
use super::{parse_timestamp, Segment};
use crate::error::{Result, ShadowError};
use regex::Regex;
use std::sync::OnceLock;

pub fn parse(contents: &str) -> Result<Vec<Segment>> {
    let normalized = contents.trim_start_matches('\u{feff}').replace("\r\n", "\n");

    if !normalized.trim_start().starts_with("WEBVTT") {
        return Err(ShadowError::CaptionParse(
            "Missing WEBVTT header".to_string(),
        ));
    }

    let mut segments = Vec::new();

    for block in normalized.split("\n\n") {
        let lines: Vec<&str> = block.lines().map(str::trim).filter(|l| !l.is_empty()).collect();

        // Header, NOTE, STYLE and REGION blocks carry no timing line.
        let Some(timing_at) = lines.iter().position(|l| l.contains("-->")) else {
            continue;
        };

        let (start, end) = parse_timing(lines[timing_at])?;
        let text = lines[timing_at + 1..]
            .iter()
            .map(|l| strip_tags(l))
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        segments.push(Segment::new(start, end, text));
    }

    Ok(segments)
}

fn parse_timing(line: &str) -> Result<(f64, f64)> {
    let (start, rest) = line
        .split_once("-->")
        .ok_or_else(|| ShadowError::CaptionParse(format!("Missing '-->' in cue timing: {line}")))?;

    // Cue settings (align:start position:0%) follow the end timestamp.
    let end = rest.split_whitespace().next().unwrap_or_default();

    let start = parse_timestamp(start)
        .ok_or_else(|| ShadowError::CaptionParse(format!("Bad start timestamp: {line}")))?;
    let end = parse_timestamp(end)
        .ok_or_else(|| ShadowError::CaptionParse(format!("Bad end timestamp: {line}")))?;

    Ok((start, end))
}

/// Remove inline markup such as `<c>`, `<i>` and word timings `<00:00:01.000>`.
fn strip_tags(line: &str) -> String {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let re = TAG.get_or_init(|| Regex::new(r"<[^>]*>").expect("Invalid regex"));
    re.replace_all(line, "").split_whitespace().collect::<Vec<_>>().join(" ")
}
