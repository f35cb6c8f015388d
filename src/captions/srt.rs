// SRT caption input
use super::{parse_timestamp, Segment};
use crate::error::{Result, ShadowError};

pub fn parse(contents: &str) -> Result<Vec<Segment>> {
    let normalized = contents.trim_start_matches('\u{feff}').replace("\r\n", "\n");
    let mut segments = Vec::new();

    for block in normalized.split("\n\n") {
        let mut lines = block.lines().map(str::trim).skip_while(|l| l.is_empty());

        let Some(first) = lines.next() else {
            continue;
        };

        // The sequence number is optional in practice; accept blocks that
        // open directly with the timing line.
        let timing = if first.contains("-->") {
            first
        } else {
            match lines.next() {
                Some(line) => line,
                None => continue,
            }
        };

        let (start, end) = parse_timing(timing)?;
        let text = lines.filter(|l| !l.is_empty()).collect::<Vec<_>>().join(" ");
        segments.push(Segment::new(start, end, text));
    }

    Ok(segments)
}

fn parse_timing(line: &str) -> Result<(f64, f64)> {
    let (start, end) = line
        .split_once("-->")
        .ok_or_else(|| ShadowError::CaptionParse(format!("Missing '-->' in timing line: {line}")))?;

    let start = parse_timestamp(start)
        .ok_or_else(|| ShadowError::CaptionParse(format!("Bad start timestamp: {line}")))?;
    let end = parse_timestamp(end)
        .ok_or_else(|| ShadowError::CaptionParse(format!("Bad end timestamp: {line}")))?;

    Ok((start, end))
}
