use super::Segment;

/// Narrow captions to the segments worth practicing.
///
/// Keeps every segment whose spoken length is at least `min_duration`,
/// preserving input order. Pure and idempotent.
pub fn filter_segments(segments: &[Segment], min_duration: f64) -> Vec<Segment> {
    segments
        .iter()
        .filter(|segment| segment.duration() >= min_duration)
        .cloned()
        .collect()
}
