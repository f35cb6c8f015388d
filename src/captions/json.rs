// JSON caption input
use super::Segment;
use crate::error::Result;
use serde::Deserialize;

/// Accepted document shapes: a bare cue array, a transcription response with
/// a `captions` array, or a subtitle export with a `subtitles` array.
#[derive(Deserialize)]
#[serde(untagged)]
enum JsonCaptions {
    Bare(Vec<JsonCue>),
    Captions { captions: Vec<JsonCue> },
    Subtitles { subtitles: Vec<JsonCue> },
}

#[derive(Deserialize)]
struct JsonCue {
    start: f64,
    end: f64,
    text: String,
}

pub fn parse(contents: &str) -> Result<Vec<Segment>> {
    let cues = match serde_json::from_str::<JsonCaptions>(contents)? {
        JsonCaptions::Bare(cues) => cues,
        JsonCaptions::Captions { captions } => captions,
        JsonCaptions::Subtitles { subtitles } => subtitles,
    };

    Ok(cues
        .into_iter()
        .map(|cue| Segment::new(cue.start, cue.end, cue.text))
        .collect())
}
