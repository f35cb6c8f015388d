//! Pure segment scheduling state machine.
//!
//! [`SchedulerState::handle`] takes one [`Signal`] and returns the
//! [`Effect`]s the runtime must carry out against the playback source. It
//! never touches a backend itself, and [`SchedulerState::handle_at`] takes
//! the current time as an argument, so every transition can be exercised
//! with plain values.

use super::{Phase, Settings};
use crate::captions::{filter_segments, Segment};
use crate::error::SourceError;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Slack allowed between a seek target plus elapsed time and the first
/// sample after it. Covers backend seek rounding and sampling latency.
pub const SEEK_TOLERANCE: f64 = 0.15;

/// Identifies one pause timer so a late expiry can be told apart from the
/// live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Everything that can drive the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// The source became ready.
    Attached,
    /// A playhead sample, pushed or polled.
    Progress(f64),
    /// The media ran out while playing.
    MediaEnded,
    /// The source rejected the last pause request.
    PauseFailed,
    TimerExpired(TimerId),
    /// User pressed play.
    ManualPlay,
    SourceFailed(SourceError),
    SetRepeatCount(u32),
    SetShadowingTime(f64),
    SetMinDuration(f64),
    SetCaptions(Vec<Segment>),
    Detach,
}

/// Side effects requested by a transition, in execution order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Seek(f64),
    Play,
    Pause,
    StartTimer { id: TimerId, duration: Duration },
    CancelTimer(TimerId),
    Report(SourceError),
}

/// Read-only view of the scheduler for the UI layer.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Projection {
    pub active_text: Option<String>,
    pub segment_index: usize,
    pub repeat_index: u32,
    pub repeat_count: u32,
    pub segment_count: usize,
    pub shadowing_time: f64,
    pub phase: Phase,
    pub error: Option<String>,
}

/// Where to resume after a reconfiguration.
enum Anchor {
    Current,
    StartAtOrAfter(f64),
    Beginning,
}

#[derive(Debug, Clone)]
pub struct SchedulerState {
    captions: Vec<Segment>,
    sequence: Vec<Segment>,
    settings: Settings,
    segment_index: usize,
    repeat_index: u32,
    phase: Phase,
    pending_pause: Option<TimerId>,
    next_timer: u64,
    attached: bool,
    /// Target and time of the last seek. The first sample after it may still
    /// show the old position.
    last_seek: Option<(f64, Instant)>,
    /// A pause was rejected; the next sample that shows playback retries it.
    repause: bool,
    error: Option<SourceError>,
}

impl SchedulerState {
    pub fn new(captions: Vec<Segment>, settings: Settings) -> Self {
        let sequence = filter_segments(&captions, settings.min_duration);
        Self {
            captions,
            sequence,
            settings,
            segment_index: 0,
            repeat_index: 0,
            phase: Phase::Idle,
            pending_pause: None,
            next_timer: 0,
            attached: false,
            last_seek: None,
            repause: false,
            error: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn segment_index(&self) -> usize {
        self.segment_index
    }

    pub fn repeat_index(&self) -> u32 {
        self.repeat_index
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    /// The working sequence after filtering.
    pub fn sequence(&self) -> &[Segment] {
        &self.sequence
    }

    pub fn pending_pause(&self) -> Option<TimerId> {
        self.pending_pause
    }

    /// Attached with nothing to drive.
    pub fn is_inert(&self) -> bool {
        self.attached && self.sequence.is_empty() && self.phase == Phase::Idle
    }

    pub fn active_segment(&self) -> Option<&Segment> {
        match self.phase {
            Phase::Playing | Phase::PausedForShadowing => self.sequence.get(self.segment_index),
            _ => None,
        }
    }

    pub fn projection(&self) -> Projection {
        Projection {
            active_text: self.active_segment().map(|s| s.text.clone()),
            segment_index: self.segment_index,
            repeat_index: self.repeat_index,
            repeat_count: self.settings.repeat_count,
            segment_count: self.sequence.len(),
            shadowing_time: self.settings.shadowing_time,
            phase: self.phase,
            error: self.error.as_ref().map(|e| e.to_string()),
        }
    }

    /// Handle `signal` as of now.
    pub fn handle(&mut self, signal: Signal) -> Vec<Effect> {
        self.handle_at(signal, Instant::now())
    }

    /// The single transition function every input goes through. `now` dates
    /// seeks and progress samples.
    pub fn handle_at(&mut self, signal: Signal, now: Instant) -> Vec<Effect> {
        match signal {
            Signal::Attached => self.on_attached(now),
            Signal::Progress(position) => self.on_progress(position, now),
            Signal::MediaEnded => self.on_media_ended(),
            Signal::PauseFailed => self.on_pause_failed(),
            Signal::TimerExpired(id) => self.on_timer_expired(id, now),
            Signal::ManualPlay => self.on_manual_play(),
            Signal::SourceFailed(error) => self.on_source_failed(error),
            Signal::SetRepeatCount(count) => {
                self.settings.repeat_count = count.max(1);
                self.reconfigure(Anchor::Current, now)
            }
            Signal::SetShadowingTime(time) => {
                // Only the next pause picks this up; a running one keeps its length.
                self.settings.shadowing_time = time;
                Vec::new()
            }
            Signal::SetMinDuration(min) => {
                let anchor = match self.active_segment() {
                    Some(segment) => Anchor::StartAtOrAfter(segment.start),
                    None => Anchor::Beginning,
                };
                self.settings.min_duration = min;
                self.sequence = filter_segments(&self.captions, min);
                self.reconfigure(anchor, now)
            }
            Signal::SetCaptions(captions) => {
                self.captions = captions;
                self.sequence = filter_segments(&self.captions, self.settings.min_duration);
                self.reconfigure(Anchor::Beginning, now)
            }
            Signal::Detach => self.on_detach(),
        }
    }

    fn on_attached(&mut self, now: Instant) -> Vec<Effect> {
        if self.attached || self.phase == Phase::Error {
            return Vec::new();
        }
        self.attached = true;

        if self.sequence.is_empty() {
            debug!("Nothing to play; scheduler stays inert");
            return Vec::new();
        }
        self.enter_segment(0, now)
    }

    fn on_progress(&mut self, position: f64, now: Instant) -> Vec<Effect> {
        match self.phase {
            Phase::Playing => {}
            Phase::PausedForShadowing | Phase::Ended if self.repause => {
                debug!("Playhead still moving at {:.3}s; pausing again", position);
                self.repause = false;
                return vec![Effect::Pause];
            }
            _ => return Vec::new(),
        }
        let Some(segment) = self.sequence.get(self.segment_index) else {
            return Vec::new();
        };

        if let Some((target, at)) = self.last_seek.take() {
            let reachable =
                target + now.saturating_duration_since(at).as_secs_f64() + SEEK_TOLERANCE;
            if position > reachable {
                debug!(
                    "Ignoring pre-seek position {:.3}s (seeked to {:.3}s)",
                    position, target
                );
                return Vec::new();
            }
        }

        if position <= segment.end {
            return Vec::new();
        }
        self.finish_segment(position)
    }

    fn on_media_ended(&mut self) -> Vec<Effect> {
        if self.phase != Phase::Playing || self.sequence.get(self.segment_index).is_none() {
            return Vec::new();
        }
        self.last_seek = None;
        debug!("Media ended inside segment {}", self.segment_index);
        self.finish_segment(f64::INFINITY)
    }

    fn on_pause_failed(&mut self) -> Vec<Effect> {
        if matches!(self.phase, Phase::PausedForShadowing | Phase::Ended) {
            self.repause = true;
        }
        Vec::new()
    }

    /// Pause after the active repeat and start the shadowing countdown.
    fn finish_segment(&mut self, position: f64) -> Vec<Effect> {
        let Some(segment) = self.sequence.get(self.segment_index) else {
            return Vec::new();
        };
        let duration = pause_length(segment, self.settings.shadowing_time);
        let id = self.next_timer_id();
        self.pending_pause = Some(id);
        self.phase = Phase::PausedForShadowing;
        debug!(
            "Segment {} repeat {} done at {:.3}s; pausing {:.2}s",
            self.segment_index,
            self.repeat_index,
            position,
            duration.as_secs_f64()
        );

        vec![Effect::Pause, Effect::StartTimer { id, duration }]
    }

    fn on_timer_expired(&mut self, id: TimerId, now: Instant) -> Vec<Effect> {
        if self.pending_pause != Some(id) {
            debug!("Discarding stale pause timer {:?}", id);
            return Vec::new();
        }
        self.pending_pause = None;

        if self.phase != Phase::PausedForShadowing {
            return Vec::new();
        }
        let Some(segment) = self.sequence.get(self.segment_index) else {
            return Vec::new();
        };

        if self.repeat_index + 1 < self.settings.repeat_count {
            let start = segment.start;
            self.repeat_index += 1;
            self.phase = Phase::Playing;
            self.repause = false;
            self.last_seek = Some((start, now));
            vec![Effect::Seek(start), Effect::Play]
        } else if self.segment_index + 1 < self.sequence.len() {
            self.enter_segment(self.segment_index + 1, now)
        } else {
            debug!("Last segment finished; practice ended");
            self.segment_index = self.sequence.len();
            self.repeat_index = 0;
            self.phase = Phase::Ended;
            self.last_seek = None;
            self.repause = false;
            vec![Effect::Pause]
        }
    }

    fn on_manual_play(&mut self) -> Vec<Effect> {
        if self.phase == Phase::Playing {
            vec![Effect::Play]
        } else {
            debug!("Ignoring play request while {}", self.phase);
            Vec::new()
        }
    }

    fn on_source_failed(&mut self, error: SourceError) -> Vec<Effect> {
        if self.phase == Phase::Error {
            return Vec::new();
        }
        let mut effects = self.cancel_pending();
        self.phase = Phase::Error;
        self.last_seek = None;
        self.repause = false;
        self.error = Some(error.clone());
        effects.push(Effect::Report(error));
        effects
    }

    fn on_detach(&mut self) -> Vec<Effect> {
        self.attached = false;
        self.last_seek = None;
        self.repause = false;
        let effects = self.cancel_pending();
        if matches!(self.phase, Phase::Playing | Phase::PausedForShadowing) {
            self.phase = Phase::Idle;
        }
        effects
    }

    fn reconfigure(&mut self, anchor: Anchor, now: Instant) -> Vec<Effect> {
        if !self.attached || self.phase == Phase::Error {
            return Vec::new();
        }

        let mut effects = self.cancel_pending();

        if self.sequence.is_empty() {
            debug!("Reconfiguration left nothing to play; going inert");
            if matches!(self.phase, Phase::Playing | Phase::PausedForShadowing) {
                effects.push(Effect::Pause);
            }
            self.segment_index = 0;
            self.repeat_index = 0;
            self.phase = Phase::Idle;
            self.last_seek = None;
            self.repause = false;
            return effects;
        }

        let last = self.sequence.len() - 1;
        let index = match (self.phase, anchor) {
            (Phase::Ended | Phase::Idle, _) | (_, Anchor::Beginning) => 0,
            (_, Anchor::Current) => self.segment_index.min(last),
            (_, Anchor::StartAtOrAfter(start)) => self
                .sequence
                .iter()
                .position(|s| s.start >= start)
                .unwrap_or(last),
        };

        effects.extend(self.enter_segment(index, now));
        effects
    }

    fn enter_segment(&mut self, index: usize, now: Instant) -> Vec<Effect> {
        let start = self.sequence[index].start;
        self.segment_index = index;
        self.repeat_index = 0;
        self.phase = Phase::Playing;
        self.repause = false;
        self.last_seek = Some((start, now));
        vec![Effect::Seek(start), Effect::Play]
    }

    fn cancel_pending(&mut self) -> Vec<Effect> {
        match self.pending_pause.take() {
            Some(id) => vec![Effect::CancelTimer(id)],
            None => Vec::new(),
        }
    }

    fn next_timer_id(&mut self) -> TimerId {
        self.next_timer += 1;
        TimerId(self.next_timer)
    }
}

/// Shadowing pause for a segment: its spoken length times the multiplier.
fn pause_length(segment: &Segment, shadowing_time: f64) -> Duration {
    let seconds = segment.duration() * shadowing_time;
    if seconds.is_finite() && seconds > 0.0 {
        Duration::from_secs_f64(seconds)
    } else {
        Duration::ZERO
    }
}
