use crate::captions::{filter_segments, load_captions, Segment};
use crate::config::{Backend, Config};
use crate::controller::Controller;
use crate::controls::{self, KeyCommand};
use crate::error::{Result, ShadowError};
use crate::scheduler::{Phase, Projection, Settings};
use crate::source::{AudioSource, ClockSource, PlaybackSource, PolledSource, VlcApi};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, info, warn};

/// Silence appended after the last caption on the silent clock.
const CLOCK_TAIL: f64 = 1.0;

/// How often a running session looks at the cancel flag.
const CANCEL_CHECK: Duration = Duration::from_millis(100);

/// Configuration for one practice session.
#[derive(Debug, Clone)]
pub struct PracticeConfig {
    /// Playback backend to drive.
    pub backend: Backend,
    /// Repeat, pause and filter parameters.
    pub settings: Settings,
    /// Sampling cadence for polled backends.
    pub poll_interval: Duration,
    /// Audio file for the local backend; without one a silent clock runs.
    pub media: Option<PathBuf>,
    pub vlc_url: String,
    pub vlc_password: Option<String>,
    /// Show the progress bar.
    pub show_progress: bool,
    /// Read key commands from the terminal while practicing.
    pub keyboard: bool,
}

impl Default for PracticeConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl PracticeConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            backend: config.default_backend,
            settings: config.settings(),
            poll_interval: config.poll_interval(),
            media: None,
            vlc_url: config.vlc_url.clone(),
            vlc_password: config.vlc_password.clone(),
            show_progress: true,
            keyboard: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.settings.validate()?;
        if self.backend == Backend::Vlc {
            if let Some(media) = &self.media {
                return Err(ShadowError::Config(format!(
                    "VLC plays its own media; open {} in VLC instead of passing --media",
                    media.display()
                )));
            }
        }
        Ok(())
    }
}

/// Statistics from a practice session.
#[derive(Debug, Clone)]
pub struct PracticeStats {
    /// Wall time from start to stop.
    pub total_time: Duration,
    /// Captions read from the file after normalization.
    pub caption_count: usize,
    /// Segments long enough to practice.
    pub segment_count: usize,
    /// Segments skipped as shorter than the minimum duration.
    pub dropped_segments: usize,
    /// Completed plays, counting every repeat.
    pub repeats_played: usize,
    pub backend: String,
}

#[derive(Debug)]
pub struct PracticeResult {
    /// Phase the scheduler was in when the session stopped.
    pub outcome: Phase,
    pub cancelled: bool,
    pub error: Option<String>,
    pub stats: PracticeStats,
}

/// Run a practice session over a caption file until it ends or fails.
pub async fn run_practice(captions_path: &Path, config: PracticeConfig) -> Result<PracticeResult> {
    let cancelled = Arc::new(AtomicBool::new(false));
    run_practice_with_cancel(captions_path, config, cancelled).await
}

/// Run a practice session that stops early once `cancelled` is set.
pub async fn run_practice_with_cancel(
    captions_path: &Path,
    config: PracticeConfig,
    cancelled: Arc<AtomicBool>,
) -> Result<PracticeResult> {
    let start_time = Instant::now();

    config.validate()?;
    let captions = load_captions(captions_path)?;
    let working = filter_segments(&captions, config.settings.min_duration).len();
    let mut stats = PracticeStats {
        total_time: Duration::ZERO,
        caption_count: captions.len(),
        segment_count: working,
        dropped_segments: captions.len() - working,
        repeats_played: 0,
        backend: config.backend.to_string(),
    };

    info!(
        "Loaded {} captions from {:?}; {} long enough to practice",
        captions.len(),
        captions_path,
        working
    );

    if working == 0 {
        warn!("Nothing to play: no caption reaches the minimum duration");
        stats.total_time = start_time.elapsed();
        return Ok(PracticeResult {
            outcome: Phase::Idle,
            cancelled: false,
            error: None,
            stats,
        });
    }

    let source = build_source(&config, &captions)?;
    let controller = Controller::attach(source, captions, config.settings)?;

    let total = (working * config.settings.repeat_count as usize) as u64;
    let progress = config.show_progress.then(|| {
        let pb = ProgressBar::new(total);
        if let Ok(bar_style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(bar_style.progress_chars("=>-"));
        }
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    });

    let mut keys = if config.keyboard {
        let keys = controls::spawn_key_reader();
        say(progress.as_ref(), style(controls::help_line()).dim().to_string());
        keys
    } else {
        mpsc::unbounded_channel().1
    };
    let mut settings = config.settings;

    let mut updates = controller.subscribe();
    let mut shown: Option<(usize, u32)> = None;
    let mut was_cancelled = false;

    let last = loop {
        let current = updates.borrow_and_update().clone();
        stats.repeats_played = completed_plays(&current);

        if current.phase == Phase::Playing && shown != Some((current.segment_index, current.repeat_index)) {
            shown = Some((current.segment_index, current.repeat_index));
            if let Some(text) = &current.active_text {
                let line = format!(
                    "{} {}",
                    style(format!(
                        "[{}/{} x{}]",
                        current.segment_index + 1,
                        current.segment_count,
                        current.repeat_index + 1
                    ))
                    .dim(),
                    text
                );
                say(progress.as_ref(), line);
            }
        }

        if let Some(pb) = &progress {
            pb.set_length((current.segment_count * current.repeat_count as usize) as u64);
            pb.set_position(stats.repeats_played as u64);
            pb.set_message(current.phase.to_string());
        }

        if matches!(current.phase, Phase::Ended | Phase::Error) {
            break current;
        }

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break current;
                }
            }
            Some(command) = keys.recv() => {
                if command == KeyCommand::Quit {
                    warn!("Practice stopped from the keyboard");
                    was_cancelled = true;
                    break current;
                }
                match controls::apply(&controller, command, settings) {
                    Ok(next) if next != settings => {
                        settings = next;
                        say(progress.as_ref(), describe_settings(&settings));
                    }
                    Ok(_) => debug!("Key command {:?} changed nothing", command),
                    Err(e) => warn!("Key command {:?} failed: {}", command, e),
                }
            }
            _ = time::sleep(CANCEL_CHECK) => {
                if cancelled.load(Ordering::Relaxed) {
                    warn!("Practice cancelled, detaching from {}", config.backend);
                    was_cancelled = true;
                    break current;
                }
            }
        }
    };

    controller.shutdown().await;
    stats.segment_count = last.segment_count;
    stats.dropped_segments = stats.caption_count.saturating_sub(last.segment_count);

    if let Some(pb) = progress {
        match last.phase {
            Phase::Ended => pb.finish_with_message("✓ done"),
            Phase::Error => pb.abandon_with_message("✗ playback failed"),
            _ => pb.abandon_with_message("stopped"),
        }
    }

    stats.total_time = start_time.elapsed();
    debug!("Practice finished in phase {}", last.phase);

    Ok(PracticeResult {
        outcome: last.phase,
        cancelled: was_cancelled,
        error: last.error,
        stats,
    })
}

/// Print above the progress bar when there is one.
fn say(progress: Option<&ProgressBar>, line: String) {
    match progress {
        Some(pb) => pb.println(line),
        None => println!("{}", line),
    }
}

fn describe_settings(settings: &Settings) -> String {
    format!(
        "{} repeat x{}, shadowing x{:.2}, skip under {:.1}s",
        style("→").cyan(),
        settings.repeat_count,
        settings.shadowing_time,
        settings.min_duration
    )
}

fn build_source(config: &PracticeConfig, captions: &[Segment]) -> Result<Arc<dyn PlaybackSource>> {
    match config.backend {
        Backend::Clock => match &config.media {
            Some(path) => Ok(Arc::new(AudioSource::new(path.clone()))),
            None => Ok(Arc::new(ClockSource::new(timeline_length(captions)))),
        },
        Backend::Vlc => {
            let password = config.vlc_password.as_ref().ok_or_else(|| {
                ShadowError::Config(
                    "VLC_PASSWORD not set. Start VLC with --http-password and export it".to_string(),
                )
            })?;
            let api = VlcApi::new(config.vlc_url.clone(), password.clone());
            Ok(Arc::new(PolledSource::new(api).with_interval(config.poll_interval)))
        }
    }
}

/// Length of a synthetic timeline that covers every caption.
fn timeline_length(captions: &[Segment]) -> f64 {
    captions.iter().map(|c| c.end).fold(0.0, f64::max) + CLOCK_TAIL
}

/// Plays finished so far, judged from a projection.
fn completed_plays(projection: &Projection) -> usize {
    let repeat_count = projection.repeat_count as usize;
    match projection.phase {
        Phase::Ended => projection.segment_count * repeat_count,
        Phase::PausedForShadowing => {
            projection.segment_index * repeat_count + projection.repeat_index as usize + 1
        }
        _ => projection.segment_index * repeat_count + projection.repeat_index as usize,
    }
}

/// Print a summary of the practice session.
pub fn print_summary(result: &PracticeResult) {
    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("                      Shadowing Session Complete               ");
    println!("═══════════════════════════════════════════════════════════════");
    println!();
    println!("  Outcome:    {}", result.outcome);
    println!("  Backend:    {}", result.stats.backend);
    println!(
        "  Segments:   {} practiced, {} skipped as too short",
        result.stats.segment_count, result.stats.dropped_segments
    );
    println!("  Plays:      {}", result.stats.repeats_played);
    println!(
        "  Time:       {:.1}s",
        result.stats.total_time.as_secs_f64()
    );
    if result.cancelled {
        println!();
        println!("  Session was cancelled before the last segment.");
    }
    if let Some(ref error) = result.error {
        println!();
        println!("  Error: {}", error);
    }
    println!();
    println!("═══════════════════════════════════════════════════════════════");
}
