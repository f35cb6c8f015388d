use anyhow::{Context, Result};
use clap::Parser;
use shadowing::config::{Backend, Config};
use shadowing::interactive::run_interactive_wizard;
use shadowing::practice::{print_summary, run_practice_with_cancel, PracticeConfig};
use shadowing::scheduler::Phase;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "shadowing")]
#[command(version, about = "Caption-driven shadowing practice")]
#[command(long_about = "Play each caption line, pause long enough to repeat it aloud, and move on. \
Plays a local audio file, a silent media clock, or drives a running VLC instance.")]
struct Cli {
    /// Caption file (.srt, .vtt or .json)
    #[arg(required_unless_present = "interactive")]
    captions: Option<PathBuf>,

    /// Audio file to play with the local backend
    #[arg(long)]
    media: Option<PathBuf>,

    /// Playback backend: clock, vlc
    #[arg(short, long)]
    backend: Option<String>,

    /// VLC HTTP interface address
    #[arg(long)]
    vlc_url: Option<String>,

    /// Times each segment is played (1-10)
    #[arg(short, long)]
    repeat: Option<u32>,

    /// Pause length as a multiple of the segment length (0.5-3.0)
    #[arg(short, long)]
    shadowing_time: Option<f64>,

    /// Skip segments shorter than this many seconds
    #[arg(short, long)]
    min_duration: Option<f64>,

    /// Position sampling interval for polled backends, in milliseconds
    #[arg(long)]
    poll_ms: Option<u64>,

    /// Run the interactive setup wizard
    #[arg(short, long)]
    interactive: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

/// Command-line flags override file and environment settings.
fn apply_overrides(config: &mut Config, cli: &Cli) -> Result<Backend> {
    if let Some(repeat) = cli.repeat {
        config.repeat_count = repeat;
    }
    if let Some(time) = cli.shadowing_time {
        config.shadowing_time = time;
    }
    if let Some(min) = cli.min_duration {
        config.min_duration = min;
    }
    if let Some(poll) = cli.poll_ms {
        config.poll_interval_ms = poll;
    }
    if let Some(ref url) = cli.vlc_url {
        config.vlc_url = url.clone();
    }

    let backend = match cli.backend {
        Some(ref name) => name.parse().map_err(|e: String| anyhow::anyhow!(e))?,
        None => config.default_backend,
    };
    config.default_backend = backend;
    Ok(backend)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let (captions, config, practice_config) = if cli.interactive {
        let wizard = run_interactive_wizard()?;
        (wizard.captions, wizard.config, wizard.practice_config)
    } else {
        let captions = cli
            .captions
            .clone()
            .context("A caption file is required")?;
        if !captions.exists() {
            anyhow::bail!("Caption file not found: {}", captions.display());
        }

        let mut config = Config::load().context("Failed to load configuration")?;
        apply_overrides(&mut config, &cli)?;

        let mut practice_config = PracticeConfig::from_config(&config);
        practice_config.media = cli.media.clone();
        (captions, config, practice_config)
    };

    config
        .validate(practice_config.backend)
        .context("Configuration validation failed")?;

    info!("Captions:  {}", captions.display());
    info!("Backend:   {}", practice_config.backend);
    info!(
        "Settings:  repeat {}, shadowing x{}, skip under {}s",
        config.repeat_count, config.shadowing_time, config.min_duration
    );

    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = cancelled.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::Relaxed);
    })
    .context("Failed to install Ctrl+C handler")?;

    let result = run_practice_with_cancel(&captions, practice_config, cancelled).await?;
    print_summary(&result);

    if result.outcome == Phase::Error {
        warn!("Playback stopped on a source error");
        std::process::exit(1);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_requires_captions_unless_interactive() {
        assert!(Cli::try_parse_from(["shadowing"]).is_err());
        assert!(Cli::try_parse_from(["shadowing", "--interactive"]).is_ok());

        let cli = Cli::try_parse_from(["shadowing", "lesson.srt", "-r", "2", "-s", "1.5"]).unwrap();
        assert_eq!(cli.captions, Some(PathBuf::from("lesson.srt")));
        assert_eq!(cli.repeat, Some(2));
        assert_eq!(cli.shadowing_time, Some(1.5));
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "shadowing",
            "lesson.vtt",
            "--backend",
            "vlc",
            "-m",
            "0.8",
            "--poll-ms",
            "500",
        ])
        .unwrap();
        let mut config = Config::default();
        let backend = apply_overrides(&mut config, &cli).unwrap();

        assert_eq!(backend, Backend::Vlc);
        assert_eq!(config.min_duration, 0.8);
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.repeat_count, 3);
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let cli = Cli::try_parse_from(["shadowing", "lesson.srt", "-b", "youtube"]).unwrap();
        assert!(apply_overrides(&mut Config::default(), &cli).is_err());
    }
}
