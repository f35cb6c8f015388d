//! Keyboard controls for a running practice session.

use crate::controller::Controller;
use crate::error::Result;
use crate::scheduler::Settings;
use console::{Key, Term};
use std::thread;
use tokio::sync::mpsc;
use tracing::debug;

/// Shadowing multiplier change per key press.
pub const SHADOWING_STEP: f64 = 0.25;

/// Minimum segment duration change per key press, in seconds.
pub const MIN_DURATION_STEP: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    Play,
    MoreRepeats,
    FewerRepeats,
    LongerPause,
    ShorterPause,
    RaiseMinDuration,
    LowerMinDuration,
    Quit,
}

impl KeyCommand {
    pub fn from_key(key: &Key) -> Option<Self> {
        let command = match key {
            Key::Char(' ' | 'p') | Key::Enter => Self::Play,
            Key::Char('+' | '=') | Key::ArrowUp => Self::MoreRepeats,
            Key::Char('-') | Key::ArrowDown => Self::FewerRepeats,
            Key::Char(']') | Key::ArrowRight => Self::LongerPause,
            Key::Char('[') | Key::ArrowLeft => Self::ShorterPause,
            Key::Char('>' | '.') => Self::RaiseMinDuration,
            Key::Char('<' | ',') => Self::LowerMinDuration,
            Key::Char('q') | Key::Escape => Self::Quit,
            _ => return None,
        };
        Some(command)
    }

    /// The settings this command asks for, or `None` if it leaves them alone
    /// or would push one out of range.
    pub fn adjust(self, settings: Settings) -> Option<Settings> {
        let mut next = settings;
        match self {
            Self::MoreRepeats => next.repeat_count = settings.repeat_count.checked_add(1)?,
            Self::FewerRepeats => next.repeat_count = settings.repeat_count.checked_sub(1)?,
            Self::LongerPause => next.shadowing_time = settings.shadowing_time + SHADOWING_STEP,
            Self::ShorterPause => next.shadowing_time = settings.shadowing_time - SHADOWING_STEP,
            Self::RaiseMinDuration => next.min_duration = settings.min_duration + MIN_DURATION_STEP,
            Self::LowerMinDuration => {
                next.min_duration = (settings.min_duration - MIN_DURATION_STEP).max(0.0)
            }
            Self::Play | Self::Quit => return None,
        }
        (next != settings && next.validate().is_ok()).then_some(next)
    }
}

/// Send one command to the scheduler. Returns the settings now in force.
pub fn apply(controller: &Controller, command: KeyCommand, settings: Settings) -> Result<Settings> {
    if command == KeyCommand::Play {
        controller.play()?;
        return Ok(settings);
    }
    let Some(next) = command.adjust(settings) else {
        return Ok(settings);
    };

    if next.repeat_count != settings.repeat_count {
        controller.set_repeat_count(next.repeat_count)?;
    }
    if next.shadowing_time != settings.shadowing_time {
        controller.set_shadowing_time(next.shadowing_time)?;
    }
    if next.min_duration != settings.min_duration {
        controller.set_min_duration(next.min_duration)?;
    }
    Ok(next)
}

/// Read keys from the terminal on a background thread.
///
/// Returns a receiver that never yields when stdout is not a terminal. The
/// reader thread stays blocked on the terminal until the next key after the
/// receiver is dropped.
pub fn spawn_key_reader() -> mpsc::UnboundedReceiver<KeyCommand> {
    let (tx, rx) = mpsc::unbounded_channel();
    let term = Term::stdout();
    if !term.is_term() {
        return rx;
    }

    let spawned = thread::Builder::new()
        .name("key-reader".to_string())
        .spawn(move || loop {
            let command = match term.read_key() {
                Ok(key) => match KeyCommand::from_key(&key) {
                    Some(command) => command,
                    None => continue,
                },
                // Ctrl+C in raw mode surfaces as an interrupted read.
                Err(_) => KeyCommand::Quit,
            };
            if tx.send(command).is_err() || command == KeyCommand::Quit {
                break;
            }
        });
    if let Err(e) = spawned {
        debug!("Keyboard controls unavailable: {}", e);
    }
    rx
}

/// One-line key reference printed when a session starts.
pub fn help_line() -> &'static str {
    "keys: space play · +/- repeats · [/] pause length · </> min duration · q quit"
}
