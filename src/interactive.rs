use crate::config::{
    validate_min_duration, validate_repeat_count, Backend, Config, REPEAT_COUNT_RANGE,
};
use crate::practice::PracticeConfig;
use console::style;
use dialoguer::{Confirm, FuzzySelect, Input, Password, Select};
use std::fs;
use std::path::{Path, PathBuf};

const CAPTION_EXTENSIONS: &[&str] = &["srt", "vtt", "json"];

/// Formats the local audio backend decodes.
const MEDIA_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "ogg"];

const SHADOWING_PRESETS: &[(f64, &str)] = &[
    (0.5, "Quick echo"),
    (1.0, "Same length as the line"),
    (1.5, "Relaxed"),
    (2.0, "Twice the line"),
    (3.0, "Slow and careful"),
];

pub struct InteractiveResult {
    pub captions: PathBuf,
    pub config: Config,
    pub practice_config: PracticeConfig,
}

pub fn run_interactive_wizard() -> anyhow::Result<InteractiveResult> {
    print_header();

    let mut config = Config::load().unwrap_or_default();

    // Step 1: Caption file
    let captions = select_file(
        "Select caption file:",
        CAPTION_EXTENSIONS,
        "No caption files (.srt, .vtt, .json) found in current directory.",
    )?;

    // Step 2: Practice parameters
    config.repeat_count = select_repeat_count(config.repeat_count)?;
    config.shadowing_time = select_shadowing_time(config.shadowing_time)?;
    config.min_duration = select_min_duration(config.min_duration)?;

    // Step 3: Backend
    let backend = select_backend(&mut config)?;
    config.default_backend = backend;

    // Step 4: Audio to play locally; VLC plays its own media
    let media = match backend {
        Backend::Clock => select_media()?,
        Backend::Vlc => None,
    };

    // Step 5: Confirm
    print_summary(&captions, media.as_deref(), &config);

    if !Confirm::new()
        .with_prompt("Start practicing with these settings?")
        .default(true)
        .interact()?
    {
        anyhow::bail!("Cancelled by user");
    }

    if Confirm::new()
        .with_prompt("Save these settings as defaults?")
        .default(false)
        .interact()?
    {
        let path = config.save()?;
        println!("{} Settings saved to {}\n", style("✓").green(), path.display());
    }

    println!();

    let mut practice_config = PracticeConfig::from_config(&config);
    practice_config.media = media;

    Ok(InteractiveResult {
        captions,
        config,
        practice_config,
    })
}

fn print_header() {
    println!();
    println!(
        "{}",
        style("╔═══════════════════════════════════════════════════╗").cyan()
    );
    println!(
        "{}",
        style("║         shadowing - listen, pause, repeat         ║").cyan()
    );
    println!(
        "{}",
        style("╚═══════════════════════════════════════════════════╝").cyan()
    );
    println!();
}

fn select_file(prompt: &str, extensions: &[&str], none_found: &str) -> anyhow::Result<PathBuf> {
    println!("\n{}", style(prompt).bold());

    let files = scan_files(".", extensions)?;

    if files.is_empty() {
        println!("  {}\n", none_found);
        return enter_path();
    }

    let mut items: Vec<String> = files
        .iter()
        .map(|f| {
            let size = fs::metadata(f)
                .map(|m| format_size(m.len()))
                .unwrap_or_else(|_| "?".to_string());
            format!("{} ({})", f.display(), size)
        })
        .collect();
    items.push("Enter custom path...".to_string());

    let selection = FuzzySelect::new()
        .with_prompt("Choose a file")
        .items(&items)
        .default(0)
        .interact()?;

    if selection == files.len() {
        enter_path()
    } else {
        Ok(files[selection].clone())
    }
}

fn enter_path() -> anyhow::Result<PathBuf> {
    let path: String = Input::new()
        .with_prompt("Enter file path")
        .interact_text()?;
    let path = PathBuf::from(path.trim());
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    Ok(path)
}

fn select_media() -> anyhow::Result<Option<PathBuf>> {
    if !Confirm::new()
        .with_prompt("Play a local audio file along with the captions?")
        .default(false)
        .interact()?
    {
        return Ok(None);
    }

    let path = select_file(
        "Select audio file:",
        MEDIA_EXTENSIONS,
        "No media files found in current directory.",
    )?;
    Ok(Some(path))
}

fn scan_files(dir: &str, extensions: &[&str]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_file() && has_extension(&path, extensions) {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn select_repeat_count(current: u32) -> anyhow::Result<u32> {
    let count: u32 = Input::new()
        .with_prompt(format!(
            "Repeats per segment ({}-{})",
            REPEAT_COUNT_RANGE.start(),
            REPEAT_COUNT_RANGE.end()
        ))
        .default(current)
        .validate_with(|c: &u32| validate_repeat_count(*c).map_err(|e| e.to_string()))
        .interact_text()?;
    Ok(count)
}

fn select_shadowing_time(current: f64) -> anyhow::Result<f64> {
    let items: Vec<String> = SHADOWING_PRESETS
        .iter()
        .map(|(multiplier, label)| format!("x{:.1} - {}", multiplier, label))
        .collect();

    let default = preset_index(current);

    let selection = Select::new()
        .with_prompt("Pause length after each line")
        .items(&items)
        .default(default)
        .interact()?;

    Ok(SHADOWING_PRESETS[selection].0)
}

/// Index of the preset closest to `multiplier`.
fn preset_index(multiplier: f64) -> usize {
    SHADOWING_PRESETS
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (a.0 - multiplier).abs().total_cmp(&(b.0 - multiplier).abs()))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn select_min_duration(current: f64) -> anyhow::Result<f64> {
    let min: f64 = Input::new()
        .with_prompt("Skip lines shorter than (seconds)")
        .default(current)
        .validate_with(|m: &f64| validate_min_duration(*m).map_err(|e| e.to_string()))
        .interact_text()?;
    Ok(min)
}

fn select_backend(config: &mut Config) -> anyhow::Result<Backend> {
    let backends = [
        ("Local", "Play an audio file here, or a silent clock", Backend::Clock),
        ("VLC", "Drive a running VLC over its HTTP interface", Backend::Vlc),
    ];

    let items: Vec<String> = backends
        .iter()
        .map(|(name, desc, _)| format!("{} - {}", name, desc))
        .collect();

    let default = backends
        .iter()
        .position(|(_, _, b)| *b == config.default_backend)
        .unwrap_or(0);

    let selection = Select::new()
        .with_prompt("Select playback backend")
        .items(&items)
        .default(default)
        .interact()?;

    let backend = backends[selection].2;

    if backend == Backend::Vlc {
        config.vlc_url = Input::new()
            .with_prompt("VLC HTTP address")
            .default(config.vlc_url.clone())
            .interact_text()?;

        if config.vlc_password.is_none() {
            println!(
                "{} VLC password not found",
                style("!").yellow()
            );
            println!("  Start VLC with: vlc --extraintf http --http-password <secret>\n");

            let password = Password::new()
                .with_prompt("Enter the VLC HTTP password")
                .interact()?;
            if password.trim().is_empty() {
                anyhow::bail!("VLC password is required");
            }
            config.vlc_password = Some(password);
        }
    }

    Ok(backend)
}

fn print_summary(captions: &Path, media: Option<&Path>, config: &Config) {
    println!("\n{}", style("═══ Summary ═══").bold());
    println!("  Captions:  {}", style(captions.display()).cyan());
    if let Some(media) = media {
        println!("  Media:     {}", style(media.display()).cyan());
    }
    println!("  Repeats:   {}", config.repeat_count);
    println!("  Shadowing: x{:.1}", config.shadowing_time);
    println!("  Skip <:    {:.1}s", config.min_duration);
    println!("  Backend:   {}", config.default_backend);
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(500), "500 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1024 * 1024), "1.0 MB");
        assert_eq!(format_size(1024 * 1024 * 1024), "1.0 GB");
    }

    #[test]
    fn test_has_extension() {
        assert!(has_extension(Path::new("lesson.SRT"), CAPTION_EXTENSIONS));
        assert!(has_extension(Path::new("talk.vtt"), CAPTION_EXTENSIONS));
        assert!(!has_extension(Path::new("talk.mp4"), CAPTION_EXTENSIONS));
        assert!(!has_extension(Path::new("README"), CAPTION_EXTENSIONS));
        assert!(has_extension(Path::new("talk.mp3"), MEDIA_EXTENSIONS));
    }

    #[test]
    fn test_preset_index() {
        assert_eq!(preset_index(1.0), 1);
        assert_eq!(preset_index(2.2), 3);
        assert_eq!(preset_index(9.0), SHADOWING_PRESETS.len() - 1);
    }

    #[test]
    fn test_scan_files_filters_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.srt"), "").unwrap();
        fs::write(dir.path().join("a.vtt"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        let files = scan_files(dir.path().to_str().unwrap(), CAPTION_EXTENSIONS).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.vtt", "b.srt"]);
    }
}
