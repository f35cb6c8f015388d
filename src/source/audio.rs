use super::{PlaybackSource, ProgressMode, SourceEvent, EVENT_CAPACITY};
use crate::error::SourceError;
use crate::media::probe_duration;
use async_trait::async_trait;
use rodio::{Decoder, OutputStream, Sink, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::clock::DEFAULT_TICK;

enum AudioCommand {
    Seek(f64, oneshot::Sender<Result<(), SourceError>>),
    Play,
    Pause,
    Status(oneshot::Sender<EngineStatus>),
}

#[derive(Debug, Clone, Copy)]
struct EngineStatus {
    position: f64,
    finished: bool,
}

/// Playhead of the sink, kept on the engine thread.
#[derive(Debug, Default)]
struct Playhead {
    base: f64,
    anchor: Option<std::time::Instant>,
}

impl Playhead {
    fn position(&self) -> f64 {
        match self.anchor {
            Some(anchor) => self.base + anchor.elapsed().as_secs_f64(),
            None => self.base,
        }
    }

    fn seek(&mut self, seconds: f64) {
        self.base = seconds;
        if self.anchor.is_some() {
            self.anchor = Some(std::time::Instant::now());
        }
    }

    fn play(&mut self) {
        if self.anchor.is_none() {
            self.anchor = Some(std::time::Instant::now());
        }
    }

    fn pause(&mut self) {
        self.base = self.position();
        self.anchor = None;
    }
}

/// Plays a local audio file through the default output device.
///
/// rodio's stream and sink are not `Send`, so they live on a dedicated
/// `audio-engine` thread and everything else talks to it over a channel. A
/// ticker task samples the sink while playing and pushes progress, then
/// [`SourceEvent::Ended`] once the decoder runs dry.
pub struct AudioSource {
    path: PathBuf,
    engine: Mutex<Option<Sender<AudioCommand>>>,
    duration: Mutex<Option<f64>>,
    playing: Arc<AtomicBool>,
    events: broadcast::Sender<SourceEvent>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    tick: Duration,
}

impl AudioSource {
    pub fn new(path: PathBuf) -> Self {
        Self::with_tick(path, DEFAULT_TICK)
    }

    pub fn with_tick(path: PathBuf, tick: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            path,
            engine: Mutex::new(None),
            duration: Mutex::new(None),
            playing: Arc::new(AtomicBool::new(false)),
            events,
            ticker: Mutex::new(None),
            tick,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    /// Media length, once known.
    pub fn duration(&self) -> Option<f64> {
        *self.duration.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn engine(&self) -> Result<Sender<AudioCommand>, SourceError> {
        self.engine
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(SourceError::NotReady)
    }

    fn send(&self, command: AudioCommand) -> Result<(), SourceError> {
        self.engine()?
            .send(command)
            .map_err(|_| SourceError::Transport("audio engine stopped".to_string()))
    }

    async fn status(&self) -> Result<EngineStatus, SourceError> {
        let (tx, rx) = oneshot::channel();
        self.send(AudioCommand::Status(tx))?;
        rx.await
            .map_err(|_| SourceError::Transport("audio engine stopped".to_string()))
    }
}

impl Drop for AudioSource {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.lock().unwrap_or_else(|e| e.into_inner()).take() {
            ticker.abort();
        }
    }
}

/// Open and decode `path`. Fails before any output device is touched.
fn open_media(path: &Path) -> Result<Decoder<BufReader<File>>, SourceError> {
    let file = File::open(path)
        .map_err(|e| SourceError::Load(format!("Cannot open {}: {e}", path.display())))?;
    Decoder::new(BufReader::new(file))
        .map_err(|e| SourceError::Load(format!("Unsupported audio in {}: {e}", path.display())))
}

fn start_engine(
    path: PathBuf,
    commands: Receiver<AudioCommand>,
    ready: oneshot::Sender<Result<Option<f64>, SourceError>>,
) {
    let opened = open_media(&path).and_then(|decoder| {
        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| SourceError::Load(format!("No audio output device: {e}")))?;
        let sink = Sink::try_new(&handle)
            .map_err(|e| SourceError::Load(format!("Failed to create audio sink: {e}")))?;
        let duration = decoder.total_duration().map(|d| d.as_secs_f64());
        sink.pause();
        sink.append(decoder);
        Ok((stream, sink, duration))
    });

    let (_stream, sink) = match opened {
        Ok((stream, sink, duration)) => {
            let _ = ready.send(Ok(duration));
            (stream, sink)
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let mut playhead = Playhead::default();
    while let Ok(command) = commands.recv() {
        match command {
            AudioCommand::Seek(seconds, reply) => {
                let result = seek_sink(&sink, &path, seconds);
                if result.is_ok() {
                    playhead.seek(seconds);
                }
                let _ = reply.send(result);
            }
            AudioCommand::Play => {
                sink.play();
                playhead.play();
            }
            AudioCommand::Pause => {
                sink.pause();
                playhead.pause();
            }
            AudioCommand::Status(reply) => {
                let finished = sink.empty();
                if finished {
                    playhead.pause();
                }
                let _ = reply.send(EngineStatus {
                    position: playhead.position(),
                    finished,
                });
            }
        }
    }
    sink.stop();
    debug!("Audio engine for {:?} stopped", path);
}

fn seek_sink(sink: &Sink, path: &Path, seconds: f64) -> Result<(), SourceError> {
    // A drained sink has dropped its decoder; queue the file again.
    if sink.empty() {
        sink.pause();
        sink.append(open_media(path)?);
    }
    sink.try_seek(Duration::from_secs_f64(seconds.max(0.0)))
        .map_err(|e| SourceError::Transport(format!("Seek to {seconds:.3}s failed: {e}")))
}

async fn run_ticker(
    engine: Sender<AudioCommand>,
    playing: Arc<AtomicBool>,
    events: broadcast::Sender<SourceEvent>,
    tick: Duration,
) {
    let mut interval = time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        if !playing.load(Ordering::SeqCst) {
            continue;
        }

        let (tx, rx) = oneshot::channel();
        if engine.send(AudioCommand::Status(tx)).is_err() {
            break;
        }
        let Ok(status) = rx.await else {
            break;
        };

        let _ = events.send(SourceEvent::Progress(status.position));
        if status.finished {
            debug!("Audio reached the end at {:.3}s", status.position);
            playing.store(false, Ordering::SeqCst);
            let _ = events.send(SourceEvent::Ended);
        }
    }
}

#[async_trait]
impl PlaybackSource for AudioSource {
    fn name(&self) -> &'static str {
        "audio file"
    }

    fn progress_mode(&self) -> ProgressMode {
        ProgressMode::Push
    }

    fn subscribe(&self) -> broadcast::Receiver<SourceEvent> {
        self.events.subscribe()
    }

    async fn ready(&self) -> Result<(), SourceError> {
        if self.engine().is_ok() {
            return Ok(());
        }

        let (commands, receiver) = mpsc::channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let path = self.path.clone();
        thread::Builder::new()
            .name("audio-engine".to_string())
            .spawn(move || start_engine(path, receiver, ready_tx))
            .map_err(|e| SourceError::Load(format!("Failed to start audio thread: {e}")))?;

        let decoded = ready_rx
            .await
            .map_err(|_| SourceError::Load("audio engine exited during startup".to_string()))??;

        let duration = match decoded {
            Some(duration) => Some(duration),
            None => match probe_duration(&self.path).await {
                Ok(duration) => Some(duration),
                Err(e) => {
                    warn!("Audio length unknown, seeks are not clamped: {}", e);
                    None
                }
            },
        };
        *self.duration.lock().unwrap_or_else(|e| e.into_inner()) = duration;

        let ticker = tokio::spawn(run_ticker(
            commands.clone(),
            self.playing.clone(),
            self.events.clone(),
            self.tick,
        ));
        *self.ticker.lock().unwrap_or_else(|e| e.into_inner()) = Some(ticker);
        *self.engine.lock().unwrap_or_else(|e| e.into_inner()) = Some(commands);

        info!("Loaded audio {}", self.path.display());
        Ok(())
    }

    async fn current_position(&self) -> Result<f64, SourceError> {
        Ok(self.status().await?.position)
    }

    async fn seek(&self, seconds: f64) -> Result<(), SourceError> {
        let target = match self.duration() {
            Some(duration) => seconds.clamp(0.0, duration.max(0.0)),
            None => seconds.max(0.0),
        };
        let (tx, rx) = oneshot::channel();
        self.send(AudioCommand::Seek(target, tx))?;
        rx.await
            .map_err(|_| SourceError::Transport("audio engine stopped".to_string()))?
    }

    async fn play(&self) -> Result<(), SourceError> {
        self.send(AudioCommand::Play)?;
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn pause(&self) -> Result<(), SourceError> {
        self.send(AudioCommand::Pause)?;
        self.playing.store(false, Ordering::SeqCst);
        Ok(())
    }
}
