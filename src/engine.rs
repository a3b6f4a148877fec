use crossbeam::channel::{Receiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::{
    PlayerConfig,
    error::{Error, Result, TransportError},
    events::PlaybackSignal,
    output::{Pacer, Transport, broadcast_all_off},
    timing::{
        self, ControlAck, EventStream, IgnoredReason, RunOutcome, SchedulerConfig,
        SharedPlayback,
    },
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub file_id: Option<String>,
    pub position: Duration,
    pub total: Option<Duration>,
    pub remaining: Option<Duration>,
    pub is_playing: bool,
    pub is_paused: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub file_id: String,
    pub events: usize,
    pub total: Option<Duration>,
}

struct Loaded {
    file_id: String,
    stream: Arc<EventStream>,
}

#[derive(Default)]
struct SignalHub {
    subscribers: Mutex<Vec<Sender<PlaybackSignal>>>,
}

impl SignalHub {
    fn subscribe(&self) -> Receiver<PlaybackSignal> {
        let (tx, rx) = crossbeam::channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    fn emit(&self, signal: PlaybackSignal) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(signal.clone()).is_ok());
    }
}

/// Transport and worker handle. The transport lives here while idle and
/// moves into the worker for the length of a playback.
struct Control {
    transport: Option<Box<dyn Transport>>,
    worker: Option<JoinHandle<Box<dyn Transport>>>,
}

/// One playback session: a loaded stream, a transport, and at most one
/// delivery worker.
///
/// Control calls may come from any thread. Redundant ones are acknowledged
/// with [`ControlAck::Ignored`].
pub struct Session {
    config: PlayerConfig,
    shared: Arc<SharedPlayback>,
    signals: Arc<SignalHub>,
    loaded: Mutex<Option<Arc<Loaded>>>,
    control: Mutex<Control>,
}

impl Session {
    pub fn new(transport: impl Transport + 'static, config: PlayerConfig) -> Self {
        Self {
            config,
            shared: Arc::new(SharedPlayback::new()),
            signals: Arc::new(SignalHub::default()),
            loaded: Mutex::new(None),
            control: Mutex::new(Control {
                transport: Some(Box::new(transport)),
                worker: None,
            }),
        }
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn subscribe(&self) -> Receiver<PlaybackSignal> {
        self.signals.subscribe()
    }

    /// Parses `bytes` and makes the result the stream for the next `start`.
    ///
    /// Refused while a playback is active. A malformed file leaves the
    /// previously loaded stream in place.
    pub fn load(&self, file_id: impl Into<String>, bytes: &[u8]) -> Result<LoadSummary> {
        let stream = EventStream::from_bytes(bytes, &self.config.loader)?;
        self.install(file_id.into(), stream)
    }

    pub fn load_file(&self, path: &Path) -> Result<LoadSummary> {
        let stream = EventStream::load_file(path, &self.config.loader)?;
        let file_id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.install(file_id, stream)
    }

    pub fn load_stream(&self, file_id: impl Into<String>, stream: EventStream) -> Result<LoadSummary> {
        self.install(file_id.into(), stream)
    }

    // Holds the control lock so a start that is still opening the transport
    // or silencing channels counts as active.
    fn install(&self, file_id: String, stream: EventStream) -> Result<LoadSummary> {
        let _control = self.control.lock();
        if self.shared.lock().is_active() {
            return Err(Error::Busy);
        }
        let summary = LoadSummary {
            file_id: file_id.clone(),
            events: stream.len(),
            total: stream.total(),
        };
        tracing::info!(
            file_id = %summary.file_id,
            events = summary.events,
            total_ms = summary.total.map(|t| t.as_millis() as u64),
            "stream loaded"
        );
        *self.loaded.lock() = Some(Arc::new(Loaded {
            file_id,
            stream: Arc::new(stream),
        }));
        Ok(summary)
    }

    pub fn start(&self) -> Result<ControlAck> {
        let mut control = self.control.lock();
        if self.shared.lock().is_active() {
            return Ok(ControlAck::Ignored(IgnoredReason::AlreadyActive));
        }
        let loaded = self.loaded.lock().clone().ok_or(Error::NothingLoaded)?;
        reap_worker(&mut control);

        let mut transport = control
            .transport
            .take()
            .ok_or(Error::Transport(TransportError::NotOpen))?;

        if let Err(e) = transport.open() {
            tracing::error!(transport = %transport.describe(), "open failed: {e}");
            control.transport = Some(transport);
            self.signals.emit(PlaybackSignal::Error {
                message: e.to_string(),
            });
            return Err(e.into());
        }

        let channels = self.config.loader.controlled_channels();
        let mut pacer = Pacer::new(self.config.pacer.clone());
        if let Err(e) = broadcast_all_off(&mut pacer, &mut transport, &channels) {
            tracing::error!("all-off before start failed: {e}");
            transport.close();
            control.transport = Some(transport);
            self.signals.emit(PlaybackSignal::Error {
                message: e.to_string(),
            });
            return Err(e.into());
        }

        // Cannot fail: the status was checked under the control lock.
        let _ = self.shared.update(|s| s.start(Instant::now()));
        tracing::info!(file_id = %loaded.file_id, events = loaded.stream.len(), "playback started");
        self.signals.emit(PlaybackSignal::Started {
            file_id: loaded.file_id.clone(),
        });

        let worker = Worker {
            stream: loaded.stream.clone(),
            shared: self.shared.clone(),
            signals: self.signals.clone(),
            scheduler: self.config.scheduler.clone(),
            channels,
        };
        control.worker = Some(std::thread::spawn(move || worker.run(pacer, transport)));
        Ok(ControlAck::Applied)
    }

    pub fn pause(&self) -> ControlAck {
        let ack: ControlAck = self.shared.update(|s| s.pause(Instant::now())).into();
        if ack.is_applied() {
            tracing::info!(position_ms = self.position().as_millis() as u64, "paused");
            self.signals.emit(PlaybackSignal::Paused);
        }
        ack
    }

    pub fn resume(&self) -> ControlAck {
        let ack: ControlAck = self.shared.update(|s| s.resume(Instant::now())).into();
        if ack.is_applied() {
            tracing::info!("resumed");
            self.signals.emit(PlaybackSignal::Resumed);
        }
        ack
    }

    /// Requests a stop and waits for the worker to silence the output and
    /// release the transport.
    pub fn stop(&self) -> ControlAck {
        let mut control = self.control.lock();
        let ack: ControlAck = self.shared.update(|s| s.request_stop()).into();
        reap_worker(&mut control);
        ack
    }

    pub fn position(&self) -> Duration {
        let total = self.total();
        self.shared.lock().position(Instant::now(), total)
    }

    pub fn total(&self) -> Option<Duration> {
        self.loaded.lock().as_ref().and_then(|l| l.stream.total())
    }

    pub fn is_playing(&self) -> bool {
        self.shared.lock().is_playing()
    }

    pub fn is_paused(&self) -> bool {
        self.shared.lock().is_paused()
    }

    pub fn status(&self) -> StatusSnapshot {
        let (file_id, total) = match self.loaded.lock().as_ref() {
            Some(loaded) => (Some(loaded.file_id.clone()), loaded.stream.total()),
            None => (None, None),
        };
        let state = self.shared.lock();
        let position = state.position(Instant::now(), total);
        StatusSnapshot {
            file_id,
            position,
            total,
            remaining: total.map(|t| t.saturating_sub(position)),
            is_playing: state.is_playing(),
            is_paused: state.is_paused(),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

fn reap_worker(control: &mut Control) {
    if let Some(handle) = control.worker.take() {
        match handle.join() {
            Ok(transport) => control.transport = Some(transport),
            Err(_) => tracing::error!("playback worker panicked; transport lost"),
        }
    }
}

struct Worker {
    stream: Arc<EventStream>,
    shared: Arc<SharedPlayback>,
    signals: Arc<SignalHub>,
    scheduler: SchedulerConfig,
    channels: Vec<u8>,
}

impl Worker {
    fn run(self, mut pacer: Pacer, mut transport: Box<dyn Transport>) -> Box<dyn Transport> {
        let outcome = timing::run_stream(
            &self.stream,
            &self.shared,
            &mut pacer,
            &mut transport,
            &self.scheduler,
        );

        self.shared.update(|s| s.reset());
        if let Err(e) = broadcast_all_off(&mut pacer, &mut transport, &self.channels) {
            tracing::warn!("all-off after playback failed: {e}");
        }
        transport.close();

        let signal = match outcome {
            RunOutcome::Finished => {
                tracing::info!("playback finished");
                PlaybackSignal::Finished
            }
            RunOutcome::Stopped => {
                tracing::info!("playback stopped");
                PlaybackSignal::Stopped
            }
            RunOutcome::Failed(e) => PlaybackSignal::Error {
                message: e.to_string(),
            },
        };
        self.signals.emit(signal);
        transport
    }
}
