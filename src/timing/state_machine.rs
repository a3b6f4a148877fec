use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackStatus {
    Stopped,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IgnoredReason {
    AlreadyActive,
    NoActiveSession,
    AlreadyPaused,
    NotPaused,
    /// A stop was requested and the worker has not exited yet.
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlAck {
    Applied,
    Ignored(IgnoredReason),
}

impl ControlAck {
    pub fn is_applied(&self) -> bool {
        matches!(self, ControlAck::Applied)
    }
}

impl From<Result<(), IgnoredReason>> for ControlAck {
    fn from(result: Result<(), IgnoredReason>) -> Self {
        match result {
            Ok(()) => ControlAck::Applied,
            Err(reason) => ControlAck::Ignored(reason),
        }
    }
}

/// Status plus the timing fields that map stream offsets to wall-clock
/// deadlines.
///
/// ```text
/// Stopped --start--> Playing --pause--> Paused --resume--> Playing
/// Playing | Paused --stop / stream end / fatal error--> Stopped
/// ```
#[derive(Debug, Clone)]
pub struct PlaybackState {
    status: PlaybackStatus,
    origin: Option<Instant>,
    paused_total: Duration,
    pause_started: Option<Instant>,
    stop_requested: bool,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackState {
    pub fn new() -> Self {
        Self {
            status: PlaybackStatus::Stopped,
            origin: None,
            paused_total: Duration::ZERO,
            pause_started: None,
            stop_requested: false,
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status != PlaybackStatus::Stopped
    }

    pub fn is_playing(&self) -> bool {
        self.status == PlaybackStatus::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.status == PlaybackStatus::Paused
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    pub fn start(&mut self, now: Instant) -> Result<(), IgnoredReason> {
        if self.is_active() {
            return Err(IgnoredReason::AlreadyActive);
        }
        *self = Self::new();
        self.status = PlaybackStatus::Playing;
        self.origin = Some(now);
        Ok(())
    }

    pub fn pause(&mut self, now: Instant) -> Result<(), IgnoredReason> {
        if self.stop_requested {
            return Err(IgnoredReason::Stopping);
        }
        match self.status {
            PlaybackStatus::Stopped => Err(IgnoredReason::NoActiveSession),
            PlaybackStatus::Paused => Err(IgnoredReason::AlreadyPaused),
            PlaybackStatus::Playing => {
                self.status = PlaybackStatus::Paused;
                self.pause_started = Some(now);
                Ok(())
            }
        }
    }

    /// Folds the length of the pause into the accumulator so later deadlines
    /// shift by exactly that much.
    pub fn resume(&mut self, now: Instant) -> Result<(), IgnoredReason> {
        if self.stop_requested {
            return Err(IgnoredReason::Stopping);
        }
        match self.status {
            PlaybackStatus::Stopped => Err(IgnoredReason::NoActiveSession),
            PlaybackStatus::Playing => Err(IgnoredReason::NotPaused),
            PlaybackStatus::Paused => {
                if let Some(started) = self.pause_started.take() {
                    self.paused_total += now.saturating_duration_since(started);
                }
                self.status = PlaybackStatus::Playing;
                Ok(())
            }
        }
    }

    pub fn request_stop(&mut self) -> Result<(), IgnoredReason> {
        if !self.is_active() {
            return Err(IgnoredReason::NoActiveSession);
        }
        self.stop_requested = true;
        Ok(())
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn deadline(&self, offset: Duration) -> Option<Instant> {
        self.origin.map(|origin| origin + self.paused_total + offset)
    }

    pub fn position(&self, now: Instant, total: Option<Duration>) -> Duration {
        let Some(origin) = self.origin else {
            return Duration::ZERO;
        };
        let reference = match self.status {
            PlaybackStatus::Stopped => return Duration::ZERO,
            PlaybackStatus::Playing => now,
            PlaybackStatus::Paused => self.pause_started.unwrap_or(now),
        };
        let elapsed = reference
            .saturating_duration_since(origin)
            .saturating_sub(self.paused_total);
        match total {
            Some(total) => elapsed.min(total),
            None => elapsed,
        }
    }
}

/// The single lock guarding [`PlaybackState`], plus the condition variable
/// the delivery loop sleeps on.
#[derive(Debug, Default)]
pub struct SharedPlayback {
    state: Mutex<PlaybackState>,
    changed: Condvar,
}

impl SharedPlayback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, PlaybackState> {
        self.state.lock()
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut PlaybackState) -> R) -> R {
        let result = f(&mut self.state.lock());
        self.changed.notify_all();
        result
    }

    pub fn wait(&self, guard: &mut MutexGuard<'_, PlaybackState>) {
        self.changed.wait(guard);
    }

    pub fn wait_for(&self, guard: &mut MutexGuard<'_, PlaybackState>, timeout: Duration) {
        self.changed.wait_for(guard, timeout);
    }
}
