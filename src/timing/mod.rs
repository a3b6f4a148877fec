mod scheduler;
mod sequence;
mod state_machine;
mod tempo;

pub use scheduler::{RunOutcome, SchedulerConfig, run_stream};
pub use sequence::{EventStream, LoaderConfig};
pub use state_machine::{
    ControlAck, IgnoredReason, PlaybackState, PlaybackStatus, SharedPlayback,
};
pub use tempo::{DEFAULT_TEMPO_US_PER_BEAT, TickTimer};

#[cfg(test)]
pub(crate) use sequence::tests as fixtures;
