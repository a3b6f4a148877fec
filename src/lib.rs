//! Real-time playback of recorded MIDI performances over slow serial links.
//!
//! A [`Session`] loads a standard MIDI file into a flat, wire-ready
//! [`EventStream`](timing::EventStream), then a dedicated worker delivers each
//! message at its scheduled offset through a rate-limiting
//! [`Pacer`](output::Pacer). Pause, resume, stop and position queries may be
//! issued from any thread. Every start and every way of stopping is
//! bracketed by an all-notes-off broadcast so nothing is left sounding.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod output;
pub mod timing;

pub use config::PlayerConfig;
pub use engine::{LoadSummary, Session, StatusSnapshot};
pub use error::{Error, Result};
pub use events::{MessageKind, MidiMessage, PlaybackSignal, ScheduledEvent};
pub use output::Transport;
pub use timing::{ControlAck, EventStream, IgnoredReason};
