use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageKind {
    NoteOff,
    NoteOn,
    PolyAftertouch,
    ControlChange,
    ProgramChange,
    ChannelAftertouch,
    PitchBend,
}

impl MessageKind {
    pub fn status_nibble(self) -> u8 {
        match self {
            MessageKind::NoteOff => 0x80,
            MessageKind::NoteOn => 0x90,
            MessageKind::PolyAftertouch => 0xA0,
            MessageKind::ControlChange => 0xB0,
            MessageKind::ProgramChange => 0xC0,
            MessageKind::ChannelAftertouch => 0xD0,
            MessageKind::PitchBend => 0xE0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOff { key: u8, velocity: u8 },
    NoteOn { key: u8, velocity: u8 },
    PolyAftertouch { key: u8, pressure: u8 },
    ControlChange { controller: u8, value: u8 },
    ProgramChange { program: u8 },
    ChannelAftertouch { pressure: u8 },
    /// Raw 14-bit value, 8192 is center.
    PitchBend { value: u16 },
}

pub const ALL_NOTES_OFF: u8 = 123;

impl MidiMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            MidiMessage::NoteOff { .. } => MessageKind::NoteOff,
            MidiMessage::NoteOn { .. } => MessageKind::NoteOn,
            MidiMessage::PolyAftertouch { .. } => MessageKind::PolyAftertouch,
            MidiMessage::ControlChange { .. } => MessageKind::ControlChange,
            MidiMessage::ProgramChange { .. } => MessageKind::ProgramChange,
            MidiMessage::ChannelAftertouch { .. } => MessageKind::ChannelAftertouch,
            MidiMessage::PitchBend { .. } => MessageKind::PitchBend,
        }
    }

    /// A note-on with velocity 0 is a note-off in disguise; make it explicit.
    pub fn normalized(self) -> Self {
        match self {
            MidiMessage::NoteOn { key, velocity: 0 } => MidiMessage::NoteOff { key, velocity: 64 },
            other => other,
        }
    }

    /// Canonical wire form without running status.
    pub fn encode(&self, channel: u8) -> Payload {
        let status = self.kind().status_nibble() | (channel & 0x0F);
        match *self {
            MidiMessage::NoteOff { key, velocity } | MidiMessage::NoteOn { key, velocity } => {
                Payload::three(status, key, velocity)
            }
            MidiMessage::PolyAftertouch { key, pressure } => Payload::three(status, key, pressure),
            MidiMessage::ControlChange { controller, value } => {
                Payload::three(status, controller, value)
            }
            MidiMessage::ProgramChange { program } => Payload::two(status, program),
            MidiMessage::ChannelAftertouch { pressure } => Payload::two(status, pressure),
            MidiMessage::PitchBend { value } => {
                Payload::three(status, (value & 0x7F) as u8, ((value >> 7) & 0x7F) as u8)
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Payload {
    bytes: [u8; 3],
    len: u8,
}

impl Payload {
    fn two(status: u8, data: u8) -> Self {
        Self {
            bytes: [status, data & 0x7F, 0],
            len: 2,
        }
    }

    fn three(status: u8, data1: u8, data2: u8) -> Self {
        Self {
            bytes: [status, data1 & 0x7F, data2 & 0x7F],
            len: 3,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02X?}", self.as_bytes())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledEvent {
    pub offset: Duration,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackSignal {
    Started { file_id: String },
    Paused,
    Resumed,
    Stopped,
    Finished,
    Error { message: String },
}
