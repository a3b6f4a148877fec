use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use midly::{Format, MetaMessage, Smf, TrackEventKind};
use serde::{Deserialize, Serialize};

use super::tempo::TickTimer;
use crate::error::LoadError;
use crate::events::{MessageKind, MidiMessage, ScheduledEvent};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub allowed_types: BTreeSet<MessageKind>,
    pub allowed_controllers: BTreeSet<u8>,
    pub include_program_change: bool,
    /// Source channel -> destination channel. Unlisted channels are dropped.
    pub channel_map: BTreeMap<u8, u8>,
    /// Extra delay between messages that share an offset.
    pub chord_spread_us: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            allowed_types: [
                MessageKind::NoteOff,
                MessageKind::NoteOn,
                MessageKind::ControlChange,
            ]
            .into_iter()
            .collect(),
            allowed_controllers: [7, 11, 64].into_iter().collect(),
            include_program_change: false,
            channel_map: [(0, 0), (1, 1), (2, 2)].into_iter().collect(),
            chord_spread_us: 300,
        }
    }
}

impl LoaderConfig {
    pub fn chord_spread(&self) -> Duration {
        Duration::from_micros(self.chord_spread_us)
    }

    /// Distinct destination channels, i.e. everything playback can leave sounding.
    pub fn controlled_channels(&self) -> Vec<u8> {
        let channels: BTreeSet<u8> = self.channel_map.values().map(|c| c & 0x0F).collect();
        channels.into_iter().collect()
    }

    fn accepts(&self, message: &MidiMessage) -> bool {
        match message {
            MidiMessage::ProgramChange { .. } => self.include_program_change,
            MidiMessage::ControlChange { controller, .. } => {
                self.allowed_types.contains(&MessageKind::ControlChange)
                    && self.allowed_controllers.contains(controller)
            }
            other => self.allowed_types.contains(&other.kind()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventStream {
    events: Vec<ScheduledEvent>,
    total: Option<Duration>,
}

impl EventStream {
    pub fn load_file(path: &Path, config: &LoaderConfig) -> Result<Self, LoadError> {
        let bytes = std::fs::read(path).map_err(|source| LoadError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_bytes(&bytes, config)
    }

    pub fn from_bytes(bytes: &[u8], config: &LoaderConfig) -> Result<Self, LoadError> {
        let smf = Smf::parse(bytes)?;
        Ok(Self::from_smf(&smf, config))
    }

    pub fn from_smf(smf: &Smf, config: &LoaderConfig) -> Self {
        let merged = merge_tracks(smf);
        let mut timer = TickTimer::new(smf.header.timing);
        let mut kept = Vec::new();
        let mut last_time = Duration::ZERO;

        for event in &merged {
            let offset = timer.time_at(event.tick);
            last_time = offset;
            match event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => {
                    timer.set_tempo(event.tick, tempo.as_int());
                }
                TrackEventKind::Midi { channel, message } => {
                    let message = convert(message);
                    if !config.accepts(&message) {
                        continue;
                    }
                    let Some(&destination) = config.channel_map.get(&channel.as_int()) else {
                        continue;
                    };
                    kept.push(ScheduledEvent {
                        offset,
                        payload: message.normalized().encode(destination),
                    });
                }
                _ => {}
            }
        }

        let total = match smf.header.format {
            Format::Sequential => None,
            _ if smf.tracks.is_empty() => None,
            _ => Some(last_time),
        };

        Self {
            events: spread_chords(kept, config.chord_spread()),
            total,
        }
    }

    pub fn from_events(events: Vec<ScheduledEvent>, total: Option<Duration>) -> Self {
        let mut events = events;
        events.sort_by_key(|e| e.offset);
        Self { events, total }
    }

    pub fn events(&self) -> &[ScheduledEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn total(&self) -> Option<Duration> {
        self.total
    }
}

struct MergedEvent<'a> {
    tick: u64,
    kind: TrackEventKind<'a>,
}

/// Flattens all tracks onto one absolute-tick timeline.
///
/// Parallel tracks are interleaved (ties keep track order); sequential tracks
/// are laid end to end.
fn merge_tracks<'a>(smf: &Smf<'a>) -> Vec<MergedEvent<'a>> {
    let mut merged = Vec::new();
    let mut track_start = 0u64;
    for track in &smf.tracks {
        let mut tick = track_start;
        for event in track {
            tick += u64::from(event.delta.as_int());
            merged.push(MergedEvent {
                tick,
                kind: event.kind,
            });
        }
        if smf.header.format == Format::Sequential {
            track_start = tick;
        }
    }
    merged.sort_by_key(|e| e.tick);
    merged
}

fn convert(message: midly::MidiMessage) -> MidiMessage {
    use midly::MidiMessage as Source;
    match message {
        Source::NoteOff { key, vel } => MidiMessage::NoteOff {
            key: key.as_int(),
            velocity: vel.as_int(),
        },
        Source::NoteOn { key, vel } => MidiMessage::NoteOn {
            key: key.as_int(),
            velocity: vel.as_int(),
        },
        Source::Aftertouch { key, vel } => MidiMessage::PolyAftertouch {
            key: key.as_int(),
            pressure: vel.as_int(),
        },
        Source::Controller { controller, value } => MidiMessage::ControlChange {
            controller: controller.as_int(),
            value: value.as_int(),
        },
        Source::ProgramChange { program } => MidiMessage::ProgramChange {
            program: program.as_int(),
        },
        Source::ChannelAftertouch { vel } => MidiMessage::ChannelAftertouch {
            pressure: vel.as_int(),
        },
        Source::PitchBend { bend } => MidiMessage::PitchBend {
            value: bend.0.as_int(),
        },
    }
}

fn spread_chords(events: Vec<ScheduledEvent>, spread: Duration) -> Vec<ScheduledEvent> {
    let mut spread_out = Vec::with_capacity(events.len());
    let mut bucket_offset = None;
    let mut index_in_bucket = 0u32;

    for mut event in events {
        if bucket_offset == Some(event.offset) {
            index_in_bucket += 1;
        } else {
            bucket_offset = Some(event.offset);
            index_in_bucket = 0;
        }
        event.offset += spread * index_in_bucket;
        spread_out.push(event);
    }

    spread_out.sort_by_key(|e| e.offset);

    // A spread chord can run into the next bucket.
    if !spread.is_zero() {
        for i in 1..spread_out.len() {
            let floor = spread_out[i - 1].offset;
            if spread_out[i].offset <= floor {
                spread_out[i].offset = floor + spread;
            }
        }
    }
    spread_out
}
