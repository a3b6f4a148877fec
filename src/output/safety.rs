use super::{Pacer, Transport};
use crate::error::PacerError;
use crate::events::{ALL_NOTES_OFF, MidiMessage};

/// Silences every controlled channel: "all notes off", then an explicit
/// note-off for each of the 128 keys.
///
/// Goes through the pacer like any other traffic. Stops at the first failure.
pub fn broadcast_all_off<T: Transport + ?Sized>(
    pacer: &mut Pacer,
    transport: &mut T,
    channels: &[u8],
) -> Result<(), PacerError> {
    for &channel in channels {
        let all_off = MidiMessage::ControlChange {
            controller: ALL_NOTES_OFF,
            value: 0,
        };
        pacer.send(transport, all_off.encode(channel).as_bytes())?;
        for key in 0..=127u8 {
            let off = MidiMessage::NoteOff { key, velocity: 0 };
            pacer.send(transport, off.encode(channel).as_bytes())?;
        }
    }
    tracing::debug!(?channels, "all-off broadcast sent");
    Ok(())
}
