mod midi_port;
mod pacer;
mod recording;
mod safety;
mod serial;

pub use midi_port::{MidiPortTransport, list_output_ports};
pub use pacer::{Pacer, PacerConfig};
pub use recording::{Recording, RecordingTransport, WriteRecord};
pub use safety::broadcast_all_off;
pub use serial::{SerialConfig, SerialTransport};

use crate::error::TransportError;

/// A byte sink with a small receive buffer, such as a UART or a MIDI port.
///
/// `write` may accept fewer bytes than offered, or fail with
/// [`TransportError::Busy`] when the device cannot take any right now.
pub trait Transport: Send {
    fn open(&mut self) -> Result<(), TransportError>;

    fn write(&mut self, bytes: &[u8]) -> Result<usize, TransportError>;

    fn close(&mut self);

    fn describe(&self) -> String;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self) -> Result<(), TransportError> {
        (**self).open()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        (**self).write(bytes)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
