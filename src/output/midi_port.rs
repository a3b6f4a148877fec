use midir::{MidiOutput, MidiOutputConnection};

use super::Transport;
use crate::error::TransportError;

const CLIENT_NAME: &str = "midicue";

pub fn list_output_ports() -> Result<Vec<String>, TransportError> {
    let midi_out = MidiOutput::new(CLIENT_NAME).map_err(|e| TransportError::Open(e.to_string()))?;
    Ok(midi_out
        .ports()
        .iter()
        .map(|p| midi_out.port_name(p).unwrap_or_default())
        .collect())
}

/// Sends to an OS MIDI output port whose name contains `port_hint`.
/// An empty hint picks the first port.
pub struct MidiPortTransport {
    port_hint: String,
    connection: Option<MidiOutputConnection>,
}

impl MidiPortTransport {
    pub fn new(port_hint: impl Into<String>) -> Self {
        Self {
            port_hint: port_hint.into(),
            connection: None,
        }
    }
}

impl Transport for MidiPortTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        let midi_out =
            MidiOutput::new(CLIENT_NAME).map_err(|e| TransportError::Open(e.to_string()))?;
        let ports = midi_out.ports();
        let port = ports
            .iter()
            .find(|p| {
                midi_out
                    .port_name(p)
                    .unwrap_or_default()
                    .contains(&self.port_hint)
            })
            .ok_or_else(|| {
                TransportError::Open(format!("no MIDI output matching {:?}", self.port_hint))
            })?;
        let name = midi_out.port_name(port).unwrap_or_default();
        let connection = midi_out
            .connect(port, "midicue-output")
            .map_err(|e| TransportError::Open(e.to_string()))?;
        tracing::info!(port = %name, "connected to MIDI output");
        self.connection = Some(connection);
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        let connection = self.connection.as_mut().ok_or(TransportError::NotOpen)?;
        connection
            .send(bytes)
            .map_err(|e| TransportError::Disconnected(e.to_string()))?;
        Ok(bytes.len())
    }

    fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
    }

    fn describe(&self) -> String {
        format!("midi:{}", self.port_hint)
    }
}
