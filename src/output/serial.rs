use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;
use std::time::Duration;

use super::Transport;
use crate::error::TransportError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub device: PathBuf,
    pub baud_rate: u32,
    /// A write that cannot finish within this window reports busy.
    pub write_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/serial0"),
            baud_rate: 31_250,
            write_timeout_ms: 10,
        }
    }
}

impl SerialConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms.max(1))
    }
}

/// A UART opened at the configured baud rate, 8N1, no flow control.
pub struct SerialTransport {
    config: SerialConfig,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    pub fn new(config: SerialConfig) -> Self {
        Self { config, port: None }
    }
}

impl Transport for SerialTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        let device = self.config.device.to_string_lossy();
        let port = serialport::new(device.as_ref(), self.config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(self.config.write_timeout())
            .open()
            .map_err(|e| TransportError::Open(format!("{device}: {e}")))?;
        tracing::info!(device = %device, baud = self.config.baud_rate, "serial port open");
        self.port = Some(port);
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::NotOpen)?;
        port.write(bytes).map_err(write_error)
    }

    fn close(&mut self) {
        if let Some(mut port) = self.port.take() {
            if let Err(e) = port.flush() {
                tracing::warn!(device = %self.config.device.display(), "flush on close failed: {e}");
            }
        }
    }

    fn describe(&self) -> String {
        format!("{}@{}", self.config.device.display(), self.config.baud_rate)
    }
}

fn write_error(e: io::Error) -> TransportError {
    match e.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted => TransportError::Busy,
        ErrorKind::BrokenPipe | ErrorKind::NotConnected | ErrorKind::NotFound => {
            TransportError::Disconnected(e.to_string())
        }
        _ => TransportError::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(device: &str) -> SerialConfig {
        SerialConfig {
            device: PathBuf::from(device),
            ..SerialConfig::default()
        }
    }

    #[test]
    fn defaults_match_midi_line_settings() {
        let config = SerialConfig::default();
        assert_eq!(config.device, PathBuf::from("/dev/serial0"));
        assert_eq!(config.baud_rate, 31_250);
        assert_eq!(config.write_timeout(), Duration::from_millis(10));
    }

    #[test]
    fn timed_out_writes_are_busy() {
        assert!(write_error(io::Error::from(ErrorKind::TimedOut)).is_retryable());
        assert!(write_error(io::Error::from(ErrorKind::WouldBlock)).is_retryable());
        assert!(matches!(
            write_error(io::Error::from(ErrorKind::BrokenPipe)),
            TransportError::Disconnected(_)
        ));
        assert!(matches!(
            write_error(io::Error::from(ErrorKind::PermissionDenied)),
            TransportError::Io(_)
        ));
    }

    #[test]
    fn missing_device_fails_to_open() {
        let mut transport = SerialTransport::new(config("/nonexistent/serial-device"));
        assert!(matches!(transport.open(), Err(TransportError::Open(_))));
    }

    #[test]
    fn write_before_open_is_rejected() {
        let mut transport = SerialTransport::new(config("/dev/null"));
        assert!(matches!(transport.write(&[0xF8]), Err(TransportError::NotOpen)));
        assert_eq!(transport.describe(), "/dev/null@31250");
    }
}
