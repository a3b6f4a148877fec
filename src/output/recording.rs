use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

use super::Transport;
use crate::error::TransportError;

#[derive(Debug, Clone)]
pub struct WriteRecord {
    pub at: Instant,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct Log {
    writes: Vec<WriteRecord>,
    write_count: usize,
    byte_count: usize,
    opens: u32,
    closes: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Recording {
    log: Arc<Mutex<Log>>,
}

impl Recording {
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.log.lock().writes.clone()
    }

    pub fn messages(&self) -> Vec<Vec<u8>> {
        self.log.lock().writes.iter().map(|w| w.bytes.clone()).collect()
    }

    pub fn write_times(&self) -> Vec<Instant> {
        self.log.lock().writes.iter().map(|w| w.at).collect()
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.log
            .lock()
            .writes
            .iter()
            .flat_map(|w| w.bytes.iter().copied())
            .collect()
    }

    pub fn write_count(&self) -> usize {
        self.log.lock().write_count
    }

    pub fn byte_count(&self) -> usize {
        self.log.lock().byte_count
    }

    pub fn opens(&self) -> u32 {
        self.log.lock().opens
    }

    pub fn closes(&self) -> u32 {
        self.log.lock().closes
    }
}

/// In-memory transport that timestamps every write.
///
/// Can report busy, accept only part of a payload, fail once or for good
/// after a number of writes, or refuse to open.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    recording: Recording,
    open: bool,
    discard: bool,
    busy_from: usize,
    busy_writes: u32,
    chunk_limit: Option<usize>,
    fail_once_at: Option<usize>,
    disconnect_after: Option<usize>,
    fail_open: bool,
    accepted: usize,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts writes without keeping their bytes, for dry runs of long files.
    pub fn discarding() -> Self {
        Self {
            discard: true,
            ..Self::default()
        }
    }

    pub fn with_busy_writes(self, count: u32) -> Self {
        self.with_busy_writes_after(0, count)
    }

    pub fn with_busy_writes_after(mut self, after: usize, count: u32) -> Self {
        self.busy_from = after;
        self.busy_writes = count;
        self
    }

    pub fn with_chunk_limit(mut self, limit: usize) -> Self {
        self.chunk_limit = Some(limit.max(1));
        self
    }

    pub fn fail_once_after(mut self, writes: usize) -> Self {
        self.fail_once_at = Some(writes);
        self
    }

    pub fn disconnect_after(mut self, writes: usize) -> Self {
        self.disconnect_after = Some(writes);
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn recording(&self) -> Recording {
        self.recording.clone()
    }
}

impl Transport for RecordingTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        if self.fail_open {
            return Err(TransportError::Open("recording transport set to fail".into()));
        }
        self.recording.log.lock().opens += 1;
        self.open = true;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        if self.disconnect_after.is_some_and(|limit| self.accepted >= limit) {
            return Err(TransportError::Disconnected("recording transport unplugged".into()));
        }
        if self.fail_once_at == Some(self.accepted) {
            self.fail_once_at = None;
            return Err(TransportError::Disconnected("recording transport glitch".into()));
        }
        if self.busy_writes > 0 && self.accepted >= self.busy_from {
            self.busy_writes -= 1;
            return Err(TransportError::Busy);
        }
        let len = self.chunk_limit.map_or(bytes.len(), |l| l.min(bytes.len()));
        let mut log = self.recording.log.lock();
        log.write_count += 1;
        log.byte_count += len;
        if !self.discard {
            log.writes.push(WriteRecord {
                at: Instant::now(),
                bytes: bytes[..len].to_vec(),
            });
        }
        self.accepted += 1;
        Ok(len)
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.recording.log.lock().closes += 1;
        }
    }

    fn describe(&self) -> String {
        "recording".to_string()
    }
}
