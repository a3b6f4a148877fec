use serde::{Deserialize, Serialize};
use std::thread;
use std::time::{Duration, Instant};

use super::Transport;
use crate::error::{PacerError, TransportError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacerConfig {
    pub min_gap_us: u64,
    pub max_per_ms: u32,
    pub retry_backoff_us: u64,
    /// Busy reports tolerated for a single payload before giving up.
    pub max_retries: u32,
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            // 3 bytes at 31250 baud take 960 us; a third of that per byte.
            min_gap_us: 320,
            max_per_ms: 3,
            retry_backoff_us: 1_000,
            max_retries: 2_000,
        }
    }
}

/// Rate limiter sitting between the scheduler and the transport.
///
/// Sends are strictly sequential: a payload is fully written (or the send has
/// failed) before `send` returns, so nothing is ever reordered.
pub struct Pacer {
    config: PacerConfig,
    epoch: Instant,
    last_send: Option<Instant>,
    bucket: u128,
    sent_in_bucket: u32,
}

impl Pacer {
    pub fn new(config: PacerConfig) -> Self {
        Self {
            config,
            epoch: Instant::now(),
            last_send: None,
            bucket: 0,
            sent_in_bucket: 0,
        }
    }

    pub fn send<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        payload: &[u8],
    ) -> Result<(), PacerError> {
        self.wait_for_slot();
        self.write_all(transport, payload)
    }

    fn wait_for_slot(&mut self) {
        let min_gap = Duration::from_micros(self.config.min_gap_us);
        if let Some(last) = self.last_send {
            let earliest = last + min_gap;
            let now = Instant::now();
            if now < earliest {
                tracing::trace!(wait_us = (earliest - now).as_micros() as u64, "pacing gap");
                thread::sleep(earliest - now);
            }
        }

        loop {
            let now = Instant::now();
            let bucket = now.duration_since(self.epoch).as_millis();
            if bucket != self.bucket {
                self.bucket = bucket;
                self.sent_in_bucket = 0;
            }
            if self.sent_in_bucket < self.config.max_per_ms.max(1) {
                self.sent_in_bucket += 1;
                self.last_send = Some(now);
                return;
            }
            let next_boundary = self.epoch + Duration::from_millis((bucket + 1) as u64);
            tracing::trace!("millisecond bucket full");
            thread::sleep(next_boundary.saturating_duration_since(now));
        }
    }

    fn write_all<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        payload: &[u8],
    ) -> Result<(), PacerError> {
        let backoff = Duration::from_micros(self.config.retry_backoff_us);
        let mut written = 0;
        let mut retries = 0;

        while written < payload.len() {
            match transport.write(&payload[written..]) {
                Ok(0) | Err(TransportError::Busy) => {
                    if retries >= self.config.max_retries {
                        return Err(PacerError::Stalled {
                            retries,
                            written,
                            len: payload.len(),
                        });
                    }
                    retries += 1;
                    tracing::debug!(retries, written, "transport busy, backing off");
                    thread::sleep(backoff);
                }
                Ok(n) => written += n,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
