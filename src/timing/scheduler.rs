use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::{EventStream, PlaybackStatus, SharedPlayback};
use crate::error::PacerError;
use crate::output::{Pacer, Transport};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Longest single sleep while waiting for an event. Bounds stop and
    /// pause latency.
    pub wait_increment_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            wait_increment_ms: 2,
        }
    }
}

impl SchedulerConfig {
    pub fn wait_increment(&self) -> Duration {
        Duration::from_millis(self.wait_increment_ms.max(1))
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    Finished,
    Stopped,
    Failed(PacerError),
}

/// Delivers `stream` in order, each event no earlier than its deadline.
///
/// Returns when the stream is exhausted, a stop is observed, or the pacer
/// reports a fatal error. Does not touch the playback status; the caller
/// owns the transition back to `Stopped`.
pub fn run_stream<T: Transport + ?Sized>(
    stream: &EventStream,
    shared: &SharedPlayback,
    pacer: &mut Pacer,
    transport: &mut T,
    config: &SchedulerConfig,
) -> RunOutcome {
    let increment = config.wait_increment();
    for (index, event) in stream.events().iter().enumerate() {
        if !wait_until_due(shared, event.offset, increment) {
            tracing::debug!(delivered = index, "stop observed");
            return RunOutcome::Stopped;
        }
        if let Err(e) = pacer.send(transport, event.payload.as_bytes()) {
            tracing::error!(offset_us = event.offset.as_micros() as u64, "delivery failed: {e}");
            return RunOutcome::Failed(e);
        }
        tracing::trace!(
            offset_us = event.offset.as_micros() as u64,
            payload = ?event.payload,
            "event sent"
        );
    }
    RunOutcome::Finished
}

fn wait_until_due(shared: &SharedPlayback, offset: Duration, increment: Duration) -> bool {
    let mut state = shared.lock();
    loop {
        if state.stop_requested() {
            return false;
        }
        match state.status() {
            PlaybackStatus::Stopped => return false,
            PlaybackStatus::Paused => shared.wait(&mut state),
            PlaybackStatus::Playing => {
                let Some(deadline) = state.deadline(offset) else {
                    return false;
                };
                let now = Instant::now();
                if now >= deadline {
                    return true;
                }
                shared.wait_for(&mut state, (deadline - now).min(increment));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{MidiMessage, ScheduledEvent};
    use crate::output::{PacerConfig, RecordingTransport};
    use std::sync::Arc;
    use std::thread;

    fn unpaced() -> Pacer {
        Pacer::new(PacerConfig {
            min_gap_us: 0,
            max_per_ms: 1_000,
            retry_backoff_us: 100,
            max_retries: 10,
        })
    }

    fn note(offset_ms: u64, key: u8) -> ScheduledEvent {
        ScheduledEvent {
            offset: Duration::from_millis(offset_ms),
            payload: MidiMessage::NoteOn { key, velocity: 100 }.encode(0),
        }
    }

    #[test]
    fn delivers_in_order_no_earlier_than_due() {
        let stream = EventStream::from_events(vec![note(0, 60), note(30, 62), note(60, 64)], None);
        let shared = SharedPlayback::new();
        let mut transport = RecordingTransport::new();
        let recording = transport.recording();
        transport.open().unwrap();

        let start = Instant::now();
        shared.update(|s| s.start(start)).unwrap();
        let outcome = run_stream(
            &stream,
            &shared,
            &mut unpaced(),
            &mut transport,
            &SchedulerConfig::default(),
        );
        assert!(matches!(outcome, RunOutcome::Finished));

        let writes = recording.writes();
        let keys: Vec<u8> = writes.iter().map(|w| w.bytes[1]).collect();
        assert_eq!(keys, vec![60, 62, 64]);
        for (write, event) in writes.iter().zip(stream.events()) {
            assert!(write.at.duration_since(start) >= event.offset);
        }
    }

    #[test]
    fn pause_delays_remaining_events() {
        let stream = EventStream::from_events(vec![note(0, 60), note(150, 62)], None);
        let shared = Arc::new(SharedPlayback::new());
        let mut transport = RecordingTransport::new();
        let recording = transport.recording();
        transport.open().unwrap();

        let start = Instant::now();
        shared.update(|s| s.start(start)).unwrap();
        let controller = {
            let shared = shared.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));
                shared.update(|s| s.pause(Instant::now())).unwrap();
                thread::sleep(Duration::from_millis(50));
                shared.update(|s| s.resume(Instant::now())).unwrap();
            })
        };
        run_stream(
            &stream,
            &shared,
            &mut unpaced(),
            &mut transport,
            &SchedulerConfig::default(),
        );
        controller.join().unwrap();

        let times = recording.write_times();
        assert_eq!(times.len(), 2);
        assert!(times[1].duration_since(start) >= Duration::from_millis(200));
    }

    #[test]
    fn stop_interrupts_a_long_wait_promptly() {
        let stream = EventStream::from_events(vec![note(0, 60), note(10_000, 62)], None);
        let shared = Arc::new(SharedPlayback::new());
        let mut transport = RecordingTransport::new();
        let recording = transport.recording();
        transport.open().unwrap();

        shared.update(|s| s.start(Instant::now())).unwrap();
        let stopper = {
            let shared = shared.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                shared.update(|s| s.request_stop()).unwrap();
                Instant::now()
            })
        };
        let outcome = run_stream(
            &stream,
            &shared,
            &mut unpaced(),
            &mut transport,
            &SchedulerConfig::default(),
        );
        let returned = Instant::now();
        let requested = stopper.join().unwrap();

        assert!(matches!(outcome, RunOutcome::Stopped));
        assert_eq!(recording.messages().len(), 1);
        assert!(returned.duration_since(requested) < Duration::from_millis(500));
    }

    #[test]
    fn stop_while_paused_wakes_the_loop() {
        let stream = EventStream::from_events(vec![note(50, 60)], None);
        let shared = Arc::new(SharedPlayback::new());
        let mut transport = RecordingTransport::new();
        transport.open().unwrap();

        let now = Instant::now();
        shared.update(|s| s.start(now)).unwrap();
        shared.update(|s| s.pause(now)).unwrap();
        let stopper = {
            let shared = shared.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                shared.update(|s| s.request_stop()).unwrap();
            })
        };
        let outcome = run_stream(
            &stream,
            &shared,
            &mut unpaced(),
            &mut transport,
            &SchedulerConfig::default(),
        );
        stopper.join().unwrap();
        assert!(matches!(outcome, RunOutcome::Stopped));
    }

    #[test]
    fn transport_failure_ends_the_run() {
        let stream = EventStream::from_events(vec![note(0, 60), note(1, 62), note(2, 64)], None);
        let shared = SharedPlayback::new();
        let mut transport = RecordingTransport::new().disconnect_after(1);
        transport.open().unwrap();

        shared.update(|s| s.start(Instant::now())).unwrap();
        let outcome = run_stream(
            &stream,
            &shared,
            &mut unpaced(),
            &mut transport,
            &SchedulerConfig::default(),
        );
        assert!(matches!(outcome, RunOutcome::Failed(PacerError::Transport(_))));
    }
}
