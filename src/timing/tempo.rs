use midly::Timing;
use std::time::Duration;

pub const DEFAULT_TEMPO_US_PER_BEAT: u32 = 500_000;

/// Converts absolute ticks into elapsed time, honoring tempo changes.
///
/// Ticks must be fed in non-decreasing order. Each tempo change starts a new
/// segment anchored at the time already reached, so rounding never
/// accumulates across deltas.
#[derive(Debug, Clone)]
pub struct TickTimer {
    timing: Timing,
    tempo_us: u32,
    segment_tick: u64,
    segment_nanos: u128,
}

impl TickTimer {
    pub fn new(timing: Timing) -> Self {
        Self {
            timing,
            tempo_us: DEFAULT_TEMPO_US_PER_BEAT,
            segment_tick: 0,
            segment_nanos: 0,
        }
    }

    pub fn time_at(&self, tick: u64) -> Duration {
        let nanos = match self.timing {
            Timing::Metrical(ticks_per_beat) => {
                let ppq = u128::from(ticks_per_beat.as_int().max(1));
                let delta = u128::from(tick.saturating_sub(self.segment_tick));
                self.segment_nanos + delta * u128::from(self.tempo_us) * 1_000 / ppq
            }
            // SMPTE ticks have a fixed length; tempo markers do not apply.
            Timing::Timecode(fps, subframes) => {
                let per_second = f64::from(fps.as_f32()) * f64::from(subframes.max(1));
                (tick as f64 * 1e9 / per_second) as u128
            }
        };
        Duration::from_nanos(nanos.min(u128::from(u64::MAX)) as u64)
    }

    pub fn set_tempo(&mut self, tick: u64, us_per_beat: u32) {
        if matches!(self.timing, Timing::Timecode(..)) {
            return;
        }
        let reached = self.time_at(tick);
        self.segment_nanos = reached.as_nanos();
        self.segment_tick = tick;
        self.tempo_us = us_per_beat;
    }
}
