//! Occupancy sampling: periodic or per-change snapshots of how many
//! algorithms each slot holds in every state.

use crate::slot::EventSlot;
use crate::state::{AlgState, STATE_COUNT};
use serde::Serialize;
use std::time::{Duration, Instant, SystemTime};
use tokio_util::sync::CancellationToken;

/// Per-slot state counts at one instant.
#[derive(Debug, Clone, Serialize)]
pub struct SlotOccupancy {
    pub slot: usize,
    /// Counts indexed by state value (INITIAL .. ERROR), sub-slots included.
    pub counts: [usize; STATE_COUNT],
}

/// One occupancy sample across all active slots.
#[derive(Debug, Clone, Serialize)]
pub struct OccupancySnapshot {
    #[serde(with = "system_time_millis")]
    pub time: SystemTime,
    pub slots: Vec<SlotOccupancy>,
}

mod system_time_millis {
    use serde::Serializer;
    use std::time::{SystemTime, UNIX_EPOCH};

    pub fn serialize<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = time
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        serializer.serialize_u64(millis)
    }
}

impl OccupancySnapshot {
    /// Snapshot the given slots now.
    pub fn capture(slots: &[EventSlot]) -> Self {
        let mut per_slot = Vec::new();
        for (index, slot) in slots.iter().enumerate() {
            if slot.context.is_none() {
                continue;
            }
            let mut counts = [0usize; STATE_COUNT];
            for (i, state) in AlgState::ALL.iter().enumerate() {
                counts[i] = slot.states.count_in(*state);
                for sub in &slot.sub_slots {
                    counts[i] += sub.states.count_in(*state);
                }
            }
            per_slot.push(SlotOccupancy { slot: index, counts });
        }
        Self {
            time: SystemTime::now(),
            slots: per_slot,
        }
    }
}

pub type OccupancyCallback = Box<dyn Fn(OccupancySnapshot) + Send + 'static>;

/// Active occupancy recording session.
pub struct OccupancyRecorder {
    interval: Duration,
    last_sample: Instant,
    callback: OccupancyCallback,
    /// Cancels the wall-clock ticker feeding periodic samples.
    pub(crate) ticker: CancellationToken,
}

impl OccupancyRecorder {
    pub fn new(interval: Duration, callback: OccupancyCallback, ticker: CancellationToken) -> Self {
        Self {
            interval,
            last_sample: Instant::now(),
            callback,
            ticker,
        }
    }

    /// Samples on every state change when true; otherwise only the ticker
    /// (or a forced sample) fires the callback.
    pub fn samples_every_change(&self) -> bool {
        self.interval.is_zero()
    }

    /// Deliver a sample if due. `forced` bypasses the interval check (used
    /// by the wall-clock ticker).
    pub fn sample(&mut self, snapshot: OccupancySnapshot, forced: bool) {
        if !forced && !self.samples_every_change() && self.last_sample.elapsed() < self.interval {
            return;
        }
        self.last_sample = Instant::now();
        (self.callback)(snapshot);
    }
}

impl Drop for OccupancyRecorder {
    fn drop(&mut self) {
        self.ticker.cancel();
    }
}
