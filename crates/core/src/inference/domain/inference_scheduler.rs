/// Decides, per slot and frame, when a face is due for classification.
///
/// A slot that has never been dispatched is due immediately. After that it
/// is due once per `interval` frames, on a phase derived from its creation
/// sequence so that faces appearing together do not all refresh on the
/// same frame. A slot with a request in flight is never due.
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::tracking::domain::face_slot::{FaceSlot, SlotId};

pub const DEFAULT_INTERVAL: usize = 15;
pub const DEFAULT_INFERENCE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Debug, PartialEq)]
pub struct SchedulerConfig {
    pub interval: usize,
    pub stagger: bool,
    pub inference_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            stagger: true,
            inference_timeout: DEFAULT_INFERENCE_TIMEOUT,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct InFlight {
    frame_index: usize,
    since: Instant,
}

#[derive(Clone, Debug, Default)]
struct ScheduleState {
    last_dispatch: Option<usize>,
    in_flight: Option<InFlight>,
}

pub struct InferenceScheduler {
    states: HashMap<SlotId, ScheduleState>,
    config: SchedulerConfig,
}

impl InferenceScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            states: HashMap::new(),
            config: SchedulerConfig {
                interval: config.interval.max(1),
                ..config
            },
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Slots that should be dispatched this frame, in the order given.
    pub fn tick(&self, slots: &[FaceSlot], frame_index: usize) -> Vec<SlotId> {
        slots
            .iter()
            .filter(|slot| self.is_due(slot, frame_index))
            .map(|slot| slot.id)
            .collect()
    }

    /// Records a request the pool accepted.
    pub fn record_dispatch(&mut self, id: SlotId, frame_index: usize, now: Instant) {
        let state = self.states.entry(id).or_default();
        state.last_dispatch = Some(frame_index);
        state.in_flight = Some(InFlight {
            frame_index,
            since: now,
        });
    }

    /// Clears the in-flight marker if it belongs to the request dispatched
    /// at `frame_index`. A response to an abandoned request is a no-op.
    pub fn complete(&mut self, id: SlotId, frame_index: usize) {
        if let Some(state) = self.states.get_mut(&id) {
            if state
                .in_flight
                .is_some_and(|f| f.frame_index == frame_index)
            {
                state.in_flight = None;
            }
        }
    }

    /// Drops in-flight markers older than the inference timeout and
    /// returns the affected slots.
    pub fn abandon_overdue(&mut self, now: Instant) -> Vec<SlotId> {
        let timeout = self.config.inference_timeout;
        let mut abandoned = Vec::new();
        for (id, state) in &mut self.states {
            if let Some(f) = state.in_flight {
                if now.saturating_duration_since(f.since) > timeout {
                    state.in_flight = None;
                    abandoned.push(*id);
                }
            }
        }
        abandoned
    }

    pub fn forget(&mut self, id: SlotId) {
        self.states.remove(&id);
    }

    pub fn in_flight(&self, id: SlotId) -> bool {
        self.states
            .get(&id)
            .is_some_and(|s| s.in_flight.is_some())
    }

    pub fn last_dispatch(&self, id: SlotId) -> Option<usize> {
        self.states.get(&id).and_then(|s| s.last_dispatch)
    }

    fn is_due(&self, slot: &FaceSlot, frame_index: usize) -> bool {
        let Some(state) = self.states.get(&slot.id) else {
            return true;
        };
        if state.in_flight.is_some() {
            return false;
        }
        let Some(last) = state.last_dispatch else {
            return true;
        };

        let interval = self.config.interval;
        let phase = if self.config.stagger {
            (slot.sequence % interval as u64) as usize
        } else {
            0
        };
        frame_index % interval == phase && frame_index.saturating_sub(last) >= interval
    }
}
