use std::collections::HashMap;

use crate::classification::domain::emotion_result::EmotionResult;
use crate::tracking::domain::face_slot::SlotId;
use crate::tracking::domain::slot_tracker::SlotTracker;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheState {
    /// A request has been dispatched but nothing has come back yet.
    Pending,
    Resolved,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    pub state: CacheState,
    pub result: Option<EmotionResult>,
    pub computed_at_frame: Option<usize>,
    pub for_generation: u32,
}

impl CacheEntry {
    fn pending(generation: u32) -> Self {
        Self {
            state: CacheState::Pending,
            result: None,
            computed_at_frame: None,
            for_generation: generation,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.state == CacheState::Resolved
    }
}

/// Latest classification per face slot.
///
/// Entries are keyed by arena index and tagged with the generation they
/// were written for; reads and writes for any other generation miss.
#[derive(Default)]
pub struct ResultCache {
    entries: HashMap<u32, CacheEntry>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a Pending entry unless one already exists for this
    /// generation. A Resolved entry stays Resolved during a refresh.
    pub fn mark_pending(&mut self, id: SlotId) {
        match self.entries.get(&id.index()) {
            Some(entry) if entry.for_generation == id.generation() => {}
            _ => {
                self.entries
                    .insert(id.index(), CacheEntry::pending(id.generation()));
            }
        }
    }

    /// Applies a result computed from the frame `frame_index`.
    ///
    /// Returns false, leaving the cache untouched, when the slot is no
    /// longer live under the same generation or the result is older than
    /// the one already stored.
    pub fn store(
        &mut self,
        tracker: &SlotTracker,
        id: SlotId,
        result: EmotionResult,
        frame_index: usize,
    ) -> bool {
        if !tracker.is_live(id) {
            log::debug!("Discarding result for slot {id}: no longer live");
            return false;
        }
        if let Some(entry) = self.get(id) {
            if entry.computed_at_frame.is_some_and(|f| frame_index < f) {
                log::debug!("Discarding stale result for slot {id} from frame {frame_index}");
                return false;
            }
        }

        self.entries.insert(
            id.index(),
            CacheEntry {
                state: CacheState::Resolved,
                result: Some(result),
                computed_at_frame: Some(frame_index),
                for_generation: id.generation(),
            },
        );
        true
    }

    pub fn get(&self, id: SlotId) -> Option<&CacheEntry> {
        self.entries
            .get(&id.index())
            .filter(|e| e.for_generation == id.generation())
    }

    pub fn evict(&mut self, id: SlotId) {
        if self.get(id).is_some() {
            self.entries.remove(&id.index());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
