/// Nearest-centroid face slot tracker.
///
/// Locator output carries no identity, so every frame the boxes are matched
/// against the live slots by centroid distance. Matching is greedy over all
/// qualifying (slot, box) pairs in ascending distance. Boxes left over open
/// new slots; slots left over accrue misses and are evicted once they have
/// been missing for more than `max_missed_frames` consecutive frames.
use std::collections::HashSet;

use crate::shared::rect::Rect;
use crate::tracking::domain::face_slot::{FaceSlot, SlotId};

pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.5;
pub const DEFAULT_MAX_MISSED_FRAMES: usize = 10;

#[derive(Clone, Debug, PartialEq)]
pub struct TrackerConfig {
    /// Maximum centroid distance for a match, as a fraction of the mean
    /// diagonal of the slot box and the candidate box.
    pub match_threshold: f64,
    pub max_missed_frames: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            max_missed_frames: DEFAULT_MAX_MISSED_FRAMES,
        }
    }
}

/// Outcome of one tracker step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SlotUpdate {
    /// Slots matched or created this frame, in creation order.
    pub slots: Vec<FaceSlot>,
    /// Handles that stopped being live this frame.
    pub evicted: Vec<SlotId>,
}

#[derive(Clone, Debug)]
struct SlotState {
    slot: FaceSlot,
    misses: usize,
}

#[derive(Clone, Debug, Default)]
struct ArenaCell {
    generation: u32,
    state: Option<SlotState>,
}

pub struct SlotTracker {
    cells: Vec<ArenaCell>,
    next_sequence: u64,
    config: TrackerConfig,
}

impl SlotTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            cells: Vec::new(),
            next_sequence: 0,
            config,
        }
    }

    pub fn update(&mut self, boxes: &[Rect], frame_index: usize) -> SlotUpdate {
        let matches = self.match_boxes(boxes);

        let mut matched_cells = HashSet::new();
        let mut matched_boxes = HashSet::new();
        for (cell, bi) in matches {
            self.apply_match(cell, boxes[bi], frame_index);
            matched_cells.insert(cell);
            matched_boxes.insert(bi);
        }

        let evicted = self.age_unmatched(&matched_cells);

        for (bi, bbox) in boxes.iter().enumerate() {
            if !matched_boxes.contains(&bi) {
                let cell = self.spawn(*bbox, frame_index);
                matched_cells.insert(cell);
            }
        }

        let mut slots: Vec<FaceSlot> = matched_cells
            .iter()
            .filter_map(|&cell| self.cells[cell].state.as_ref())
            .map(|s| s.slot.clone())
            .collect();
        slots.sort_by_key(|s| s.sequence);

        SlotUpdate { slots, evicted }
    }

    pub fn is_live(&self, id: SlotId) -> bool {
        self.current_generation(id.index()) == Some(id.generation())
    }

    /// Generation of the slot currently occupying `index`, if any.
    pub fn current_generation(&self, index: u32) -> Option<u32> {
        let cell = self.cells.get(index as usize)?;
        cell.state.as_ref().map(|_| cell.generation)
    }

    pub fn live_count(&self) -> usize {
        self.cells.iter().filter(|c| c.state.is_some()).count()
    }

    pub fn get(&self, id: SlotId) -> Option<&FaceSlot> {
        if !self.is_live(id) {
            return None;
        }
        self.cells[id.index() as usize]
            .state
            .as_ref()
            .map(|s| &s.slot)
    }

    /// Candidate pairs sorted by (distance, box index, slot sequence),
    /// accepted greedily.
    fn match_boxes(&self, boxes: &[Rect]) -> Vec<(usize, usize)> {
        let mut pairs: Vec<(f64, usize, u64, usize)> = Vec::new();
        for (ci, cell) in self.cells.iter().enumerate() {
            let Some(state) = &cell.state else { continue };
            let slot_box = state.slot.bbox;
            for (bi, bbox) in boxes.iter().enumerate() {
                let distance = slot_box.centroid_distance(bbox);
                let limit =
                    self.config.match_threshold * (slot_box.diagonal() + bbox.diagonal()) / 2.0;
                if distance <= limit {
                    pairs.push((distance, bi, state.slot.sequence, ci));
                }
            }
        }
        pairs.sort_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.cmp(&b.2))
        });

        let mut used_cells = HashSet::new();
        let mut used_boxes = HashSet::new();
        let mut matches = Vec::new();
        for (_, bi, _, ci) in pairs {
            if !used_cells.contains(&ci) && !used_boxes.contains(&bi) {
                used_cells.insert(ci);
                used_boxes.insert(bi);
                matches.push((ci, bi));
            }
        }
        matches
    }

    fn apply_match(&mut self, cell: usize, bbox: Rect, frame_index: usize) {
        if let Some(state) = self.cells[cell].state.as_mut() {
            state.slot.bbox = bbox;
            state.slot.last_seen_frame = frame_index;
            state.misses = 0;
        }
    }

    fn age_unmatched(&mut self, matched: &HashSet<usize>) -> Vec<SlotId> {
        let max_missed = self.config.max_missed_frames;
        let mut evicted = Vec::new();
        for (ci, cell) in self.cells.iter_mut().enumerate() {
            if matched.contains(&ci) {
                continue;
            }
            let Some(state) = cell.state.as_mut() else { continue };
            state.misses += 1;
            if state.misses > max_missed {
                log::debug!(
                    "Evicting slot {} after {} missed frames",
                    state.slot.id,
                    state.misses
                );
                evicted.push(state.slot.id);
                cell.state = None;
            }
        }
        evicted
    }

    /// Places a new slot in the lowest free cell, bumping the generation
    /// when the cell has been used before.
    fn spawn(&mut self, bbox: Rect, frame_index: usize) -> usize {
        let (ci, generation) = match self.cells.iter().position(|c| c.state.is_none()) {
            Some(ci) => {
                self.cells[ci].generation += 1;
                (ci, self.cells[ci].generation)
            }
            None => {
                self.cells.push(ArenaCell::default());
                (self.cells.len() - 1, 0)
            }
        };

        let id = SlotId::new(ci as u32, generation);
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        log::debug!("New slot {id} (sequence {sequence}) at frame {frame_index}");

        self.cells[ci].state = Some(SlotState {
            slot: FaceSlot {
                id,
                bbox,
                last_seen_frame: frame_index,
                sequence,
                created_at_frame: frame_index,
            },
            misses: 0,
        });
        ci
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn tracker(max_missed: usize) -> SlotTracker {
        SlotTracker::new(TrackerConfig {
            match_threshold: 0.5,
            max_missed_frames: max_missed,
        })
    }

    fn face(x: i32, y: i32) -> Rect {
        Rect::new(x, y, 100, 100)
    }

    #[test]
    fn test_new_box_creates_slot() {
        let mut t = tracker(5);
        let update = t.update(&[face(0, 0)], 0);
        assert_eq!(update.slots.len(), 1);
        assert_eq!(update.slots[0].id, SlotId::new(0, 0));
        assert_eq!(update.slots[0].sequence, 0);
        assert_eq!(update.slots[0].created_at_frame, 0);
        assert!(update.evicted.is_empty());
        assert_eq!(t.live_count(), 1);
    }

    #[test]
    fn test_slowly_moving_face_keeps_its_slot() {
        let mut t = tracker(5);
        let first = t.update(&[face(0, 0)], 0).slots[0].id;
        for frame in 1..50 {
            let update = t.update(&[face(frame as i32 * 10, 0)], frame);
            assert_eq!(update.slots.len(), 1);
            assert_eq!(update.slots[0].id, first);
            assert_eq!(update.slots[0].last_seen_frame, frame);
        }
    }

    #[test]
    fn test_far_jump_creates_new_slot() {
        let mut t = tracker(5);
        let first = t.update(&[face(0, 0)], 0).slots[0].id;
        let update = t.update(&[face(1000, 1000)], 1);
        assert_eq!(update.slots.len(), 1);
        assert_ne!(update.slots[0].id, first);
        assert!(t.is_live(first));
    }

    #[test]
    fn test_box_order_is_not_identity() {
        let mut t = tracker(5);
        let initial = t.update(&[face(0, 0), face(500, 0)], 0);
        let left = initial.slots[0].id;
        let right = initial.slots[1].id;

        let swapped = t.update(&[face(505, 0), face(5, 0)], 1);
        let by_x: Vec<(i32, SlotId)> = swapped.slots.iter().map(|s| (s.bbox.x, s.id)).collect();
        assert!(by_x.contains(&(5, left)));
        assert!(by_x.contains(&(505, right)));
    }

    #[test]
    fn test_closest_pair_wins_contention() {
        let mut t = tracker(5);
        let a = t.update(&[face(0, 0)], 0).slots[0].id;
        // Two boxes in range of the same slot: the nearer one keeps it.
        let update = t.update(&[face(40, 0), face(10, 0)], 1);
        let kept = update.slots.iter().find(|s| s.id == a).unwrap();
        assert_eq!(kept.bbox.x, 10);
        assert_eq!(update.slots.len(), 2);
    }

    #[test]
    fn test_zero_boxes_ages_all_slots() {
        let mut t = tracker(1);
        t.update(&[face(0, 0), face(500, 0)], 0);
        let update = t.update(&[], 1);
        assert!(update.slots.is_empty());
        assert!(update.evicted.is_empty());
        assert_eq!(t.live_count(), 2);

        let update = t.update(&[], 2);
        assert_eq!(update.evicted.len(), 2);
        assert_eq!(t.live_count(), 0);
    }

    #[test]
    fn test_eviction_after_max_missed() {
        // Last seen at 4, missing 5..=10: the sixth miss evicts.
        let mut t = tracker(5);
        let mut id = None;
        for frame in 0..=4 {
            id = Some(t.update(&[face(0, 0)], frame).slots[0].id);
        }
        let id = id.unwrap();
        for frame in 5..10 {
            assert!(t.update(&[], frame).evicted.is_empty());
            assert!(t.is_live(id));
        }
        assert_eq!(t.update(&[], 10).evicted, vec![id]);
        assert!(!t.is_live(id));
    }

    #[test]
    fn test_match_resets_misses() {
        let mut t = tracker(2);
        let id = t.update(&[face(0, 0)], 0).slots[0].id;
        t.update(&[], 1);
        t.update(&[], 2);
        t.update(&[face(0, 0)], 3);
        t.update(&[], 4);
        t.update(&[], 5);
        assert!(t.is_live(id));
    }

    #[test]
    fn test_reappearance_after_eviction_gets_new_handle() {
        let mut t = tracker(0);
        let old = t.update(&[face(0, 0)], 0).slots[0].id;
        assert_eq!(t.update(&[], 1).evicted, vec![old]);

        let new = t.update(&[face(0, 0)], 2).slots[0].clone();
        assert_ne!(new.id, old);
        assert_eq!(new.id.index(), old.index());
        assert_eq!(new.generation(), old.generation() + 1);
        assert_eq!(new.sequence, 1);
        assert!(!t.is_live(old));
        assert_eq!(t.current_generation(old.index()), Some(1));
    }

    #[test]
    fn test_slots_sorted_by_sequence() {
        let mut t = tracker(5);
        t.update(&[face(500, 0)], 0);
        let update = t.update(&[face(0, 0), face(500, 0)], 1);
        let sequences: Vec<u64> = update.slots.iter().map(|s| s.sequence).collect();
        assert_eq!(sequences, vec![0, 1]);
    }

    #[test]
    fn test_unknown_index_has_no_generation() {
        let t = tracker(5);
        assert_eq!(t.current_generation(7), None);
        assert!(!t.is_live(SlotId::new(0, 0)));
    }

    #[rstest]
    #[case(49, true)]
    #[case(70, true)]
    #[case(71, false)]
    fn test_match_threshold_scales_with_diagonal(#[case] dx: i32, #[case] matched: bool) {
        // Diagonal of a 100x100 box is ~141.4, half of that is ~70.7.
        let mut t = tracker(5);
        let id = t.update(&[face(0, 0)], 0).slots[0].id;
        let update = t.update(&[face(dx, 0)], 1);
        assert_eq!(update.slots[0].id == id, matched);
    }
}
