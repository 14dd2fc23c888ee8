use std::fmt;

use crate::shared::rect::Rect;

/// Handle to a tracked face.
///
/// The arena index may be recycled after eviction, but the generation is
/// bumped each time, so two handles compare equal only if they name the
/// same physical face.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotId {
    index: u32,
    generation: u32,
}

impl SlotId {
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}g{}", self.index, self.generation)
    }
}

/// Read-only snapshot of a tracked face, as handed out by the tracker.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceSlot {
    pub id: SlotId,
    pub bbox: Rect,
    pub last_seen_frame: usize,
    /// Creation order across the tracker's lifetime; drives staggering.
    pub sequence: u64,
    pub created_at_frame: usize,
}

impl FaceSlot {
    pub fn generation(&self) -> u32 {
        self.id.generation
    }
}
