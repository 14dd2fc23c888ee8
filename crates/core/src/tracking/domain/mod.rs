pub mod face_slot;
pub mod slot_tracker;
