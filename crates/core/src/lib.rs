//! Live face emotion annotation: per-frame face location, stable face
//! slots, staggered background classification and frame overlays.

pub mod annotation;
pub mod classification;
pub mod detection;
pub mod inference;
pub mod pipeline;
pub mod shared;
pub mod tracking;
pub mod video;
