pub mod classification_job;
pub mod face_context;
pub mod inference_scheduler;
pub mod result_cache;
