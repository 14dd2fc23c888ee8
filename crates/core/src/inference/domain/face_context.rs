/// Per-stream face state: slot tracking, dispatch scheduling and cached
/// results, owned together and mutated only from the frame loop.
use std::time::Instant;

use crate::inference::domain::classification_job::ClassificationResponse;
use crate::inference::domain::inference_scheduler::{InferenceScheduler, SchedulerConfig};
use crate::inference::domain::result_cache::ResultCache;
use crate::shared::rect::Rect;
use crate::tracking::domain::face_slot::{FaceSlot, SlotId};
use crate::tracking::domain::slot_tracker::{SlotTracker, TrackerConfig};

pub struct FaceContext {
    tracker: SlotTracker,
    scheduler: InferenceScheduler,
    cache: ResultCache,
}

impl FaceContext {
    pub fn new(tracker: TrackerConfig, scheduler: SchedulerConfig) -> Self {
        Self {
            tracker: SlotTracker::new(tracker),
            scheduler: InferenceScheduler::new(scheduler),
            cache: ResultCache::new(),
        }
    }

    /// Feeds this frame's boxes to the tracker and drops all state held for
    /// evicted slots. Returns the slots visible this frame.
    pub fn observe(&mut self, boxes: &[Rect], frame_index: usize) -> Vec<FaceSlot> {
        let update = self.tracker.update(boxes, frame_index);
        for id in &update.evicted {
            self.scheduler.forget(*id);
            self.cache.evict(*id);
        }
        update.slots
    }

    /// Slots to dispatch this frame, after abandoning overdue requests.
    pub fn due(&mut self, slots: &[FaceSlot], frame_index: usize, now: Instant) -> Vec<SlotId> {
        for id in self.scheduler.abandon_overdue(now) {
            log::warn!("Classification for slot {id} timed out; allowing a new request");
        }
        self.scheduler.tick(slots, frame_index)
    }

    /// Records a request the pool accepted.
    pub fn dispatched(&mut self, id: SlotId, frame_index: usize, now: Instant) {
        self.scheduler.record_dispatch(id, frame_index, now);
        self.cache.mark_pending(id);
    }

    /// Applies one worker response. Failed classifications leave the cache
    /// as it was. Returns true when the cache changed.
    pub fn apply_response(&mut self, response: ClassificationResponse) -> bool {
        self.scheduler.complete(response.slot, response.frame_index);
        match response.outcome {
            Ok(result) => self
                .cache
                .store(&self.tracker, response.slot, result, response.frame_index),
            Err(e) => {
                log::debug!(
                    "Classification for slot {} at frame {} failed: {e}",
                    response.slot,
                    response.frame_index
                );
                false
            }
        }
    }

    pub fn tracker(&self) -> &SlotTracker {
        &self.tracker
    }

    pub fn scheduler(&self) -> &InferenceScheduler {
        &self.scheduler
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::classification::domain::classifier::ClassifyError;
    use crate::classification::domain::emotion_result::EmotionResult;
    use crate::inference::domain::result_cache::CacheState;

    fn context(interval: usize, max_missed: usize) -> FaceContext {
        FaceContext::new(
            TrackerConfig {
                match_threshold: 0.5,
                max_missed_frames: max_missed,
            },
            SchedulerConfig {
                interval,
                stagger: true,
                inference_timeout: Duration::from_secs(5),
            },
        )
    }

    fn face() -> Rect {
        Rect::new(100, 100, 80, 80)
    }

    fn ok(slot: SlotId, frame_index: usize, label: &str) -> ClassificationResponse {
        ClassificationResponse {
            slot,
            frame_index,
            outcome: EmotionResult::from_scores([(label, 75.0), ("neutral", 25.0)]),
            elapsed: Duration::ZERO,
        }
    }

    fn failed(slot: SlotId, frame_index: usize) -> ClassificationResponse {
        ClassificationResponse {
            slot,
            frame_index,
            outcome: Err(ClassifyError::Inference("boom".into())),
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn test_single_face_lifecycle() {
        let mut ctx = context(5, 10);
        let now = Instant::now();
        let mut dispatches = Vec::new();
        let mut id = None;

        for frame in 0..11 {
            let slots = ctx.observe(&[face()], frame);
            assert_eq!(slots.len(), 1);
            let slot_id = *id.get_or_insert(slots[0].id);
            assert_eq!(slots[0].id, slot_id);

            for due in ctx.due(&slots, frame, now) {
                ctx.dispatched(due, frame, now);
                dispatches.push(frame);
            }
            if frame == 0 {
                assert_eq!(ctx.cache().get(slot_id).unwrap().state, CacheState::Pending);
            }
            // Result comes back two frames after dispatch.
            if frame >= 2 && dispatches.contains(&(frame - 2)) {
                assert!(ctx.apply_response(ok(slot_id, frame - 2, "happy")));
            }
            if frame == 1 {
                assert_eq!(ctx.cache().get(slot_id).unwrap().state, CacheState::Pending);
            }
        }

        assert_eq!(dispatches, vec![0, 5, 10]);
        let entry = ctx.cache().get(id.unwrap()).unwrap();
        assert_eq!(entry.state, CacheState::Resolved);
        assert_eq!(entry.computed_at_frame, Some(5));
    }

    #[test]
    fn test_failures_keep_last_result() {
        let mut ctx = context(1, 10);
        let now = Instant::now();
        let slots = ctx.observe(&[face()], 0);
        let id = slots[0].id;
        ctx.dispatched(id, 0, now);
        assert!(ctx.apply_response(ok(id, 0, "surprise")));

        for frame in 1..4 {
            let slots = ctx.observe(&[face()], frame);
            assert_eq!(ctx.due(&slots, frame, now), vec![id]);
            ctx.dispatched(id, frame, now);
            assert!(!ctx.apply_response(failed(id, frame)));
        }

        let entry = ctx.cache().get(id).unwrap();
        assert_eq!(entry.state, CacheState::Resolved);
        assert_eq!(
            entry.result.as_ref().unwrap().dominant_label(),
            "surprise"
        );
        assert!(!ctx.scheduler().in_flight(id));
    }

    #[test]
    fn test_late_result_after_eviction_is_discarded() {
        let mut ctx = context(5, 5);
        let now = Instant::now();
        let mut id = None;
        for frame in 0..=4 {
            let slots = ctx.observe(&[face()], frame);
            id = Some(slots[0].id);
            for due in ctx.due(&slots, frame, now) {
                ctx.dispatched(due, frame, now);
            }
        }
        let id = id.unwrap();
        for frame in 5..=10 {
            ctx.observe(&[], frame);
        }
        assert!(!ctx.tracker().is_live(id));
        assert!(ctx.cache().get(id).is_none());

        assert!(!ctx.apply_response(ok(id, 0, "happy")));
        assert!(ctx.cache().is_empty());
    }

    #[test]
    fn test_timed_out_request_can_be_redispatched() {
        let mut ctx = FaceContext::new(
            TrackerConfig::default(),
            SchedulerConfig {
                interval: 1,
                stagger: false,
                inference_timeout: Duration::from_millis(100),
            },
        );
        let start = Instant::now();
        let slots = ctx.observe(&[face()], 0);
        let id = slots[0].id;
        ctx.dispatched(id, 0, start);

        let slots = ctx.observe(&[face()], 1);
        assert!(ctx.due(&slots, 1, start).is_empty());

        let later = start + Duration::from_millis(200);
        let slots = ctx.observe(&[face()], 2);
        assert_eq!(ctx.due(&slots, 2, later), vec![id]);
        ctx.dispatched(id, 2, later);

        // The abandoned request still lands but the newer one wins.
        assert!(ctx.apply_response(ok(id, 2, "sad")));
        assert!(!ctx.apply_response(ok(id, 0, "happy")));
        let entry = ctx.cache().get(id).unwrap();
        assert_eq!(entry.result.as_ref().unwrap().dominant_label(), "sad");
    }
}
