use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use thiserror::Error;

use crate::classification::domain::classifier::Classifier;
use crate::inference::domain::classification_job::{ClassificationRequest, ClassificationResponse};

pub const DEFAULT_WORKERS: usize = 2;
pub const DEFAULT_QUEUE_CAPACITY: usize = 4;
/// How long dropping a pool waits for busy workers.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

const JOIN_POLL: Duration = Duration::from_millis(5);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DispatchError {
    #[error("classification queue is full")]
    QueueFull,
    #[error("classifier pool is shut down")]
    PoolClosed,
}

/// Fixed set of classifier threads behind a bounded request queue.
///
/// Layout: `frame loop --try_send--> [queue] --> workers --> [responses] --drain--> frame loop`
///
/// Submission never blocks: a full queue rejects the request. Responses
/// wait in an unbounded channel until the frame loop drains them.
///
/// Shutdown discards queued requests and waits a bounded time for the
/// requests workers are already running. A worker stuck past the deadline
/// is detached, not joined.
pub struct ClassifierPool {
    request_tx: Option<Sender<ClassificationRequest>>,
    response_rx: Receiver<ClassificationResponse>,
    workers: Vec<JoinHandle<()>>,
    closing: Arc<AtomicBool>,
}

impl ClassifierPool {
    /// Spawns one worker per classifier.
    pub fn new(classifiers: Vec<Box<dyn Classifier>>, queue_capacity: usize) -> Self {
        let (request_tx, request_rx) =
            crossbeam_channel::bounded::<ClassificationRequest>(queue_capacity.max(1));
        let (response_tx, response_rx) = crossbeam_channel::unbounded::<ClassificationResponse>();
        let closing = Arc::new(AtomicBool::new(false));

        let workers = classifiers
            .into_iter()
            .enumerate()
            .map(|(n, classifier)| {
                spawn_worker(
                    n,
                    classifier,
                    request_rx.clone(),
                    response_tx.clone(),
                    closing.clone(),
                )
            })
            .collect::<Vec<_>>();
        log::info!(
            "Started {} classifier worker(s), queue capacity {}",
            workers.len(),
            queue_capacity.max(1)
        );

        Self {
            request_tx: Some(request_tx),
            response_rx,
            workers,
            closing,
        }
    }

    pub fn submit(&self, request: ClassificationRequest) -> Result<(), DispatchError> {
        let tx = self.request_tx.as_ref().ok_or(DispatchError::PoolClosed)?;
        tx.try_send(request).map_err(|e| match e {
            TrySendError::Full(_) => DispatchError::QueueFull,
            TrySendError::Disconnected(_) => DispatchError::PoolClosed,
        })
    }

    /// Every response that has arrived so far, without waiting.
    pub fn drain(&self) -> Vec<ClassificationResponse> {
        self.response_rx.try_iter().collect()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Stops the pool, waiting at most `grace` for running requests.
    /// Returns every response that arrived, including those finished
    /// during the wait.
    pub fn shutdown(mut self, grace: Duration) -> Vec<ClassificationResponse> {
        self.close_and_join(grace);
        self.drain()
    }

    fn close_and_join(&mut self, grace: Duration) {
        self.closing.store(true, Ordering::SeqCst);
        self.request_tx = None;

        let deadline = Instant::now() + grace;
        let mut pending: Vec<JoinHandle<()>> = self.workers.drain(..).collect();
        loop {
            let (finished, running): (Vec<_>, Vec<_>) =
                pending.into_iter().partition(|h| h.is_finished());
            for handle in finished {
                if handle.join().is_err() {
                    log::warn!("Classifier worker panicked");
                }
            }
            pending = running;
            if pending.is_empty() {
                return;
            }
            if Instant::now() >= deadline {
                log::warn!(
                    "Detaching {} classifier worker(s) still busy after {:?}",
                    pending.len(),
                    grace
                );
                return;
            }
            std::thread::sleep(JOIN_POLL);
        }
    }
}

impl Drop for ClassifierPool {
    fn drop(&mut self) {
        self.close_and_join(DEFAULT_SHUTDOWN_GRACE);
    }
}

fn spawn_worker(
    n: usize,
    mut classifier: Box<dyn Classifier>,
    request_rx: Receiver<ClassificationRequest>,
    response_tx: Sender<ClassificationResponse>,
    closing: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for request in request_rx {
            if closing.load(Ordering::SeqCst) {
                log::debug!("Classifier worker {n} dropping queued request for slot {}", request.slot);
                break;
            }
            let started = Instant::now();
            let outcome = classifier.classify(&request.crop);
            let response = ClassificationResponse {
                slot: request.slot,
                frame_index: request.frame_index,
                outcome,
                elapsed: started.elapsed(),
            };
            if response_tx.send(response).is_err() {
                break;
            }
        }
        log::debug!("Classifier worker {n} exiting");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;

    use crate::classification::domain::classifier::ClassifyError;
    use crate::classification::domain::emotion_result::EmotionResult;
    use crate::shared::frame::Frame;
    use crate::tracking::domain::face_slot::SlotId;

    struct FixedClassifier(&'static str);

    impl Classifier for FixedClassifier {
        fn classify(&mut self, _face: &Frame) -> Result<EmotionResult, ClassifyError> {
            EmotionResult::from_scores([(self.0, 100.0)])
        }
    }

    /// Blocks on the barrier before every classification.
    struct GatedClassifier(Arc<Barrier>);

    impl Classifier for GatedClassifier {
        fn classify(&mut self, _face: &Frame) -> Result<EmotionResult, ClassifyError> {
            self.0.wait();
            EmotionResult::from_scores([("happy", 100.0)])
        }
    }

    fn request(index: u32, frame_index: usize) -> ClassificationRequest {
        ClassificationRequest {
            slot: SlotId::new(index, 0),
            crop: Frame::filled(16, 16, [128, 128, 128], frame_index),
            frame_index,
        }
    }

    fn wait_for(pool: &ClassifierPool, count: usize) -> Vec<ClassificationResponse> {
        let mut out = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while out.len() < count && Instant::now() < deadline {
            out.extend(pool.drain());
            std::thread::sleep(Duration::from_millis(5));
        }
        out
    }

    #[test]
    fn test_responses_are_delivered() {
        let pool = ClassifierPool::new(
            vec![Box::new(FixedClassifier("sad")), Box::new(FixedClassifier("sad"))],
            8,
        );
        for i in 0..5 {
            pool.submit(request(i, 3)).unwrap();
        }
        let responses = wait_for(&pool, 5);
        assert_eq!(responses.len(), 5);
        for r in &responses {
            assert_eq!(r.frame_index, 3);
            assert_eq!(r.outcome.as_ref().unwrap().dominant_label(), "sad");
        }
    }

    #[test]
    fn test_full_queue_sheds() {
        let gate = Arc::new(Barrier::new(2));
        let pool = ClassifierPool::new(vec![Box::new(GatedClassifier(gate.clone()))], 1);

        // First request is taken by the worker and blocks on the gate, the
        // second fills the queue.
        pool.submit(request(0, 0)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while pool.submit(request(1, 0)).is_err() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(pool.submit(request(2, 0)), Err(DispatchError::QueueFull));

        gate.wait();
        gate.wait();
        assert_eq!(wait_for(&pool, 2).len(), 2);
    }

    #[test]
    fn test_shutdown_joins_workers_and_returns_tail() {
        let pool = ClassifierPool::new(vec![Box::new(FixedClassifier("fear"))], 4);
        assert_eq!(pool.worker_count(), 1);
        pool.submit(request(0, 1)).unwrap();
        pool.submit(request(1, 1)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while pool.response_rx.len() < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }

        let tail = pool.shutdown(Duration::from_secs(5));
        assert_eq!(tail.len(), 2);
    }

    /// Never returns from `classify`.
    struct StuckClassifier;

    impl Classifier for StuckClassifier {
        fn classify(&mut self, _face: &Frame) -> Result<EmotionResult, ClassifyError> {
            loop {
                std::thread::sleep(Duration::from_secs(3600));
            }
        }
    }

    #[test]
    fn test_shutdown_detaches_stuck_worker() {
        let pool = ClassifierPool::new(vec![Box::new(StuckClassifier)], 2);
        pool.submit(request(0, 0)).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let tail = pool.shutdown(Duration::from_millis(100));
            done_tx.send(tail.len()).unwrap();
        });
        let tail = done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("shutdown returned within the grace period");
        assert_eq!(tail, 0);
    }

    /// Blocks until released, counting how many requests it started.
    struct CountingGate {
        release: Receiver<()>,
        started: Arc<AtomicUsize>,
    }

    impl Classifier for CountingGate {
        fn classify(&mut self, _face: &Frame) -> Result<EmotionResult, ClassifyError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            let _ = self.release.recv();
            EmotionResult::from_scores([("neutral", 100.0)])
        }
    }

    #[test]
    fn test_shutdown_discards_queued_requests() {
        let (release_tx, release_rx) = crossbeam_channel::unbounded();
        let started = Arc::new(AtomicUsize::new(0));
        let pool = ClassifierPool::new(
            vec![Box::new(CountingGate {
                release: release_rx,
                started: started.clone(),
            })],
            4,
        );

        pool.submit(request(0, 0)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while started.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        pool.submit(request(1, 0)).unwrap();
        pool.submit(request(2, 0)).unwrap();

        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            for _ in 0..3 {
                let _ = release_tx.send(());
            }
        });
        let tail = pool.shutdown(Duration::from_secs(5));

        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].slot, SlotId::new(0, 0));
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pool_without_workers_reports_closed() {
        let pool = ClassifierPool::new(Vec::new(), 4);
        assert_eq!(pool.submit(request(0, 0)), Err(DispatchError::PoolClosed));
    }
}
