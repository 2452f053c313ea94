use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, LockResult, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use binsight_contracts::detection::{normalize, parse_answer, DetectionResult, ParseOutcome};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::encode::encode_image;
use crate::error::DetectError;
use crate::gateway::VisionGateway;
use crate::history::{HistoryRecord, HistorySink};
use crate::request::{CaptureHints, ClassificationRequest};

/// One user-initiated capture. Consumed exactly once by `start`.
#[derive(Debug, Clone, Default)]
pub struct CaptureInput {
    pub image: Option<Vec<u8>>,
    pub hints: CaptureHints,
}

/// Lifecycle of one capture. A result exists if and only if the state is
/// `Success`; every other state carries nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionState {
    Idle,
    Scanning,
    Analyzing,
    Success(DetectionResult),
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// Capture event without an image: stays `Idle`, no gateway call.
    IgnoredNoImage,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Perceptual pause before the network-bound work. Cancellable; exists
    /// for UI feedback only.
    pub scan_delay: Duration,
    pub model: String,
    pub user_id: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scan_delay: Duration::from_millis(400),
            model: "gpt-4o-mini".to_string(),
            user_id: "anonymous".to_string(),
        }
    }
}

/// Single-flight state machine sequencing one capture from `Idle` to
/// `Success` or `Error`. Held per session; nothing here is ambient module
/// state, so independent sessions never interfere.
pub struct DetectionSession {
    gateway: Arc<dyn VisionGateway>,
    history: Arc<dyn HistorySink>,
    config: SessionConfig,
    inner: Arc<SessionInner>,
}

struct SessionInner {
    state: Mutex<DetectionState>,
    /// Bumped on every reset. A worker may only write state while the epoch
    /// it was started under is still current, so a torn-down capture can
    /// never update a discarded session.
    epoch: AtomicU64,
    cancel_tx: Mutex<Option<mpsc::Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DetectionSession {
    pub fn new(
        gateway: Arc<dyn VisionGateway>,
        history: Arc<dyn HistorySink>,
        config: SessionConfig,
    ) -> Self {
        Self {
            gateway,
            history,
            config,
            inner: Arc::new(SessionInner {
                state: Mutex::new(DetectionState::Idle),
                epoch: AtomicU64::new(0),
                cancel_tx: Mutex::new(None),
                worker: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> DetectionState {
        recover(self.inner.state.lock()).clone()
    }

    /// Begins one capture. Rejects with `Busy` unless the session is `Idle`;
    /// a capture without image bytes is a no-op.
    pub fn start(&self, input: CaptureInput) -> Result<StartOutcome, DetectError> {
        let Some(image) = input.image.filter(|bytes| !bytes.is_empty()) else {
            debug!("capture event without image, staying idle");
            return Ok(StartOutcome::IgnoredNoImage);
        };

        let (cancel_tx, cancel_rx) = mpsc::channel();
        // The epoch snapshot and the cancel sender must be installed in the
        // same critical section as the Idle -> Scanning write; a reset
        // interleaving here would otherwise hand the worker a post-reset
        // epoch and let it revive a discarded session.
        let epoch = {
            let mut state = recover(self.inner.state.lock());
            if *state != DetectionState::Idle {
                return Err(DetectError::Busy);
            }
            *state = DetectionState::Scanning;
            // Replacing the sender also cancels any lingering worker timer.
            *recover(self.inner.cancel_tx.lock()) = Some(cancel_tx);
            self.inner.epoch.load(Ordering::SeqCst)
        };

        let capture_id = Uuid::new_v4().to_string();
        let worker = CaptureWorker {
            gateway: Arc::clone(&self.gateway),
            history: Arc::clone(&self.history),
            inner: Arc::clone(&self.inner),
            config: self.config.clone(),
            epoch,
            capture_id,
            image,
            hints: input.hints,
        };
        let handle = thread::spawn(move || worker.run(cancel_rx));

        let mut slot = recover(self.inner.worker.lock());
        *slot = Some(handle);
        Ok(StartOutcome::Started)
    }

    /// Returns to `Idle`, discarding any held result and detaching any
    /// in-flight worker. Idempotent.
    pub fn reset(&self) {
        // Bump the epoch under the state lock so it is serialized with both
        // `start`'s snapshot and the worker's transitions.
        let mut state = recover(self.inner.state.lock());
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        // Dropping the sender wakes a worker parked in the scanning timer.
        recover(self.inner.cancel_tx.lock()).take();
        *state = DetectionState::Idle;
    }

    /// Blocks until the current worker (if any) has finished. The worker may
    /// have been invalidated by `reset`; this only waits, it never revives.
    pub fn wait(&self) {
        let handle = recover(self.inner.worker.lock()).take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

/// A poisoned lock only means another worker panicked mid-write; the state
/// machine's values are all valid on their own, so keep serving them instead
/// of propagating the panic.
fn recover<T>(result: LockResult<MutexGuard<'_, T>>) -> MutexGuard<'_, T> {
    result.unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct CaptureWorker {
    gateway: Arc<dyn VisionGateway>,
    history: Arc<dyn HistorySink>,
    inner: Arc<SessionInner>,
    config: SessionConfig,
    epoch: u64,
    capture_id: String,
    image: Vec<u8>,
    hints: CaptureHints,
}

impl CaptureWorker {
    fn run(self, cancel_rx: mpsc::Receiver<()>) {
        match cancel_rx.recv_timeout(self.config.scan_delay) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                debug!(capture_id = %self.capture_id, "capture cancelled during scanning");
                return;
            }
        }
        if !self.transition(DetectionState::Analyzing) {
            return;
        }

        match self.classify() {
            Ok((result, image_url)) => {
                let record = HistoryRecord::from_result(
                    &result,
                    &self.capture_id,
                    &self.config.user_id,
                    &image_url,
                    &self.hints,
                );
                if self.transition(DetectionState::Success(result)) {
                    self.history.record(record);
                }
            }
            Err(err) => {
                warn!(capture_id = %self.capture_id, error = %err, "capture failed");
                self.transition(DetectionState::Error);
            }
        }
    }

    fn classify(&self) -> Result<(DetectionResult, String), DetectError> {
        let image_url = encode_image(&self.image);
        let request =
            ClassificationRequest::build(image_url.clone(), self.hints.clone(), &self.config.model);
        let answer = self.gateway.classify(&request)?;
        match parse_answer(&answer) {
            ParseOutcome::Ok(fields) => Ok((normalize(fields), image_url)),
            ParseOutcome::Failed(reason) => {
                debug!(capture_id = %self.capture_id, raw_answer = %answer, "unparseable answer");
                Err(DetectError::MalformedResponse(reason))
            }
        }
    }

    /// Writes the new state only if this worker's epoch is still current.
    fn transition(&self, new_state: DetectionState) -> bool {
        let mut state = recover(self.inner.state.lock());
        if self.inner.epoch.load(Ordering::SeqCst) != self.epoch {
            return false;
        }
        *state = new_state;
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use binsight_contracts::detection::WasteCategory;

    use super::*;

    enum StubBehavior {
        Answer(&'static str),
        TransportFailure,
    }

    struct StubGateway {
        behavior: StubBehavior,
        calls: AtomicUsize,
    }

    impl StubGateway {
        fn answering(answer: &'static str) -> Arc<Self> {
            Arc::new(Self {
                behavior: StubBehavior::Answer(answer),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                behavior: StubBehavior::TransportFailure,
                calls: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl VisionGateway for StubGateway {
        fn name(&self) -> &str {
            "stub"
        }

        fn classify(&self, _request: &ClassificationRequest) -> Result<String, DetectError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                StubBehavior::Answer(answer) => Ok((*answer).to_string()),
                StubBehavior::TransportFailure => {
                    Err(DetectError::Transport("connection refused".to_string()))
                }
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        records: Mutex<Vec<HistoryRecord>>,
    }

    impl RecordingSink {
        fn recorded(&self) -> Vec<HistoryRecord> {
            self.records.lock().unwrap().clone()
        }
    }

    impl HistorySink for RecordingSink {
        fn record(&self, record: HistoryRecord) {
            self.records.lock().unwrap().push(record);
        }
    }

    fn fast_config() -> SessionConfig {
        SessionConfig {
            scan_delay: Duration::from_millis(5),
            ..SessionConfig::default()
        }
    }

    fn session_with(
        gateway: Arc<StubGateway>,
        sink: Arc<RecordingSink>,
        config: SessionConfig,
    ) -> DetectionSession {
        DetectionSession::new(gateway, sink, config)
    }

    const LEGACY_ANSWER: &str = r#"{
        "label": "Smartphone Battery",
        "recyclable": true,
        "confidence_score": 92,
        "estimated_credit": 45
    }"#;

    #[test]
    fn capture_without_image_stays_idle_and_never_calls_the_gateway() {
        let gateway = StubGateway::answering(LEGACY_ANSWER);
        let session = session_with(gateway.clone(), Arc::default(), fast_config());

        let outcome = session.start(CaptureInput::default()).unwrap();
        assert_eq!(outcome, StartOutcome::IgnoredNoImage);
        assert_eq!(session.state(), DetectionState::Idle);

        let outcome = session
            .start(CaptureInput {
                image: Some(Vec::new()),
                hints: CaptureHints::default(),
            })
            .unwrap();
        assert_eq!(outcome, StartOutcome::IgnoredNoImage);
        session.wait();
        assert_eq!(gateway.call_count(), 0);
    }

    #[test]
    fn successful_capture_reaches_success_with_normalized_result() {
        let gateway = StubGateway::answering(LEGACY_ANSWER);
        let sink: Arc<RecordingSink> = Arc::default();
        let session = session_with(gateway, sink.clone(), fast_config());

        session
            .start(CaptureInput {
                image: Some(vec![1, 2, 3]),
                hints: CaptureHints::default(),
            })
            .unwrap();
        session.wait();

        let DetectionState::Success(result) = session.state() else {
            panic!("expected success, got {:?}", session.state());
        };
        assert_eq!(result.item, "Smartphone Battery");
        assert_eq!(result.category, WasteCategory::Electronic);
        assert!((result.confidence - 0.92).abs() < 1e-9);
        assert_eq!(result.value, 45.0);

        let records = sink.recorded();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].item_label, "Smartphone Battery");
        assert!(records[0].image_url.starts_with("data:"));
    }

    #[test]
    fn gateway_failure_fails_closed_with_no_result_and_no_history() {
        let gateway = StubGateway::failing();
        let sink: Arc<RecordingSink> = Arc::default();
        let session = session_with(gateway, sink.clone(), fast_config());

        session
            .start(CaptureInput {
                image: Some(vec![1]),
                hints: CaptureHints::default(),
            })
            .unwrap();
        session.wait();

        assert_eq!(session.state(), DetectionState::Error);
        assert!(sink.recorded().is_empty());
    }

    #[test]
    fn unparseable_answer_reaches_error_not_success() {
        let gateway = StubGateway::answering("not json");
        let session = session_with(gateway, Arc::default(), fast_config());

        session
            .start(CaptureInput {
                image: Some(vec![1]),
                hints: CaptureHints::default(),
            })
            .unwrap();
        session.wait();
        assert_eq!(session.state(), DetectionState::Error);
    }

    #[test]
    fn second_capture_while_in_flight_is_rejected() {
        let gateway = StubGateway::answering(LEGACY_ANSWER);
        let config = SessionConfig {
            scan_delay: Duration::from_secs(30),
            ..SessionConfig::default()
        };
        let session = session_with(gateway, Arc::default(), config);

        session
            .start(CaptureInput {
                image: Some(vec![1]),
                hints: CaptureHints::default(),
            })
            .unwrap();
        let err = session
            .start(CaptureInput {
                image: Some(vec![2]),
                hints: CaptureHints::default(),
            })
            .unwrap_err();
        assert!(matches!(err, DetectError::Busy));

        session.reset();
        session.wait();
        assert_eq!(session.state(), DetectionState::Idle);
    }

    #[test]
    fn reset_is_idempotent_and_discards_the_result() {
        let gateway = StubGateway::answering(LEGACY_ANSWER);
        let session = session_with(gateway, Arc::default(), fast_config());

        session
            .start(CaptureInput {
                image: Some(vec![1]),
                hints: CaptureHints::default(),
            })
            .unwrap();
        session.wait();
        assert!(matches!(session.state(), DetectionState::Success(_)));

        session.reset();
        assert_eq!(session.state(), DetectionState::Idle);
        session.reset();
        assert_eq!(session.state(), DetectionState::Idle);
    }

    #[test]
    fn reset_mid_scan_cancels_the_worker_before_any_gateway_call() {
        let gateway = StubGateway::answering(LEGACY_ANSWER);
        let config = SessionConfig {
            scan_delay: Duration::from_secs(30),
            ..SessionConfig::default()
        };
        let session = session_with(gateway.clone(), Arc::default(), config);

        session
            .start(CaptureInput {
                image: Some(vec![1]),
                hints: CaptureHints::default(),
            })
            .unwrap();
        session.reset();
        session.wait();

        assert_eq!(session.state(), DetectionState::Idle);
        assert_eq!(gateway.call_count(), 0);
    }

    #[test]
    fn stale_worker_cannot_overwrite_a_reset_session() {
        // Worker survives the timer but loses its epoch before finishing.
        let gateway = StubGateway::answering(LEGACY_ANSWER);
        let session = session_with(
            gateway,
            Arc::default(),
            SessionConfig {
                scan_delay: Duration::from_millis(50),
                ..SessionConfig::default()
            },
        );

        session
            .start(CaptureInput {
                image: Some(vec![1]),
                hints: CaptureHints::default(),
            })
            .unwrap();
        session.reset();
        session.wait();
        assert_eq!(session.state(), DetectionState::Idle);

        // A fresh capture still works after the discarded one.
        session
            .start(CaptureInput {
                image: Some(vec![1]),
                hints: CaptureHints::default(),
            })
            .unwrap();
        session.wait();
        assert!(matches!(session.state(), DetectionState::Success(_)));
    }

    #[test]
    fn reset_racing_a_fresh_start_always_leaves_the_session_idle() {
        // Resetting right after start targets the window between the
        // Idle -> Scanning write and the worker's epoch snapshot; whichever
        // side wins, the discarded worker must never write state back.
        let gateway = StubGateway::answering(LEGACY_ANSWER);
        let session = session_with(
            gateway,
            Arc::default(),
            SessionConfig {
                scan_delay: Duration::from_millis(1),
                ..SessionConfig::default()
            },
        );

        for _ in 0..500 {
            session
                .start(CaptureInput {
                    image: Some(vec![1]),
                    hints: CaptureHints::default(),
                })
                .unwrap();
            session.reset();
            session.wait();
            assert_eq!(session.state(), DetectionState::Idle);
        }
    }

    #[test]
    fn poisoned_lock_recovers_instead_of_panicking() {
        let shared = Arc::new(Mutex::new(DetectionState::Idle));
        let poisoner = Arc::clone(&shared);
        let _ = thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the state lock");
        })
        .join();

        assert!(shared.lock().is_err());
        assert_eq!(*recover(shared.lock()), DetectionState::Idle);
    }
}
