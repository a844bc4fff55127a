//! Serialized access to the recognition backend.
//!
//! The backend is memory hungry and not safe to drive in parallel, so the
//! process owns exactly one of it:
//!
//! * [`EngineManager`] creates the backend lazily. The first caller of
//!   [`EngineManager::acquire`] starts initialization as a shared future;
//!   everybody arriving while it runs awaits that same future, so a second
//!   backend is never created. A failed initialization is handed to every
//!   waiter and then forgotten, letting the next caller try again.
//! * [`RecognitionEngine`] feeds jobs from one unbounded FIFO channel to a
//!   single worker thread. Jobs run one at a time, in submission order, and
//!   always run to completion.
//! * Shutdown closes the queue, lets the worker drain what was already
//!   submitted (bounded by a timeout) and releases the backend exactly once.

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use pricelens_core::OcrSettings;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::recognizer::{BackendFactory, EngineParams, OcrBackend, OcrError};
use crate::types::RecognizedText;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("Recognition engine failed to initialize: {0}")]
    Init(String),
    #[error("Recognition engine is shut down")]
    ShutDown,
}

type JobResult = Result<RecognizedText, OcrError>;
type InitFuture = Shared<BoxFuture<'static, Result<Arc<RecognitionEngine>, EngineError>>>;

/// A queued recognition request.
struct Job {
    image: Vec<u8>,
    reply: oneshot::Sender<JobResult>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Engine manager ───────────────────────────────────────────────────────────

#[derive(Default)]
struct ManagerState {
    init: Option<InitFuture>,
    closed: bool,
}

/// Process-scoped owner of the one recognition engine.
pub struct EngineManager {
    params: EngineParams,
    factory: Arc<dyn BackendFactory>,
    shutdown_timeout: Duration,
    state: Mutex<ManagerState>,
}

impl EngineManager {
    pub fn new(
        params: EngineParams,
        factory: impl BackendFactory,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            params,
            factory: Arc::new(factory),
            shutdown_timeout,
            state: Mutex::new(ManagerState::default()),
        }
    }

    pub fn from_settings(settings: &OcrSettings, factory: impl BackendFactory) -> Self {
        Self::new(EngineParams::from(settings), factory, settings.shutdown_timeout())
    }

    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    /// Return the shared engine, initializing it on first use.
    pub async fn acquire(&self) -> Result<Arc<RecognitionEngine>, EngineError> {
        let init = {
            let mut state = lock(&self.state);
            if state.closed {
                return Err(EngineError::ShutDown);
            }
            state.init.get_or_insert_with(|| self.start_init()).clone()
        };

        let outcome = init.clone().await;
        if outcome.is_err() {
            let mut state = lock(&self.state);
            // Only forget our own attempt; a retry may already be under way.
            if state.init.as_ref().is_some_and(|current| current.ptr_eq(&init)) {
                state.init = None;
            }
        }
        outcome
    }

    /// Queue `image` for recognition.
    ///
    /// The job is enqueued before this returns; the returned future resolves
    /// once the worker has finished it.
    pub async fn submit(&self, image: Vec<u8>) -> Result<PendingRecognition, EngineError> {
        let engine = self.acquire().await?;
        Ok(engine.submit(image))
    }

    fn start_init(&self) -> InitFuture {
        let factory = Arc::clone(&self.factory);
        let params = self.params.clone();
        async move {
            info!(language = %params.language, whitelist = %params.whitelist, "Initializing recognition engine");
            match tokio::task::spawn_blocking(move || factory.create(&params)).await {
                Ok(Ok(backend)) => {
                    info!("Recognition engine ready");
                    Ok(Arc::new(RecognitionEngine::start(backend)))
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Recognition engine initialization failed");
                    Err(EngineError::Init(e.to_string()))
                }
                Err(e) => {
                    warn!(error = %e, "Recognition engine initialization task failed");
                    Err(EngineError::Init(e.to_string()))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Stop accepting work, drain the queue and release the backend.
    ///
    /// Only the first call does anything. Later calls return immediately.
    pub async fn shutdown(&self) {
        let init = {
            let mut state = lock(&self.state);
            if state.closed {
                return;
            }
            state.closed = true;
            state.init.take()
        };

        let Some(init) = init else {
            debug!("Recognition engine was never started");
            return;
        };

        // An initialization still in flight is awaited so its backend is released too.
        match tokio::time::timeout(self.shutdown_timeout, init).await {
            Ok(Ok(engine)) => engine.shutdown(self.shutdown_timeout).await,
            Ok(Err(_)) => debug!("Recognition engine never initialized; nothing to release"),
            Err(_) => warn!(
                timeout = ?self.shutdown_timeout,
                "Timed out waiting for recognition engine initialization during shutdown"
            ),
        }
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// Handle to the running backend and its job queue.
pub struct RecognitionEngine {
    queue: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    depth: Arc<AtomicUsize>,
}

impl RecognitionEngine {
    /// Spawn the worker that owns `backend`. Must be called inside a Tokio runtime.
    pub fn start(backend: Box<dyn OcrBackend>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));
        let worker_depth = Arc::clone(&depth);
        let worker = tokio::task::spawn_blocking(move || run_worker(backend, rx, worker_depth));
        Self {
            queue: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            depth,
        }
    }

    /// Append a job to the queue. Never blocks.
    pub fn submit(&self, image: Vec<u8>) -> PendingRecognition {
        let (reply, rx) = oneshot::channel();
        if let Some(queue) = lock(&self.queue).as_ref() {
            let depth = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
            debug!(depth, bytes = image.len(), "Recognition job queued");
            // A closed queue drops the job and its reply sender; the caller
            // then sees `ShutDown`.
            if queue.send(Job { image, reply }).is_err() {
                self.depth.fetch_sub(1, Ordering::SeqCst);
            }
        }
        PendingRecognition { rx }
    }

    /// Jobs submitted and not yet finished, including the one running.
    pub fn queue_depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn is_accepting(&self) -> bool {
        lock(&self.queue).is_some()
    }

    /// Close the queue and wait up to `timeout` for the worker to drain it.
    pub async fn shutdown(&self, timeout: Duration) {
        if lock(&self.queue).take().is_none() {
            return;
        }
        let pending = self.queue_depth();
        info!(pending, "Draining recognition queue");

        let worker = lock(&self.worker).take();
        let Some(worker) = worker else { return };
        match tokio::time::timeout(timeout, worker).await {
            Ok(Ok(())) => info!("Recognition engine released"),
            Ok(Err(e)) => warn!(error = %e, "Recognition worker ended abnormally"),
            Err(_) => warn!(
                ?timeout,
                remaining = self.queue_depth(),
                "Timed out draining recognition queue; abandoning worker"
            ),
        }
    }
}

/// Resolves when the worker has finished the corresponding job.
pub struct PendingRecognition {
    rx: oneshot::Receiver<JobResult>,
}

impl Future for PendingRecognition {
    type Output = JobResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|reply| reply.unwrap_or(Err(OcrError::ShutDown)))
    }
}

fn run_worker(
    mut backend: Box<dyn OcrBackend>,
    mut rx: mpsc::UnboundedReceiver<Job>,
    depth: Arc<AtomicUsize>,
) {
    let mut completed = 0u64;
    while let Some(job) = rx.blocking_recv() {
        let result = catch_unwind(AssertUnwindSafe(|| backend.recognize(&job.image)))
            .unwrap_or_else(|_| Err(OcrError::Engine("recognition panicked".to_string())));
        depth.fetch_sub(1, Ordering::SeqCst);
        completed += 1;
        match &result {
            Ok(text) => debug!(chars = text.text.len(), confidence = ?text.confidence, "Recognition job finished"),
            Err(e) => warn!(error = %e, "Recognition job failed"),
        }
        // The caller may be gone; the job still ran to completion.
        let _ = job.reply.send(result);
    }
    backend.terminate();
    info!(completed, "Recognition worker stopped");
}
