//! Single-worker background loader with a one-slot handoff.
//!
//! The consumer enqueues requests and polls for finished bundles; the worker
//! services requests in FIFO order. The ready slot is a bounded channel of
//! capacity one, so a finished bundle waits on the worker (blocked, not
//! spinning) until the consumer drains the previous one.

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded, select, unbounded};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use worldstream_assets::AssetError;
use worldstream_terrain::TerrainError;

/// Failure of a single request. Logged and dropped at the worker boundary.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Terrain(#[from] TerrainError),
    #[error("invalid content: {0}")]
    Invalid(String),
    #[error("load panicked: {0}")]
    Panicked(String),
}

/// Condition that ends the worker loop itself.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkerFault {
    #[error("request queue disconnected")]
    RequestsClosed,
    #[error("consumer side disconnected")]
    ConsumerClosed,
    #[error("worker panicked: {0}")]
    Panicked(String),
}

/// Misuse of the loader or a dead worker, reported to the consumer.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("cannot {op} while loader is {state:?}")]
    InvalidState {
        op: &'static str,
        state: LoaderState,
    },
    #[error("loader worker has terminated")]
    Faulted,
    #[error("failed to spawn loader thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    Idle,
    Running,
    Terminating,
    Stopped,
}

/// What "load" means for one loader instance.
pub trait LoadJob: Send + 'static {
    type Request: Clone + fmt::Debug + Send + 'static;
    type Bundle: Send + 'static;

    /// Checked when a request is dequeued; `true` skips it.
    fn already_resident(&self, _request: &Self::Request) -> bool {
        false
    }

    fn load(&mut self, request: &Self::Request) -> Result<Self::Bundle, LoadError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    AlreadyResident,
    Failed,
}

/// A request the worker finished without producing a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dropped<R> {
    pub request: R,
    pub reason: DropReason,
}

/// Called on the worker thread when the worker dies. Must only flag state
/// for the consumer to observe.
pub type TerminationHook = Box<dyn Fn(&WorkerFault) + Send + 'static>;

struct WorkerEnds<J: LoadJob> {
    job: J,
    requests: Receiver<J::Request>,
    ready: Sender<J::Bundle>,
    dropped: Sender<Dropped<J::Request>>,
}

pub struct StreamingLoader<J: LoadJob> {
    name: String,
    state: LoaderState,
    worker_ends: Option<WorkerEnds<J>>,
    on_terminate: Option<TerminationHook>,
    requests: Sender<J::Request>,
    ready: Receiver<J::Bundle>,
    dropped: Receiver<Dropped<J::Request>>,
    shutdown: Option<Sender<()>>,
    faulted: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl<J: LoadJob> StreamingLoader<J> {
    pub fn new(name: impl Into<String>, job: J) -> Self {
        let (requests_tx, requests_rx) = unbounded();
        let (ready_tx, ready_rx) = bounded(1);
        let (dropped_tx, dropped_rx) = unbounded();
        Self {
            name: name.into(),
            state: LoaderState::Idle,
            worker_ends: Some(WorkerEnds {
                job,
                requests: requests_rx,
                ready: ready_tx,
                dropped: dropped_tx,
            }),
            on_terminate: None,
            requests: requests_tx,
            ready: ready_rx,
            dropped: dropped_rx,
            shutdown: None,
            faulted: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Install the hook run on the worker thread if it terminates abnormally.
    pub fn with_termination_hook(mut self, hook: TerminationHook) -> Self {
        self.on_terminate = Some(hook);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> LoaderState {
        self.state
    }

    /// Whether the worker died. Set from the worker thread.
    pub fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::Acquire)
    }

    /// Requests queued but not yet picked up by the worker.
    pub fn queued(&self) -> usize {
        self.requests.len()
    }

    /// Spawn the worker thread.
    pub fn start(&mut self) -> Result<(), LoaderError> {
        let Some(ends) = self.worker_ends.take().filter(|_| self.state == LoaderState::Idle)
        else {
            return Err(LoaderError::InvalidState {
                op: "start",
                state: self.state,
            });
        };

        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let faulted = Arc::clone(&self.faulted);
        let hook = self.on_terminate.take();
        let name = self.name.clone();

        let handle = thread::Builder::new()
            .name(format!("{}-loader", self.name))
            .spawn(move || {
                let _span = tracing::info_span!("loader", name = %name).entered();
                let worker = Worker {
                    job: ends.job,
                    requests: ends.requests,
                    ready: ends.ready,
                    dropped: ends.dropped,
                    shutdown: shutdown_rx,
                };
                let fault = match panic::catch_unwind(AssertUnwindSafe(move || worker.run())) {
                    Ok(Ok(())) => {
                        tracing::debug!("loader worker exited");
                        return;
                    }
                    Ok(Err(fault)) => fault,
                    Err(payload) => WorkerFault::Panicked(panic_message(payload.as_ref())),
                };
                tracing::error!(error = %fault, "loader worker terminated");
                faulted.store(true, Ordering::Release);
                if let Some(hook) = hook {
                    hook(&fault);
                }
            })?;

        self.shutdown = Some(shutdown_tx);
        self.worker = Some(handle);
        self.state = LoaderState::Running;
        tracing::debug!(loader = %self.name, "loader started");
        Ok(())
    }

    /// Append a request to the FIFO queue. Never blocks.
    pub fn enqueue(&self, request: J::Request) -> Result<(), LoaderError> {
        if self.state != LoaderState::Running {
            return Err(LoaderError::InvalidState {
                op: "enqueue",
                state: self.state,
            });
        }
        if self.is_faulted() {
            return Err(LoaderError::Faulted);
        }
        self.requests
            .send(request)
            .map_err(|_| LoaderError::Faulted)
    }

    /// Take the finished bundle, if one is waiting. Never blocks.
    ///
    /// # Panics
    /// If the loader was never started.
    pub fn poll_ready(&mut self) -> Option<J::Bundle> {
        assert!(
            self.state != LoaderState::Idle,
            "poll_ready called on loader `{}` before start",
            self.name
        );
        self.ready.try_recv().ok()
    }

    /// Requests the worker skipped or failed since the last call.
    pub fn drain_dropped(&mut self) -> Vec<Dropped<J::Request>> {
        self.dropped.try_iter().collect()
    }

    /// Signal the worker and wait for it to exit. Work already in progress
    /// finishes first. Idempotent.
    pub fn stop(&mut self) {
        match self.state {
            LoaderState::Stopped => return,
            LoaderState::Idle => {
                self.state = LoaderState::Stopped;
                return;
            }
            LoaderState::Running | LoaderState::Terminating => {}
        }
        self.state = LoaderState::Terminating;
        // disconnecting the shutdown channel wakes the worker wherever it waits
        self.shutdown.take();
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                tracing::error!(loader = %self.name, "termination hook panicked");
            }
        }
        self.state = LoaderState::Stopped;
        tracing::debug!(loader = %self.name, "loader stopped");
    }
}

impl<J: LoadJob> Drop for StreamingLoader<J> {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker<J: LoadJob> {
    job: J,
    requests: Receiver<J::Request>,
    ready: Sender<J::Bundle>,
    dropped: Sender<Dropped<J::Request>>,
    shutdown: Receiver<()>,
}

impl<J: LoadJob> Worker<J> {
    fn run(mut self) -> Result<(), WorkerFault> {
        loop {
            if self.shutdown_requested() {
                return Ok(());
            }
            let request = select! {
                recv(self.shutdown) -> _ => return Ok(()),
                recv(self.requests) -> msg => msg.map_err(|_| WorkerFault::RequestsClosed)?,
            };

            if self.job.already_resident(&request) {
                tracing::debug!(?request, "skipping request for resident target");
                self.report(request, DropReason::AlreadyResident)?;
                continue;
            }

            let result = {
                let _span = tracing::debug_span!("load", ?request).entered();
                let job = &mut self.job;
                panic::catch_unwind(AssertUnwindSafe(|| job.load(&request)))
                    .unwrap_or_else(|payload| {
                        Err(LoadError::Panicked(panic_message(payload.as_ref())))
                    })
            };
            match result {
                Ok(bundle) => {
                    select! {
                        send(self.ready, bundle) -> res => res.map_err(|_| WorkerFault::ConsumerClosed)?,
                        recv(self.shutdown) -> _ => return Ok(()),
                    }
                }
                Err(err) => {
                    tracing::warn!(?request, error = %err, "load failed, request dropped");
                    self.report(request, DropReason::Failed)?;
                }
            }
        }
    }

    fn shutdown_requested(&self) -> bool {
        matches!(self.shutdown.try_recv(), Err(TryRecvError::Disconnected))
    }

    fn report(&self, request: J::Request, reason: DropReason) -> Result<(), WorkerFault> {
        self.dropped
            .send(Dropped { request, reason })
            .map_err(|_| WorkerFault::ConsumerClosed)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".into()
    }
}
