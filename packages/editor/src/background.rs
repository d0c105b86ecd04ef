//! Debounced derived work (validation, serialization) run off the editing
//! thread against immutable snapshots.
//!
//! Every edit bumps a generation counter and aborts in-flight jobs. Results
//! carry the generation they were started for and are dropped when stale,
//! so a slow job can never report on a document that has since changed.

use crate::document::{Document, DocumentSnapshot};
use crate::events::{AdvisoryEvent, AdvisoryOutcome};
use crate::services::{SerializationService, ValidationService};
use crate::EditorConfig;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobKind {
    Validation,
    Serialization,
}

#[derive(Clone)]
pub enum DerivedJob {
    Validate(Arc<dyn ValidationService>),
    Serialize(Arc<dyn SerializationService>),
}

impl DerivedJob {
    pub fn kind(&self) -> JobKind {
        match self {
            DerivedJob::Validate(_) => JobKind::Validation,
            DerivedJob::Serialize(_) => JobKind::Serialization,
        }
    }

    fn run(&self, snapshot: &DocumentSnapshot) -> AdvisoryOutcome {
        match self {
            DerivedJob::Validate(service) => AdvisoryOutcome::Diagnostics {
                diagnostics: service.validate(snapshot.tree()),
            },
            DerivedJob::Serialize(service) => match service.serialize(snapshot.tree()) {
                Ok(bytes) => AdvisoryOutcome::Serialized { bytes },
                Err(err) => AdvisoryOutcome::Failed {
                    message: err.to_string(),
                },
            },
        }
    }
}

pub struct BackgroundScheduler {
    runtime: Handle,
    debounce: Duration,
    jobs: Vec<DerivedJob>,
    due: Option<Instant>,
    generation: Arc<AtomicU64>,
    in_flight: Vec<JoinHandle<()>>,
    results_tx: mpsc::UnboundedSender<AdvisoryEvent>,
    results_rx: mpsc::UnboundedReceiver<AdvisoryEvent>,
}

impl BackgroundScheduler {
    pub fn new(runtime: Handle, config: &EditorConfig) -> Self {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        Self {
            runtime,
            debounce: config.derived_debounce(),
            jobs: Vec::new(),
            due: None,
            generation: Arc::new(AtomicU64::new(0)),
            in_flight: Vec::new(),
            results_tx,
            results_rx,
        }
    }

    pub fn with_job(mut self, job: DerivedJob) -> Self {
        self.jobs.push(job);
        self
    }

    pub fn add_job(&mut self, job: DerivedJob) {
        self.jobs.push(job);
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Whether a debounced run is scheduled but not yet started
    pub fn is_pending(&self) -> bool {
        self.due.is_some()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.iter().filter(|h| !h.is_finished()).count()
    }

    pub fn note_edit(&mut self) {
        self.note_edit_at(Instant::now());
    }

    /// Restart the quiet period and invalidate anything already running
    pub fn note_edit_at(&mut self, now: Instant) {
        self.cancel();
        self.due = Some(now + self.debounce);
    }

    /// Abort in-flight jobs; their results will never be delivered
    pub fn cancel(&mut self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let aborted = self.in_flight.len();
        for handle in self.in_flight.drain(..) {
            handle.abort();
        }
        if aborted > 0 {
            debug!(generation, aborted, "derived work cancelled");
        }
    }

    pub fn poll(&mut self, doc: &Document) -> Vec<AdvisoryEvent> {
        self.poll_at(doc, Instant::now())
    }

    /// Start debounced work that has come due, then collect finished results
    pub fn poll_at(&mut self, doc: &Document, now: Instant) -> Vec<AdvisoryEvent> {
        if self.due.is_some_and(|due| due <= now) {
            self.due = None;
            self.spawn(doc.snapshot());
        }
        self.in_flight.retain(|handle| !handle.is_finished());
        self.drain()
    }

    /// Start every job right away, skipping the debounce
    pub fn run_now(&mut self, doc: &Document) {
        self.cancel();
        self.due = None;
        self.spawn(doc.snapshot());
    }

    /// Wait for in-flight jobs, then collect their results
    pub async fn flush(&mut self) -> Vec<AdvisoryEvent> {
        for handle in self.in_flight.drain(..) {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    warn!(error = %err, "derived job panicked");
                }
            }
        }
        self.drain()
    }

    fn drain(&mut self) -> Vec<AdvisoryEvent> {
        let current = self.generation();
        let mut fresh = Vec::new();
        while let Ok(event) = self.results_rx.try_recv() {
            if event.generation == current {
                fresh.push(event);
            } else {
                warn!(generation = event.generation, current, "stale result dropped");
            }
        }
        fresh
    }

    fn spawn(&mut self, snapshot: DocumentSnapshot) {
        let generation = self.generation();
        debug!(
            generation,
            version = snapshot.version(),
            jobs = self.jobs.len(),
            "starting derived work"
        );

        for job in &self.jobs {
            let job = job.clone();
            let snapshot = snapshot.clone();
            let tx = self.results_tx.clone();
            let current = Arc::clone(&self.generation);

            let handle = self.runtime.spawn(async move {
                let kind = job.kind();
                let version = snapshot.version();
                let outcome = match tokio::task::spawn_blocking(move || job.run(&snapshot)).await {
                    Ok(outcome) => outcome,
                    Err(err) => AdvisoryOutcome::Failed {
                        message: err.to_string(),
                    },
                };
                if current.load(Ordering::SeqCst) != generation {
                    return;
                }
                // Receiver gone means the scheduler was dropped.
                let _ = tx.send(AdvisoryEvent {
                    job: kind,
                    generation,
                    document_version: version,
                    outcome,
                });
            });
            self.in_flight.push(handle);
        }
    }
}

impl Drop for BackgroundScheduler {
    fn drop(&mut self) {
        for handle in self.in_flight.drain(..) {
            handle.abort();
        }
    }
}
