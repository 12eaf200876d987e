//! Interaction pipeline
//!
//! Moves events from an event source into the learning engine. Events are
//! queued without blocking the caller and trained by a single worker task in
//! submission order. Each event is archived to the optional event log first;
//! training instructions decide whether it also reaches `train_step`.

pub mod source;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

use crate::instructions::{Instruction, InstructionEngine};
use crate::learning::LearningEngine;
use crate::storage::EventLog;
use crate::types::InteractionEvent;

pub use source::{EventHandler, EventSource, LocalEventSource, Subscription};

/// Accepting side of the queue, shared with source handlers
struct Intake {
    queue: Mutex<Option<mpsc::UnboundedSender<InteractionEvent>>>,
    submitted: AtomicU64,
}

impl Intake {
    fn submit(&self, event: InteractionEvent) -> bool {
        let queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = queue.as_ref() else {
            debug!("Pipeline closed, dropping {} event", event.kind);
            return false;
        };
        // Counted under the queue lock so sequence numbers follow channel order
        if tx.send(event).is_err() {
            return false;
        }
        self.submitted.fetch_add(1, Ordering::AcqRel);
        true
    }

    fn close(&self) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Queue plus worker that feeds the learning engine
pub struct InteractionPipeline {
    intake: Arc<Intake>,
    completed: watch::Receiver<u64>,
    instructions: Arc<RwLock<Vec<Instruction>>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl InteractionPipeline {
    /// Spawn the training worker
    pub fn start(
        engine: Arc<dyn LearningEngine>,
        instructions: Vec<Instruction>,
        event_log: Option<Arc<dyn EventLog>>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (completed_tx, completed_rx) = watch::channel(0u64);
        let instructions = Arc::new(RwLock::new(instructions));

        let worker = tokio::spawn(run_worker(
            rx,
            engine,
            instructions.clone(),
            event_log,
            completed_tx,
        ));

        Self {
            intake: Arc::new(Intake {
                queue: Mutex::new(Some(tx)),
                submitted: AtomicU64::new(0),
            }),
            completed: completed_rx,
            instructions,
            worker: tokio::sync::Mutex::new(Some(worker)),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Queue one event. Never blocks; returns false once the pipeline is closed.
    pub fn submit(&self, event: InteractionEvent) -> bool {
        self.intake.submit(event)
    }

    /// Forward events for `subject_id` from `source` into this pipeline.
    ///
    /// Events for other subjects are skipped. Cancelling the returned handle
    /// takes effect immediately for events not yet handed over; events
    /// already queued still train.
    pub fn attach(&self, source: &dyn EventSource, subject_id: impl Into<String>) -> Subscription {
        let gate = Subscription::new();
        let intake = self.intake.clone();
        let handler_gate = gate.clone();
        let subject_id = subject_id.into();
        let handler: EventHandler = Arc::new(move |event| {
            if handler_gate.is_cancelled() {
                return;
            }
            if event.subject_id != subject_id {
                debug!("Skipping {} event for subject {}", event.kind, event.subject_id);
                return;
            }
            intake.submit(event);
        });

        let upstream = source.subscribe(handler);
        let subscription = gate.linked(upstream);
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscription.clone());
        info!("Pipeline attached to event source");
        subscription
    }

    /// Cancel all source subscriptions
    pub fn detach_all(&self) {
        let subscriptions: Vec<Subscription> = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for subscription in &subscriptions {
            subscription.cancel();
        }
    }

    pub async fn set_instructions(&self, instructions: Vec<Instruction>) {
        *self.instructions.write().await = instructions;
    }

    pub async fn instructions(&self) -> Vec<Instruction> {
        self.instructions.read().await.clone()
    }

    pub fn submitted(&self) -> u64 {
        self.intake.submitted.load(Ordering::Acquire)
    }

    pub fn completed(&self) -> u64 {
        *self.completed.borrow()
    }

    /// Wait until every event submitted before this call has been processed
    pub async fn drain(&self) {
        let target = self.submitted();
        let mut completed = self.completed.clone();
        if completed.wait_for(|done| *done >= target).await.is_err() {
            debug!("Pipeline worker gone while draining");
        }
    }

    /// Stop accepting events, finish everything queued, and join the worker.
    ///
    /// An in-flight training step always runs to completion.
    pub async fn shutdown(&self) -> Result<(), JoinError> {
        self.detach_all();
        self.intake.close();

        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            worker.await?;
            info!("Pipeline stopped after {} events", self.completed());
        }
        Ok(())
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<InteractionEvent>,
    engine: Arc<dyn LearningEngine>,
    instructions: Arc<RwLock<Vec<Instruction>>>,
    event_log: Option<Arc<dyn EventLog>>,
    completed: watch::Sender<u64>,
) {
    while let Some(event) = rx.recv().await {
        if let Some(log) = &event_log {
            if let Err(e) = log.append(&event).await {
                warn!("Failed to archive {} event: {}", event.kind, e);
            }
        }

        let train = {
            let rules = instructions.read().await;
            InstructionEngine::should_train_on(&event, &rules)
        };

        if train {
            if let Err(e) = engine.train_step(&event).await {
                warn!("Training step rejected for {} event: {}", event.kind, e);
            }
        } else {
            debug!("Instructions exclude {} event from training", event.kind);
        }

        completed.send_modify(|done| *done += 1);
    }
}
