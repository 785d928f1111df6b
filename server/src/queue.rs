//! Producer/consumer channel in front of the ingestion pipeline.
//!
//! One consumer task applies jobs in arrival order; every producer gets the
//! outcome of its own job back through a oneshot reply.

use fitsearch_core::{Engine, RawContent};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

#[derive(Debug)]
pub enum IngestJob {
    Upsert(RawContent),
    Remove(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Indexed(String),
    Removed(String),
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Core(#[from] fitsearch_core::Error),

    #[error("ingest worker is not running")]
    Closed,
}

struct Envelope {
    job: IngestJob,
    reply: oneshot::Sender<Result<IngestOutcome, fitsearch_core::Error>>,
}

#[derive(Clone)]
pub struct IngestQueue {
    tx: mpsc::Sender<Envelope>,
}

impl IngestQueue {
    /// Start the consumer task. It exits once every queue handle is dropped.
    pub fn spawn(engine: Arc<Engine>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_worker(engine, rx));
        (Self { tx }, handle)
    }

    pub async fn submit(&self, job: IngestJob) -> Result<IngestOutcome, QueueError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Envelope { job, reply }).await.map_err(|_| QueueError::Closed)?;
        let outcome = rx.await.map_err(|_| QueueError::Closed)?;
        Ok(outcome?)
    }
}

async fn run_worker(engine: Arc<Engine>, mut rx: mpsc::Receiver<Envelope>) {
    tracing::info!("ingest worker started");
    while let Some(Envelope { job, reply }) = rx.recv().await {
        let engine = engine.clone();
        let outcome = tokio::task::spawn_blocking(move || apply(&engine, job)).await;
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "ingest job panicked");
                continue;
            }
        };
        // The producer may have gone away; the job is applied regardless.
        let _ = reply.send(outcome);
    }
    tracing::info!("ingest worker stopped");
}

fn apply(engine: &Engine, job: IngestJob) -> Result<IngestOutcome, fitsearch_core::Error> {
    match job {
        IngestJob::Upsert(raw) => engine.ingest(raw).map(IngestOutcome::Indexed),
        IngestJob::Remove(id) => {
            engine.remove(&id);
            Ok(IngestOutcome::Removed(id))
        }
    }
}
