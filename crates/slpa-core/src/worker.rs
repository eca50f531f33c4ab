use crate::SlpaEngine;
use anyhow::{anyhow, Result};
use slpa_common::config::WorkerConfig;
use slpa_common::{ChangeOutcome, ChangeRecord, GraphError};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};

const COMMAND_CHANNEL_CAPACITY: usize = 1024;

pub enum WorkerCommand {
    Change(ChangeRecord),
    /// Apply whatever is buffered now and report every outcome not yet reported.
    Flush(oneshot::Sender<slpa_common::Result<Vec<ChangeOutcome>>>),
}

/// Client side of an [`UpdateWorker`]. Dropping every handle shuts the worker down
/// after a final flush.
#[derive(Clone)]
pub struct WorkerHandle {
    sender: mpsc::Sender<WorkerCommand>,
}

impl WorkerHandle {
    pub async fn submit(&self, record: ChangeRecord) -> Result<()> {
        self.sender
            .send(WorkerCommand::Change(record))
            .await
            .map_err(|_| anyhow!("update worker is not running"))
    }

    pub async fn flush(&self) -> Result<Vec<ChangeOutcome>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(WorkerCommand::Flush(tx))
            .await
            .map_err(|_| anyhow!("update worker is not running"))?;
        let outcomes = rx.await.map_err(|_| anyhow!("update worker dropped flush request"))??;
        Ok(outcomes)
    }
}

/// Buffers change records and applies them to a shared engine in batches.
///
/// A batch is flushed when `flush_threshold` records are pending, on every tick
/// while records are pending, on an explicit flush and on shutdown.
///
/// Outcomes of threshold and tick batches are held until the next explicit
/// flush, which returns them in submission order ahead of its own batch.
pub struct UpdateWorker {
    engine: Arc<RwLock<SlpaEngine>>,
    config: WorkerConfig,
    buffer: Vec<ChangeRecord>,
    unreported: Vec<ChangeOutcome>,
    batch_error: Option<GraphError>,
    receiver: mpsc::Receiver<WorkerCommand>,
}

impl UpdateWorker {
    pub fn new(engine: Arc<RwLock<SlpaEngine>>, config: WorkerConfig) -> (Self, WorkerHandle) {
        let (sender, receiver) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let worker = Self {
            engine,
            buffer: Vec::with_capacity(config.flush_threshold),
            unreported: Vec::new(),
            batch_error: None,
            config,
            receiver,
        };
        (worker, WorkerHandle { sender })
    }

    pub fn spawn(engine: Arc<RwLock<SlpaEngine>>, config: WorkerConfig) -> (WorkerHandle, JoinHandle<()>) {
        let (worker, handle) = Self::new(engine, config);
        (handle, tokio::spawn(worker.run()))
    }

    pub async fn run(mut self) {
        tracing::info!(
            "Update worker started (flush_threshold={}, tick={}ms)",
            self.config.flush_threshold,
            self.config.tick_interval_ms
        );
        let mut interval = tokio::time::interval(Duration::from_millis(self.config.tick_interval_ms.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                command = self.receiver.recv() => match command {
                    Some(WorkerCommand::Change(record)) => {
                        self.buffer.push(record);
                        if self.buffer.len() >= self.config.flush_threshold {
                            self.flush_logged().await;
                        }
                    }
                    Some(WorkerCommand::Flush(reply)) => {
                        let result = self.flush_requested().await;
                        if reply.send(result).is_err() {
                            tracing::debug!("Flush requester went away before the reply");
                        }
                    }
                    None => {
                        self.flush_logged().await;
                        let failed = self.unreported.iter().filter(|o| o.is_err()).count();
                        if failed > 0 {
                            tracing::warn!("{} failed changes were never collected by a flush", failed);
                        }
                        break;
                    }
                },
                _ = interval.tick() => {
                    if !self.buffer.is_empty() {
                        self.flush_logged().await;
                    }
                }
            }
        }

        tracing::info!("Update worker stopped.");
    }

    async fn flush_logged(&mut self) {
        match self.flush_buffer().await {
            Ok(outcomes) => self.unreported.extend(outcomes),
            Err(e) => {
                tracing::error!("Update batch failed: {:?}", e);
                self.batch_error.get_or_insert(e);
            }
        }
    }

    /// A failed automatic batch is reported first; its buffered records are dropped.
    async fn flush_requested(&mut self) -> slpa_common::Result<Vec<ChangeOutcome>> {
        if let Some(e) = self.batch_error.take() {
            return Err(e);
        }
        let batch = self.flush_buffer().await?;
        let mut outcomes = std::mem::take(&mut self.unreported);
        outcomes.extend(batch);
        Ok(outcomes)
    }

    async fn flush_buffer(&mut self) -> slpa_common::Result<Vec<ChangeOutcome>> {
        if self.buffer.is_empty() {
            return Ok(Vec::new());
        }
        let batch = std::mem::take(&mut self.buffer);

        let mut engine = self.engine.write().await;
        let report = engine.apply_batch(&batch)?;
        tracing::debug!(
            "Flushed {} buffered changes ({} failed, {} memberships refreshed)",
            batch.len(),
            report.failed(),
            report.refreshed.len()
        );
        Ok(report.outcomes)
    }
}
