//! The batch service: bounded intake queue + periodic commit worker.
//!
//! Every inbound edit batch is validated synchronously, stamped with the
//! server's wall clock and the submitting client id, and enqueued whole.
//! A single worker task drains the queue on a timer: the accumulated
//! operations are stably sorted by timestamp (arrival order breaks ties)
//! and committed as exactly one new history version per tick. An empty
//! buffer produces no version.
//!
//! Backpressure is the bounded channel itself — producers wait in
//! `send().await` when the queue is full; nothing is shed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info};
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use replist_core::{now_micros, ClientId, DocumentHistory, ListEntry, ListOp, OpError, StorageOp};

use crate::monitor::ServerMonitor;
use crate::protocol::{EditKind, EditRequest};

/// Batch-service tuning knobs.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Capacity of the inbound batch queue, in batches.
    pub queue_size: usize,
    /// Commit tick period.
    pub commit_period: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            queue_size: 50,
            commit_period: Duration::from_millis(500),
        }
    }
}

/// Service-level failure, returned to the RPC caller.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("client id: must be non-zero")]
    ZeroClientId,
    #[error("edit[{index}] ({kind}): {source}")]
    InvalidEdit {
        index: usize,
        kind: EditKind,
        source: OpError,
    },
    #[error("batch queue closed")]
    QueueClosed,
    #[error("{0}: out of range")]
    InvalidConfig(&'static str),
}

/// Accepts edit batches and commits them to history on a timer.
pub struct BatchService {
    history: Arc<DocumentHistory>,
    monitor: Arc<ServerMonitor>,
    batch_tx: mpsc::Sender<Vec<StorageOp>>,
    stop_tx: watch::Sender<bool>,
}

impl BatchService {
    /// Validate the configuration and spawn the commit worker.
    pub fn start(
        history: Arc<DocumentHistory>,
        config: ServiceConfig,
        monitor: Arc<ServerMonitor>,
    ) -> Result<Self, ServiceError> {
        if config.queue_size == 0 {
            return Err(ServiceError::InvalidConfig("queue size"));
        }
        if config.commit_period.is_zero() {
            return Err(ServiceError::InvalidConfig("commit period"));
        }

        let (batch_tx, batch_rx) = mpsc::channel(config.queue_size);
        let (stop_tx, stop_rx) = watch::channel(false);

        tokio::spawn(worker(
            history.clone(),
            monitor.clone(),
            batch_rx,
            stop_rx,
            config.commit_period,
        ));

        Ok(Self { history, monitor, batch_tx, stop_tx })
    }

    /// Snapshot at the latest version. Rejects the reserved client id 0.
    pub fn get_list(&self, client_id: ClientId) -> Result<(i64, Vec<ListEntry>), ServiceError> {
        if client_id == 0 {
            return Err(ServiceError::ZeroClientId);
        }
        Ok(self.history.snapshot())
    }

    /// Edits upgrading `version` to the latest one.
    pub fn get_list_updates(&self, version: i64) -> (i64, Vec<ListOp>) {
        let start = Instant::now();
        let diff = self.history.diff_with_latest(version);
        self.monitor.diff_served(start.elapsed());
        diff
    }

    /// Validate, convert and enqueue a whole batch.
    ///
    /// Inserts and updates both become upserts; the server-assigned
    /// timestamp (one per batch) and the submitting client id decide the
    /// commit order, not `_client_version`. Any invalid edit rejects the
    /// batch before anything is queued.
    pub async fn update_list(
        &self,
        client_id: ClientId,
        _client_version: i64,
        ops: Vec<EditRequest>,
    ) -> Result<(), ServiceError> {
        let now = now_micros();

        let mut batch = Vec::with_capacity(ops.len());
        for (index, op) in ops.iter().enumerate() {
            let converted = match op.kind {
                EditKind::Insert | EditKind::Update => {
                    StorageOp::set(&op.id, op.value, client_id, now)
                }
                EditKind::Delete => StorageOp::delete(&op.id, client_id, now),
            };
            batch.push(converted.map_err(|source| ServiceError::InvalidEdit {
                index,
                kind: op.kind,
                source,
            })?);
        }

        // Blocks when the queue is full; that is the backpressure.
        self.batch_tx
            .send(batch)
            .await
            .map_err(|_| ServiceError::QueueClosed)
    }

    /// Signal the worker to stop. Accumulated batches may be dropped.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

async fn worker(
    history: Arc<DocumentHistory>,
    monitor: Arc<ServerMonitor>,
    mut batch_rx: mpsc::Receiver<Vec<StorageOp>>,
    mut stop_rx: watch::Receiver<bool>,
    commit_period: Duration,
) {
    info!("batch worker: start (commit period {commit_period:?})");

    let mut queue: Vec<StorageOp> = Vec::new();
    let mut tick = tokio::time::interval(commit_period);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop_rx.changed() => {
                info!("batch worker: stop ({} ops dropped)", queue.len());
                return;
            }
            Some(batch) = batch_rx.recv() => {
                queue.extend(batch);
            }
            _ = tick.tick() => {
                if queue.is_empty() {
                    continue;
                }

                // Stable by construction: equal timestamps keep their
                // arrival order.
                queue.sort_by_key(StorageOp::timestamp);

                let count = queue.len();
                history.add_version(std::mem::take(&mut queue));
                monitor.ops_committed(count);
                debug!("batch worker: committed v{} ({count} ops)", history.latest());
            }
        }
    }
}
