// src/storage/writer.rs
//
// Background evidence writer. Single producer (frame loop), single consumer
// (this thread). The queue is bounded and the producer never blocks: when
// it is full the new item is dropped and counted. Shutdown is an explicit
// message, processed after everything queued before it.

use super::{EvidenceItem, EvidenceStore};
use crate::error::StoreError;
use crate::pipeline::metrics::PipelineMetrics;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

pub enum WriterMessage {
    Store(EvidenceItem),
    Shutdown,
}

pub struct EvidenceWriter {
    tx: Option<SyncSender<WriterMessage>>,
    handle: Option<JoinHandle<()>>,
    metrics: PipelineMetrics,
}

impl EvidenceWriter {
    pub fn spawn(
        store: Box<dyn EvidenceStore>,
        capacity: usize,
        metrics: PipelineMetrics,
    ) -> Result<Self, StoreError> {
        let (tx, rx) = sync_channel::<WriterMessage>(capacity.max(1));
        let worker_metrics = metrics.clone();

        let handle = thread::Builder::new()
            .name("evidence-writer".into())
            .spawn(move || run_worker(store, rx, worker_metrics))
            .map_err(|e| StoreError::Unavailable(format!("cannot spawn writer thread: {}", e)))?;

        info!("Evidence writer started (queue capacity {})", capacity.max(1));
        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            metrics,
        })
    }

    /// Queue an item without blocking. Returns false when it was dropped.
    pub fn submit(&self, item: EvidenceItem) -> bool {
        let Some(tx) = &self.tx else {
            self.metrics.inc(&self.metrics.evidence_dropped);
            return false;
        };

        match tx.try_send(WriterMessage::Store(item)) {
            Ok(()) => {
                self.metrics.inc(&self.metrics.evidence_enqueued);
                true
            }
            Err(TrySendError::Full(WriterMessage::Store(item))) => {
                warn!(
                    "Evidence queue full, dropping {} capture for {}",
                    item.violation_type, item.entity_id
                );
                self.metrics.inc(&self.metrics.evidence_dropped);
                false
            }
            Err(_) => {
                warn!("Evidence writer is gone, dropping capture");
                self.metrics.inc(&self.metrics.evidence_dropped);
                false
            }
        }
    }

    /// Drain the queue and join the worker. Idempotent.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.tx.take() {
            // Blocks only until the worker frees a slot
            let _ = tx.send(WriterMessage::Shutdown);
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Evidence writer thread panicked");
            }
        }
    }
}

impl Drop for EvidenceWriter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(store: Box<dyn EvidenceStore>, rx: Receiver<WriterMessage>, metrics: PipelineMetrics) {
    while let Ok(message) = rx.recv() {
        match message {
            WriterMessage::Store(item) => {
                match store.insert(&item.violation_type, &item.entity_id, &item.image_bytes) {
                    Ok(id) => {
                        metrics.inc(&metrics.evidence_written);
                        debug!("Stored {} evidence for {} as #{}", item.violation_type, item.entity_id, id);
                    }
                    Err(e) => {
                        metrics.inc(&metrics.evidence_write_failures);
                        error!("Failed to store {} evidence for {}: {}", item.violation_type, item.entity_id, e);
                    }
                }
            }
            WriterMessage::Shutdown => break,
        }
    }
    info!("Evidence writer stopped");
}
