use crate::models::ObjectCreatedEvent;
use crate::services::extraction::MetadataExtractor;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Upper bound on how many queued events one loop iteration drains.
const MAX_BATCH: usize = 25;

/// Background consumer of object-created events. Runs until shutdown is
/// signalled or the event channel closes; extraction outcomes are recorded
/// by the extractor itself, so the loop never has to handle errors.
pub struct ExtractionWorker {
    extractor: Arc<MetadataExtractor>,
    events: mpsc::Receiver<ObjectCreatedEvent>,
    shutdown: watch::Receiver<bool>,
}

impl ExtractionWorker {
    pub fn new(
        extractor: Arc<MetadataExtractor>,
        events: mpsc::Receiver<ObjectCreatedEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            extractor,
            events,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("🚀 Extraction worker started");

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Extraction worker shutting down");
                    break;
                }
                received = self.events.recv() => {
                    let Some(first) = received else {
                        tracing::info!("📭 Event channel closed, stopping extraction worker");
                        break;
                    };
                    let mut batch = vec![first];
                    while batch.len() < MAX_BATCH {
                        match self.events.try_recv() {
                            Ok(event) => batch.push(event),
                            Err(_) => break,
                        }
                    }
                    tracing::debug!("Processing batch of {} event(s)", batch.len());
                    self.extractor.process_batch(&batch).await;
                }
            }
        }
    }
}
