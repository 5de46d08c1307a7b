use crate::ingest::IngestionPipeline;
use crate::models::{
    BatchResult, Document, DocumentOutcome, DocumentReport, ErrorKind, FailureDescriptor,
    PipelineStage,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

/// Counts pipelines currently holding a permit and remembers the high-water mark.
#[derive(Debug, Default)]
pub struct InFlightGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlightGauge {
    pub fn enter(&self) -> InFlightGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlightGuard { gauge: self }
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub struct InFlightGuard<'a> {
    gauge: &'a InFlightGauge,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.gauge.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Runs one pipeline task per document behind a counting permit.
///
/// The limit only affects scheduling; the result always holds one entry per
/// input document, in input order.
pub struct BatchCoordinator {
    pipeline: Arc<IngestionPipeline>,
    concurrency_limit: usize,
}

impl BatchCoordinator {
    pub fn new(pipeline: Arc<IngestionPipeline>, concurrency_limit: usize) -> Self {
        Self {
            pipeline,
            concurrency_limit: concurrency_limit.max(1),
        }
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    pub async fn run(&self, documents: Vec<Document>) -> BatchResult {
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.concurrency_limit));
        let gauge = Arc::new(InFlightGauge::default());
        let identities: Vec<(String, String)> = documents
            .iter()
            .map(|document| (document.document_id.clone(), document.filename.clone()))
            .collect();

        info!(
            documents = documents.len(),
            concurrency_limit = self.concurrency_limit,
            "starting batch ingestion"
        );

        let mut tasks = JoinSet::new();
        for (position, document) in documents.into_iter().enumerate() {
            let pipeline = Arc::clone(&self.pipeline);
            let semaphore = Arc::clone(&semaphore);
            let gauge = Arc::clone(&gauge);

            tasks.spawn(async move {
                let report = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        let _in_flight = gauge.enter();
                        pipeline.ingest(document).await
                    }
                    Err(closed) => scheduling_failure(
                        document.document_id,
                        document.filename,
                        closed.to_string(),
                    ),
                };
                (position, report)
            });
        }

        let mut slots: Vec<Option<DocumentReport>> = identities.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, report)) => slots[position] = Some(report),
                Err(join_error) => error!(error = %join_error, "ingestion task aborted"),
            }
        }

        let entries: Vec<DocumentReport> = slots
            .into_iter()
            .zip(identities)
            .map(|(slot, (document_id, filename))| {
                slot.unwrap_or_else(|| {
                    scheduling_failure(
                        document_id,
                        filename,
                        "pipeline task terminated before reporting".to_string(),
                    )
                })
            })
            .collect();

        let failed = entries.iter().filter(|entry| entry.is_failed()).count();
        info!(
            documents = entries.len(),
            failed,
            peak_in_flight = gauge.peak(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch ingestion finished"
        );

        BatchResult {
            concurrency_limit: self.concurrency_limit,
            peak_in_flight: gauge.peak(),
            entries,
        }
    }
}

fn scheduling_failure(document_id: String, filename: String, message: String) -> DocumentReport {
    DocumentReport {
        document_id,
        filename,
        checksum: String::new(),
        segments_indexed: 0,
        outcome: DocumentOutcome::Failed(FailureDescriptor {
            kind: ErrorKind::Internal,
            stage: PipelineStage::Schedule,
            message,
            retryable: true,
        }),
    }
}
